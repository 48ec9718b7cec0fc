//! Matrix helpers shared by the LQR and MPC engines.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use util::maths::clamp;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Lower limit of a normalised actuator demand
pub const INPUT_MIN: f64 = -1.0;

/// Upper limit of a normalised actuator demand
pub const INPUT_MAX: f64 = 1.0;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Invert a square matrix, returning `None` if it is singular or if the inverse contains
/// non-finite entries.
pub fn checked_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if !m.is_square() {
        return None;
    }

    m.clone()
        .try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
}

/// Replace the matrix with its symmetric part, `(M + Mᵀ)/2`.
pub fn symmetrise(m: &mut DMatrix<f64>) {
    let t = m.transpose();
    *m += t;
    *m *= 0.5;
}

/// Project a matrix onto the positive semi-definite cone.
///
/// The matrix is symmetrised, eigen-decomposed, and its negative eigenvalues clamped to zero.
pub fn project_psd(m: &DMatrix<f64>) -> DMatrix<f64> {
    let mut sym = m.clone();
    symmetrise(&mut sym);

    let eig = SymmetricEigen::new(sym);
    let clamped = eig.eigenvalues.map(|l| l.max(0.0));

    &eig.eigenvectors * DMatrix::from_diagonal(&clamped) * eig.eigenvectors.transpose()
}

/// Smallest eigenvalue of the symmetric part of `m`.
pub fn min_eigenvalue(m: &DMatrix<f64>) -> f64 {
    let mut sym = m.clone();
    symmetrise(&mut sym);

    SymmetricEigen::new(sym).eigenvalues.min()
}

/// Clip every component of an input vector into the normalised actuation range.
pub fn clip_input(u: &DVector<f64>) -> DVector<f64> {
    u.map(|v| clamp(&v, &INPUT_MIN, &INPUT_MAX))
}

/// Evaluate `vᵀ M v`.
pub fn quad_form(m: &DMatrix<f64>, v: &DVector<f64>) -> f64 {
    v.dot(&(m * v))
}

/// Build a square diagonal matrix from a slice of weights.
pub fn diag(weights: &[f64]) -> DMatrix<f64> {
    DMatrix::from_diagonal(&DVector::from_column_slice(weights))
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_checked_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
        let inv = checked_inverse(&m).unwrap();
        assert_relative_eq!(inv, DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 0.25]));

        assert!(checked_inverse(&DMatrix::zeros(1, 1)).is_none());
        assert!(checked_inverse(&DMatrix::from_element(1, 1, std::f64::NAN)).is_none());
        assert!(checked_inverse(&DMatrix::zeros(2, 3)).is_none());
    }

    #[test]
    fn test_project_psd() {
        // Eigenvalues 3 and -1
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(min_eigenvalue(&m) < 0.0);

        let p = project_psd(&m);
        assert!(min_eigenvalue(&p) > -1e-12);
        assert_relative_eq!(p, DMatrix::from_element(2, 2, 1.5), epsilon = 1e-12);

        // Already PSD matrices are unchanged
        let q = diag(&[1.0, 0.0, 3.0]);
        assert_relative_eq!(project_psd(&q), q, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_input() {
        let u = DVector::from_column_slice(&[-4.0, 0.3, 1.2]);
        assert_eq!(clip_input(&u), DVector::from_column_slice(&[-1.0, 0.3, 1.0]));
    }

    #[test]
    fn test_quad_form() {
        let m = diag(&[1.0, 2.0]);
        let v = DVector::from_column_slice(&[3.0, 1.0]);
        assert_relative_eq!(quad_form(&m, &v), 11.0);
    }
}
