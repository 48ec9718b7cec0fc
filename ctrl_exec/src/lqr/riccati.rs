//! Single steps of the discrete Riccati recursion, shared by the LQR and MPC engines.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::DMatrix;

use crate::linalg::{checked_inverse, symmetrise};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Result of one backward Riccati step from `t` to `t-1`.
pub(crate) struct RiccatiStep {
    /// Cost-to-go at `t-1`
    pub p: DMatrix<f64>,

    /// Feedback gain at `t-1`
    pub k: DMatrix<f64>,
}

/// Feedback gain and its Hessian inverse for a given cost-to-go.
pub(crate) struct Gain {
    /// `K = -H⁻¹BᵀPA`
    pub k: DMatrix<f64>,

    /// `H⁻¹ = (R + BᵀPB)⁻¹`
    pub h_inv: DMatrix<f64>,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Compute the feedback gain for the cost-to-go `p`, or `None` if `R + BᵀPB` is singular.
pub(crate) fn gain(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    p: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> Option<Gain> {
    let bt_p = b.transpose() * p;
    let h = r + &bt_p * b;
    let h_inv = checked_inverse(&h)?;

    let k = -(&h_inv * (bt_p * a));

    Some(Gain { k, h_inv })
}

/// Perform one backward step:
///
/// ```text
/// P[t-1] = Q + AᵀP[t]A - AᵀP[t]B (R + BᵀP[t]B)⁻¹ BᵀP[t]A
/// K[t-1] = -(R + BᵀP[t]B)⁻¹ BᵀP[t]A
/// ```
///
/// Returns `None` if the inversion is singular.
pub(crate) fn step(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    p_next: &DMatrix<f64>,
    q: &DMatrix<f64>,
    r: &DMatrix<f64>,
) -> Option<RiccatiStep> {
    let Gain { k, .. } = gain(a, b, p_next, r)?;

    // AᵀPB·K is the negated correction term, since K already carries the minus sign
    let at_p = a.transpose() * p_next;
    let mut p = q + &at_p * a + (at_p * b) * &k;
    symmetrise(&mut p);

    Some(RiccatiStep { p, k })
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_step() {
        let a = DMatrix::from_element(1, 1, 1.0);
        let b = DMatrix::from_element(1, 1, 0.1);
        let p = DMatrix::from_element(1, 1, 1.0);
        let q = DMatrix::from_element(1, 1, 1.0);
        let r = DMatrix::from_element(1, 1, 1.0);

        let s = step(&a, &b, &p, &q, &r).unwrap();

        // P = 1 + 1 - 0.01/1.01, K = -0.1/1.01
        assert_relative_eq!(s.p[(0, 0)], 2.0 - 0.01 / 1.01, epsilon = 1e-12);
        assert_relative_eq!(s.k[(0, 0)], -0.1 / 1.01, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_step() {
        let a = DMatrix::identity(2, 2);
        let b = DMatrix::zeros(2, 1);
        let p = DMatrix::identity(2, 2);
        let r = DMatrix::zeros(1, 1);

        assert!(step(&a, &b, &p, &p, &r).is_none());
        assert!(gain(&a, &b, &p, &r).is_none());
    }
}
