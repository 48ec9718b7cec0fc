//! Quadratic cost matrices

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{linalg, model::DynamicModel};

use super::SolverError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The three quadratic cost matrices of a finite-horizon problem.
///
/// The cost minimised is `Σ (x-x_d)ᵀQ(x-x_d) + uᵀRu` over the horizon plus the terminal term
/// `(x-x_d)ᵀQf(x-x_d)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostMatrices {
    /// Terminal state cost `Qf` (n×n, positive semi-definite)
    pub terminal: DMatrix<f64>,

    /// Intermediate state cost `Q` (n×n, positive semi-definite)
    pub stage: DMatrix<f64>,

    /// Input cost `R` (u×u, positive definite)
    pub input: DMatrix<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CostMatrices {
    pub fn new(terminal: DMatrix<f64>, stage: DMatrix<f64>, input: DMatrix<f64>) -> Self {
        Self {
            terminal,
            stage,
            input,
        }
    }

    /// Build diagonal cost matrices from their diagonal weights.
    pub fn from_diagonals(terminal: &[f64], stage: &[f64], input: &[f64]) -> Self {
        Self::new(
            linalg::diag(terminal),
            linalg::diag(stage),
            linalg::diag(input),
        )
    }

    pub fn state_dim(&self) -> usize {
        self.stage.nrows()
    }

    pub fn input_dim(&self) -> usize {
        self.input.nrows()
    }

    /// Check that the matrices are square and agree with the model's dimensions.
    pub(crate) fn validate(&self, model: &dyn DynamicModel) -> Result<(), SolverError> {
        let n = model.state_dim();
        let m = model.input_dim();

        check_shape("terminal cost", &self.terminal, n)?;
        check_shape("stage cost", &self.stage, n)?;
        check_shape("input cost", &self.input, m)?;

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_shape(what: &'static str, m: &DMatrix<f64>, dim: usize) -> Result<(), SolverError> {
    if m.nrows() != dim {
        return Err(SolverError::DimensionMismatch {
            what,
            expected: dim,
            found: m.nrows(),
        });
    }
    if m.ncols() != dim {
        return Err(SolverError::DimensionMismatch {
            what,
            expected: dim,
            found: m.ncols(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::PointMass;

    #[test]
    fn test_validate() {
        let model = PointMass::new(1, 10.0);

        let ok = CostMatrices::from_diagonals(&[1000.0, 1000.0], &[1.0, 0.0], &[1.0]);
        assert!(ok.validate(&model).is_ok());
        assert_eq!(ok.state_dim(), 2);
        assert_eq!(ok.input_dim(), 1);

        let bad_input = CostMatrices::from_diagonals(&[1.0, 1.0], &[1.0, 0.0], &[1.0, 1.0]);
        assert!(matches!(
            bad_input.validate(&model),
            Err(SolverError::DimensionMismatch {
                what: "input cost",
                ..
            })
        ));

        let mut not_square = ok.clone();
        not_square.terminal = DMatrix::zeros(2, 3);
        assert!(matches!(
            not_square.validate(&model),
            Err(SolverError::DimensionMismatch {
                what: "terminal cost",
                expected: 2,
                found: 3
            })
        ));
    }
}
