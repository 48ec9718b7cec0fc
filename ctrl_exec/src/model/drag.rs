//! Point mass with quadratic drag, the nonlinear reference plant

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{DynamicModel, NonlinearDynamicModel};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single-axis point mass subject to drag proportional to the square of its speed.
///
/// State is `(position, velocity)` and the input is a normalised acceleration demand. The
/// dynamics are written in state-dependent-coefficient form, so `A(x)` carries the drag term
/// `1 - c·|v|·dt` on the velocity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DragPointMass {
    /// Acceleration produced by a full (1.0) input demand
    ///
    /// Units: meters/second^2
    pub max_accel_mss: f64,

    /// Quadratic drag coefficient
    ///
    /// Units: 1/meters
    pub drag_coeff: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DragPointMass {
    pub fn new(max_accel_mss: f64, drag_coeff: f64) -> Self {
        Self {
            max_accel_mss,
            drag_coeff,
        }
    }
}

impl DynamicModel for DragPointMass {
    fn state_dim(&self) -> usize {
        2
    }

    fn input_dim(&self) -> usize {
        1
    }

    fn as_nonlinear(&self) -> Option<&dyn NonlinearDynamicModel> {
        Some(self)
    }
}

impl NonlinearDynamicModel for DragPointMass {
    fn state_transition(&self, state: &DVector<f64>, dt: f64) -> DMatrix<f64> {
        let speed = state[1].abs();

        DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0 - self.drag_coeff * speed * dt])
    }

    fn input_transition(&self, _state: &DVector<f64>, dt: f64) -> DMatrix<f64> {
        DMatrix::from_row_slice(
            2,
            1,
            &[0.5 * self.max_accel_mss * dt * dt, self.max_accel_mss * dt],
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_drag_slows_coasting_mass() {
        let model = DragPointMass::new(10.0, 3.0);

        let x = DVector::from_column_slice(&[0.0, 2.0]);
        let u = DVector::zeros(1);
        let next = model.simulate(&x, &u, 0.01).unwrap();

        assert_relative_eq!(next[0], 0.02, epsilon = 1e-12);
        assert_relative_eq!(next[1], 2.0 * (1.0 - 3.0 * 2.0 * 0.01), epsilon = 1e-12);

        // Drag is symmetric in the direction of travel
        let back = model.simulate(&(-x), &u, 0.01).unwrap();
        assert_relative_eq!(back[1], -next[1], epsilon = 1e-12);
    }
}
