//! Linear point-mass plant

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::{DynamicModel, LinearDynamicModel};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A frictionless point mass moving along one or more independent axes.
///
/// Each axis contributes a `(position, velocity)` pair to the state, laid out consecutively
/// (`x, vx, y, vy, ...`), and one normalised acceleration demand to the input.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointMass {
    /// Number of independent axes
    pub axes: usize,

    /// Acceleration produced by a full (1.0) input demand
    ///
    /// Units: meters/second^2
    pub max_accel_mss: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl PointMass {
    pub fn new(axes: usize, max_accel_mss: f64) -> Self {
        Self {
            axes,
            max_accel_mss,
        }
    }
}

impl DynamicModel for PointMass {
    fn state_dim(&self) -> usize {
        2 * self.axes
    }

    fn input_dim(&self) -> usize {
        self.axes
    }

    fn as_linear(&self) -> Option<&dyn LinearDynamicModel> {
        Some(self)
    }
}

impl LinearDynamicModel for PointMass {
    fn state_transition(&self, dt: f64) -> DMatrix<f64> {
        let mut a = DMatrix::identity(self.state_dim(), self.state_dim());
        for axis in 0..self.axes {
            a[(2 * axis, 2 * axis + 1)] = dt;
        }
        a
    }

    fn input_transition(&self, dt: f64) -> DMatrix<f64> {
        let mut b = DMatrix::zeros(self.state_dim(), self.input_dim());
        for axis in 0..self.axes {
            b[(2 * axis, axis)] = 0.5 * self.max_accel_mss * dt * dt;
            b[(2 * axis + 1, axis)] = self.max_accel_mss * dt;
        }
        b
    }
}
