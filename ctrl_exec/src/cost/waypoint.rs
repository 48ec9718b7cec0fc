//! Soft timed waypoint

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{ContributorError, CostContributor};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Encourages the trajectory to pass near a state around a desired time.
///
/// The cost `φ(t)·(x - x_w)ᵀW(x - x_w)` is weighted by a temporal Gaussian
///
/// ```text
/// φ(t) = √(σ/2π)·exp(-σ(t - T)²/2)
/// ```
///
/// so it is strongest at the desired time `T` and fades away either side of it. Larger `σ`
/// narrows the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waypoint {
    /// Target state `x_w`
    pub state: DVector<f64>,

    /// Weight matrix `W` (n×n, positive semi-definite)
    pub weight: DMatrix<f64>,

    /// Temporal spread `σ`
    ///
    /// Units: 1/seconds^2
    pub temporal_spread: f64,

    /// Desired arrival time `T`, relative to the start of the horizon
    ///
    /// Units: seconds
    pub desired_time_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Waypoint {
    pub fn new(
        state: DVector<f64>,
        weight: DMatrix<f64>,
        temporal_spread: f64,
        desired_time_s: f64,
    ) -> Result<Self, ContributorError> {
        let waypoint = Self {
            state,
            weight,
            temporal_spread,
            desired_time_s,
        };
        waypoint.validate()?;
        Ok(waypoint)
    }

    /// Check the spread, time and weight shape, for waypoints built from parameter files.
    pub fn validate(&self) -> Result<(), ContributorError> {
        if !(self.temporal_spread.is_finite() && self.temporal_spread > 0.0) {
            return Err(ContributorError::InvalidTemporalSpread(self.temporal_spread));
        }
        if !self.desired_time_s.is_finite() {
            return Err(ContributorError::InvalidDesiredTime(self.desired_time_s));
        }

        let n = self.state.len();
        if self.weight.shape() != (n, n) {
            return Err(ContributorError::WeightShape {
                rows: self.weight.nrows(),
                cols: self.weight.ncols(),
                n,
            });
        }
        Ok(())
    }

    /// The temporal weighting `φ(t)` at time `t` seconds into the horizon.
    pub fn temporal_factor(&self, time_s: f64) -> f64 {
        let s = self.temporal_spread;
        let dt = time_s - self.desired_time_s;

        (s / (2.0 * PI)).sqrt() * (-s * dt * dt / 2.0).exp()
    }

    fn matches(&self, state: &DVector<f64>) -> bool {
        let n = state.len();
        self.state.len() == n && self.weight.shape() == (n, n)
    }
}

impl CostContributor for Waypoint {
    fn quadratic_cost(&self, state: &DVector<f64>, step: usize, dt: f64) -> Option<DMatrix<f64>> {
        if !self.matches(state) {
            return None;
        }

        Some(&self.weight * self.temporal_factor(step as f64 * dt))
    }

    fn linear_cost(&self, state: &DVector<f64>, step: usize, dt: f64) -> Option<DVector<f64>> {
        if !self.matches(state) {
            return None;
        }

        let phi = self.temporal_factor(step as f64 * dt);
        Some(&self.weight * (state - &self.state) * (2.0 * phi))
    }

    fn cost(&self, state: &DVector<f64>, step: usize, dt: f64) -> Option<f64> {
        if !self.matches(state) {
            return None;
        }

        let e = state - &self.state;
        Some(self.temporal_factor(step as f64 * dt) * e.dot(&(&self.weight * &e)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::linalg::diag;
    use approx::assert_relative_eq;

    fn waypoint() -> Waypoint {
        Waypoint::new(
            DVector::from_column_slice(&[0.5, 0.0]),
            diag(&[10.0, 0.0]),
            50.0,
            0.4,
        )
        .unwrap()
    }

    #[test]
    fn test_temporal_factor() {
        let wp = waypoint();

        // Peak at the desired time
        let peak = wp.temporal_factor(0.4);
        assert_relative_eq!(peak, (50.0 / (2.0 * PI)).sqrt(), epsilon = 1e-12);

        // Symmetric and decaying
        assert_relative_eq!(wp.temporal_factor(0.3), wp.temporal_factor(0.5), epsilon = 1e-12);
        assert!(wp.temporal_factor(0.3) < peak);
        assert!(wp.temporal_factor(1.4) < 1e-10);
    }

    #[test]
    fn test_costs() {
        let wp = waypoint();
        let x = DVector::from_column_slice(&[0.3, 1.0]);

        // Step 40 at 0.01 s is the desired time
        let phi = wp.temporal_factor(0.4);

        let q = wp.quadratic_cost(&x, 40, 0.01).unwrap();
        assert_relative_eq!(q, diag(&[10.0 * phi, 0.0]), epsilon = 1e-12);

        let l = wp.linear_cost(&x, 40, 0.01).unwrap();
        assert_relative_eq!(l[0], 2.0 * phi * 10.0 * -0.2, epsilon = 1e-12);
        assert_relative_eq!(l[1], 0.0);

        assert_relative_eq!(wp.cost(&x, 40, 0.01).unwrap(), phi * 10.0 * 0.04, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_waypoints_rejected() {
        let target = || DVector::from_column_slice(&[0.5, 0.0]);

        for &spread in [0.0, -1.0, std::f64::NAN, std::f64::INFINITY].iter() {
            assert!(matches!(
                Waypoint::new(target(), diag(&[10.0, 0.0]), spread, 0.4),
                Err(ContributorError::InvalidTemporalSpread(_))
            ));
        }

        assert!(matches!(
            Waypoint::new(target(), diag(&[10.0, 0.0]), 50.0, std::f64::NAN),
            Err(ContributorError::InvalidDesiredTime(_))
        ));

        assert_eq!(
            Waypoint::new(target(), diag(&[10.0, 0.0, 1.0]), 50.0, 0.4).unwrap_err(),
            ContributorError::WeightShape {
                rows: 3,
                cols: 3,
                n: 2
            }
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let wp = waypoint();
        let x = DVector::zeros(4);

        assert!(wp.quadratic_cost(&x, 0, 0.01).is_none());
        assert!(wp.linear_cost(&x, 0, 0.01).is_none());
        assert!(wp.cost(&x, 0, 0.01).is_none());
    }
}
