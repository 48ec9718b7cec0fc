//! Repulsive obstacle potential

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use util::maths::norm;

use super::{ContributorError, CostContributor};
use crate::linalg::project_psd;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Divisor applied to the combined robot and obstacle radii to get the potential length scale.
const LENGTH_SCALE_DIVISOR: f64 = 1.7;

/// Fraction of the robot radius under which the robot is considered to be hitting an obstacle.
const COLLISION_RADIUS_FRACTION: f64 = 0.9;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A circular obstacle with a Gaussian repulsive potential
///
/// ```text
/// f(x) = c·exp(-|p(x) - centre|² / L²),    L = (robot_radius + radius) / 1.7
/// ```
///
/// where `p(x)` picks the position elements out of the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obstacle {
    /// Position of the obstacle's centre
    ///
    /// Units: meters
    pub centre: Vec<f64>,

    /// Radius of the obstacle
    ///
    /// Units: meters
    pub radius_m: f64,

    /// Radius of the robot
    ///
    /// Units: meters
    pub robot_radius_m: f64,

    /// Peak value of the potential
    pub cost_factor: f64,

    /// Indices of the state elements holding the robot's position, one per centre element
    #[serde(default = "default_position_indices")]
    pub position_indices: Vec<usize>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Obstacle {
    /// Create a new planar obstacle, with the robot's position at state elements 0 and 2.
    pub fn new(
        centre_x: f64,
        centre_y: f64,
        radius_m: f64,
        robot_radius_m: f64,
        cost_factor: f64,
    ) -> Result<Self, ContributorError> {
        let obstacle = Self {
            centre: vec![centre_x, centre_y],
            radius_m,
            robot_radius_m,
            cost_factor,
            position_indices: default_position_indices(),
        };
        obstacle.validate()?;
        Ok(obstacle)
    }

    /// Use different state elements for the robot's position.
    pub fn with_position_indices(
        mut self,
        position_indices: Vec<usize>,
    ) -> Result<Self, ContributorError> {
        self.position_indices = position_indices;
        self.validate()?;
        Ok(self)
    }

    /// Check the radii and position indices, for obstacles built from parameter files.
    pub fn validate(&self) -> Result<(), ContributorError> {
        let radii = [("radius", self.radius_m), ("robot radius", self.robot_radius_m)];
        for &(what, value) in radii.iter() {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ContributorError::InvalidRadius { what, value });
            }
        }
        if self.radius_m + self.robot_radius_m == 0.0 {
            return Err(ContributorError::ZeroExtent);
        }
        if self.position_indices.len() != self.centre.len() {
            return Err(ContributorError::PositionIndices {
                centre: self.centre.len(),
                indices: self.position_indices.len(),
            });
        }
        Ok(())
    }

    /// Length scale `L` of the potential.
    pub fn length_scale(&self) -> f64 {
        (self.robot_radius_m + self.radius_m) / LENGTH_SCALE_DIVISOR
    }

    /// Distance between the robot's position in `state` and the obstacle centre, or `None` if the
    /// state does not contain the position indices.
    pub fn distance(&self, state: &DVector<f64>) -> Option<f64> {
        let pos = self.position(state)?;
        norm(&pos, &self.centre)
    }

    /// Whether the robot at `state` is hitting the obstacle.
    pub fn collides(&self, state: &DVector<f64>) -> bool {
        self.distance(state)
            .map(|d| d < COLLISION_RADIUS_FRACTION * self.robot_radius_m)
            .unwrap_or(false)
    }

    fn position(&self, state: &DVector<f64>) -> Option<Vec<f64>> {
        if self.position_indices.len() != self.centre.len() {
            return None;
        }

        self.position_indices
            .iter()
            .map(|&i| state.get(i).copied())
            .collect()
    }

    /// Displacement from the centre and the potential value at that displacement
    fn displacement(&self, state: &DVector<f64>) -> Option<(DVector<f64>, f64)> {
        let pos = self.position(state)?;
        let d = DVector::from_vec(pos) - DVector::from_column_slice(&self.centre);

        let l = self.length_scale();
        let f = self.cost_factor * (-d.norm_squared() / (l * l)).exp();

        Some((d, f))
    }
}

impl CostContributor for Obstacle {
    /// Half the Hessian of the potential, projected onto the PSD cone so the contribution can
    /// never turn the repulsion into an attraction.
    fn quadratic_cost(&self, state: &DVector<f64>, _step: usize, _dt: f64) -> Option<DMatrix<f64>> {
        let (d, f) = self.displacement(state)?;
        let l2 = self.length_scale().powi(2);
        let k = d.len();

        // ∇²f = f/L⁴·(4ddᵀ - 2L²I)
        let hessian = (&d * d.transpose() * 4.0 - DMatrix::identity(k, k) * (2.0 * l2))
            * (f / (l2 * l2));
        let local = project_psd(&hessian) * 0.5;

        let n = state.len();
        let mut q = DMatrix::zeros(n, n);
        for (r, &i) in self.position_indices.iter().enumerate() {
            for (c, &j) in self.position_indices.iter().enumerate() {
                q[(i, j)] += local[(r, c)];
            }
        }

        Some(q)
    }

    /// Gradient of the potential, `∇f = -2f·d/L²`.
    fn linear_cost(&self, state: &DVector<f64>, _step: usize, _dt: f64) -> Option<DVector<f64>> {
        let (d, f) = self.displacement(state)?;
        let l2 = self.length_scale().powi(2);

        let mut q = DVector::zeros(state.len());
        for (r, &i) in self.position_indices.iter().enumerate() {
            q[i] += -2.0 * f * d[r] / l2;
        }

        Some(q)
    }

    fn cost(&self, state: &DVector<f64>, _step: usize, _dt: f64) -> Option<f64> {
        self.displacement(state).map(|(_, f)| f)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_position_indices() -> Vec<usize> {
    vec![0, 2]
}
