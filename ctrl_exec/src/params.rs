//! Control parameters
//!
//! Loaded from TOML files in the `params` directory of the software root.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use nalgebra::DVector;
use serde::Deserialize;

// Internal
use crate::{
    cost::{ContributorError, Obstacle, Waypoint},
    linalg::diag,
    lqr::CostMatrices,
    mpc::DEFAULT_MAX_STEP_HALVINGS,
    runner::RunnerParams,
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Parameters for the MPC solver and its runner
#[derive(Deserialize, Debug, Clone)]
pub struct MpcParams {
    /// Number of steps in the horizon
    pub horizon: usize,

    /// Length of one horizon step
    ///
    /// Units: seconds
    pub dt_s: f64,

    /// Number of forward/backward refinements per solve
    pub iterations: usize,

    /// Diagonal of the terminal state cost `Qf`
    pub terminal_cost_diag: Vec<f64>,

    /// Diagonal of the intermediate state cost `Q`
    pub stage_cost_diag: Vec<f64>,

    /// Diagonal of the input cost `R`
    pub input_cost_diag: Vec<f64>,

    /// Number of times the feedforward step may be halved in one forward pass
    #[serde(default = "default_max_step_halvings")]
    pub max_step_halvings: usize,

    /// Time the solver worker sleeps between solves
    ///
    /// Units: milliseconds
    pub worker_sleep_ms: u64,
}

/// Parameters for the control manager
#[derive(Deserialize, Debug, Clone)]
pub struct CtrlMgrParams {
    /// Period of the control loop
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// How long to run the control loop for
    ///
    /// Units: seconds
    pub run_duration_s: f64,

    /// Acceleration of the simulated plant at full demand
    ///
    /// Units: meters/second^2
    pub max_accel_mss: f64,

    /// State of the plant at startup, as `(x, vx, y, vy, ...)`
    pub initial_state: Vec<f64>,

    /// State to drive the plant to
    pub desired_state: Vec<f64>,

    /// Distance from the desired position under which the goal is considered reached
    ///
    /// Units: meters
    pub goal_tolerance_m: f64,

    /// Obstacles to avoid
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,

    /// Timed waypoints to pass near
    #[serde(default)]
    pub waypoints: Vec<WaypointParams>,
}

/// A waypoint as written in a parameter file
#[derive(Deserialize, Debug, Clone)]
pub struct WaypointParams {
    pub state: Vec<f64>,

    /// Diagonal of the waypoint weight matrix
    pub weight_diag: Vec<f64>,

    /// Units: 1/seconds^2
    pub temporal_spread: f64,

    /// Units: seconds
    pub desired_time_s: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl MpcParams {
    pub fn cost_matrices(&self) -> CostMatrices {
        CostMatrices::from_diagonals(
            &self.terminal_cost_diag,
            &self.stage_cost_diag,
            &self.input_cost_diag,
        )
    }

    pub fn runner_params(&self) -> RunnerParams {
        RunnerParams {
            worker_sleep_ms: self.worker_sleep_ms,
        }
    }
}

impl WaypointParams {
    pub fn to_waypoint(&self) -> Result<Waypoint, ContributorError> {
        Waypoint::new(
            DVector::from_column_slice(&self.state),
            diag(&self.weight_diag),
            self.temporal_spread,
            self.desired_time_s,
        )
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn default_max_step_halvings() -> usize {
    DEFAULT_MAX_STEP_HALVINGS
}

#[cfg(test)]
mod test {
    use super::*;
    use util::params::parse;

    #[test]
    fn test_shipped_params_parse() {
        let mpc: MpcParams = parse(include_str!("../../params/mpc.toml")).unwrap();
        let ctrl: CtrlMgrParams = parse(include_str!("../../params/ctrl_mgr.toml")).unwrap();

        let costs = mpc.cost_matrices();
        assert_eq!(costs.state_dim(), ctrl.initial_state.len());
        assert_eq!(costs.state_dim(), ctrl.desired_state.len());
        assert_eq!(costs.terminal.nrows(), costs.state_dim());
        assert_eq!(costs.input_dim() * 2, costs.state_dim());

        for wp in ctrl.waypoints.iter() {
            assert_eq!(wp.to_waypoint().unwrap().state.len(), costs.state_dim());
        }
    }

    #[test]
    fn test_defaults() {
        let mpc: MpcParams = parse(
            r#"
            horizon = 50
            dt_s = 0.02
            iterations = 3
            terminal_cost_diag = [100.0, 100.0]
            stage_cost_diag = [1.0, 0.0]
            input_cost_diag = [1.0]
            worker_sleep_ms = 2
            "#,
        )
        .unwrap();

        assert_eq!(mpc.max_step_halvings, DEFAULT_MAX_STEP_HALVINGS);
        assert_eq!(mpc.runner_params().worker_sleep_ms, 2);

        let ctrl: CtrlMgrParams = parse(
            r#"
            cycle_period_s = 0.02
            run_duration_s = 5.0
            max_accel_mss = 10.0
            initial_state = [0.0, 0.0]
            desired_state = [1.0, 0.0]
            goal_tolerance_m = 0.01
            "#,
        )
        .unwrap();

        assert!(ctrl.obstacles.is_empty());
        assert!(ctrl.waypoints.is_empty());
    }

    #[test]
    fn test_obstacle_indices_default() {
        let ctrl: CtrlMgrParams = parse(
            r#"
            cycle_period_s = 0.02
            run_duration_s = 5.0
            max_accel_mss = 10.0
            initial_state = [0.0, 0.0, 0.0, 0.0]
            desired_state = [1.0, 0.0, 0.1, 0.0]
            goal_tolerance_m = 0.01

            [[obstacles]]
            centre = [0.5, 0.05]
            radius_m = 0.1
            robot_radius_m = 0.15
            cost_factor = 1000.0
            "#,
        )
        .unwrap();

        assert_eq!(ctrl.obstacles.len(), 1);
        assert_eq!(ctrl.obstacles[0].position_indices, vec![0, 2]);
    }
}
