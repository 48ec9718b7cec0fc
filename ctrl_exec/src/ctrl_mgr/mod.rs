//! # Control Manager
//!
//! The cyclic module which owns the solver runner. Every cycle it hands the measured state to the
//! runner, adopts any freshly solved policy, and returns the latency compensated optimal input
//! along with a status report on the obstacles and goal.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use nalgebra::DVector;
use serde::Serialize;
use util::params::{self, LoadError};

// Internal
use crate::{
    cost::ContributorError,
    lqr::SolverError,
    params::{CtrlMgrParams, MpcParams},
    runner::RunnerError,
};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod state;

pub use state::CtrlMgr;

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Data required to initialise the control manager.
#[derive(Debug, Clone)]
pub struct InitData {
    pub mpc: MpcParams,
    pub ctrl_mgr: CtrlMgrParams,
}

/// Input data to the control manager.
#[derive(Debug, Clone)]
pub struct InputData {
    /// The measured state of the plant
    pub state: DVector<f64>,

    /// A new desired state, or `None` to keep the current one
    pub desired_state: Option<DVector<f64>>,
}

/// Output from the control manager.
#[derive(Debug, Clone, Serialize)]
pub struct OutputData {
    /// Normalised input demand for the plant, each element in `[-1, 1]`
    pub input: DVector<f64>,
}

/// Status report for control manager processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// A new policy was adopted this cycle
    pub policy_updated: bool,

    /// The step of the policy the input was taken from
    pub policy_step: Option<usize>,

    /// Time the current policy took to solve
    ///
    /// Units: seconds
    pub policy_lag_s: f64,

    /// Distance to the closest obstacle
    ///
    /// Units: meters
    pub min_obstacle_dist_m: Option<f64>,

    /// The plant is hitting an obstacle
    pub collision: bool,

    /// The plant is within the goal tolerance of the desired position
    pub goal_reached: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CtrlMgrError {
    #[error("Couldn't load parameters: {0}")]
    ParamLoadError(#[from] LoadError),

    #[error("Solver error: {0}")]
    SolverError(#[from] SolverError),

    #[error("Invalid obstacle or waypoint: {0}")]
    ContributorError(#[from] ContributorError),

    #[error("Solver runner error: {0}")]
    RunnerError(#[from] RunnerError),

    #[error("Expected a state with an even number of elements, found {0}")]
    InvalidStateDim(usize),

    #[error("Attempted to process before initialisation")]
    NotInitialised,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl InitData {
    /// Load the init data from the `mpc.toml` and `ctrl_mgr.toml` parameter files.
    pub fn load() -> Result<Self, LoadError> {
        Ok(Self {
            mpc: params::load("mpc.toml")?,
            ctrl_mgr: params::load("ctrl_mgr.toml")?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_report_json() {
        let report = StatusReport {
            policy_updated: true,
            policy_step: Some(12),
            policy_lag_s: 0.004,
            min_obstacle_dist_m: None,
            collision: false,
            goal_reached: false,
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["policy_step"], 12);
        assert_eq!(json["policy_updated"], true);
        assert!(json["min_obstacle_dist_m"].is_null());

        let output = OutputData {
            input: DVector::from_column_slice(&[0.5, -1.0]),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert!(!json["input"].is_null());
    }
}
