//! # Control library.
//!
//! Real-time optimal control for mobile robots: a finite-horizon LQR engine, an iterative LQR
//! (receding-horizon MPC) engine with pluggable potential-field costs, and a runner which solves
//! in the background while the control loop keeps acting on the latest committed policy.
//!
//! This library allows the executable and other crates in the workspace to access the engine.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Shared matrix helpers used by the engines
pub mod linalg;

/// Dynamic model contract and reference plants
pub mod model;

/// Finite-horizon discrete LQR engine
pub mod lqr;

/// Iterative LQR engine built on the LQR engine
pub mod mpc;

/// Additive cost terms for obstacles and waypoints
pub mod cost;

/// Background solver runner with latency compensation
pub mod runner;

/// Parameter files
pub mod params;

/// Control manager - the cyclic module run by the executable
pub mod ctrl_mgr;

// ------------------------------------------------------------------------------------------------
// RE-EXPORTS
// ------------------------------------------------------------------------------------------------

pub use nalgebra::{DMatrix, DVector};
