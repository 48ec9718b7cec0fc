//! Utility library for the control software
//!
//! Ambient services shared by every executable in the workspace: logging, sessions,
//! parameter loading and the cyclic module interface.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod host;
pub mod logger;
pub mod maths;
pub mod module;
pub mod params;
pub mod session;
pub mod time;
