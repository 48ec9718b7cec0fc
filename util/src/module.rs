//! Cyclic module interface
//!
//! Modules stepped by an executable's fixed-rate loop implement [`CyclicModule`]. The loop calls
//! `init` once, `proc` every cycle, and `stop` on the way out, whether the run ended normally or a
//! cycle failed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::session::Session;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait CyclicModule {
    /// Data required during initialisation
    type InitData;

    /// Measurements and demands for one cycle
    type InputData;

    /// Demands produced by one cycle
    type OutputData;

    /// Diagnostics from one cycle
    type StatusReport;

    type Error;

    /// Acquire the module's resources, e.g. start its worker threads.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::Error>;

    /// Run one cycle. Must not block on anything slower than the cycle period.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::Error>;

    /// Release the module's resources. Stopping an uninitialised module does nothing.
    fn stop(&mut self) -> Result<(), Self::Error>;
}
