//! Worker thread which repeatedly builds and solves a fresh policy without blocking the control
//! loop.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{atomic::Ordering, Arc},
    thread,
    time::Duration,
};

use log::{debug, error, info};

use super::{RunnerError, Shared, SolvedPolicy};
use crate::runner::SolverFactory;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

pub(super) fn worker_thread<F>(shared: Arc<Shared<F>>) -> Result<(), RunnerError>
where
    F: SolverFactory,
{
    let sleep = Duration::from_millis(shared.params.worker_sleep_ms);

    info!("Solver worker started");

    // Stopping only takes effect between solves
    while !shared.stop.load(Ordering::Relaxed) {
        if !shared.ready.load(Ordering::Acquire) {
            let started_at = shared.clock.now();

            // Copy the states out so the lock isn't held during the solve
            let (current, desired) = {
                let states = shared.states.read()?;
                (states.current.clone(), states.desired.clone())
            };

            let solver = match shared.factory.solve(&current, &desired) {
                Ok(s) => s,
                Err(e) => {
                    error!("Solver worker failed: {}", e);
                    return Err(RunnerError::Solver(e));
                }
            };

            debug!(
                "Solver worker: solve took {:.3} ms",
                (shared.clock.now().saturating_sub(started_at)).as_secs_f64() * 1000.0
            );

            *shared.slot.lock()? = Some(SolvedPolicy { solver, started_at });

            // Publish only once the slot is filled
            shared.ready.store(true, Ordering::Release);
        }

        thread::sleep(sleep);
    }

    info!("Solver worker stopped");

    Ok(())
}
