//! # Solver runner
//!
//! Solving a full horizon can take longer than one control cycle, so the runner solves on a
//! dedicated worker thread while the control loop keeps acting on the most recently committed
//! policy.
//!
//! The worker builds a fresh solver from the latest current and desired states whenever no result
//! is waiting, then publishes it through the `ready` flag. The control loop polls the flag with
//! [`SolverRunner::get_updated_solver`], never blocking on a solve. When it adopts a new policy it
//! records the policy lag, the time since that solve started, and indexes the policy at
//! `⌊(time since adoption + lag) / dt⌋` so the stale-but-in-flight result is applied at the
//! correct point of its horizon.
//!
//! Solvers are never modified after being solved, so once adopted a policy is shared read-only.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, info, warn};
use nalgebra::DVector;
use serde::Deserialize;

use crate::lqr::SolverError;

use self::worker::worker_thread;

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod clock;
mod factory;
mod worker;

pub use clock::{steps_elapsed, steps_elapsed_secs, Clock, ManualClock, MonotonicClock};
pub use factory::{LqrFactory, LqrPolicy, MpcFactory, PolicySolver, SolverFactory};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the solver runner
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerParams {
    /// Time the worker sleeps between polls and after each solve
    ///
    /// Units: milliseconds
    pub worker_sleep_ms: u64,
}

/// Runs a solver factory on a background thread and hands its results to the control loop.
pub struct SolverRunner<F: SolverFactory> {
    shared: Arc<Shared<F>>,

    worker_jh: Option<JoinHandle<Result<(), RunnerError>>>,

    policy: Option<Arc<F::Solver>>,
    policy_lag: Duration,
    control_start: Duration,
}

pub(crate) struct Shared<F: SolverFactory> {
    pub factory: F,
    pub clock: Arc<dyn Clock>,
    pub params: RunnerParams,

    pub states: RwLock<StatePair>,

    pub slot: Mutex<Option<SolvedPolicy<F::Solver>>>,
    pub ready: AtomicBool,
    pub stop: AtomicBool,
}

pub(crate) struct StatePair {
    pub current: DVector<f64>,
    pub desired: DVector<f64>,
}

pub(crate) struct SolvedPolicy<S> {
    pub solver: S,

    /// Clock time at which the solve started
    pub started_at: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Sync primitive is poisoned")]
    PoisonError,

    #[error("Couldn't spawn the solver worker thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("The solver worker thread panicked")]
    WorkerPanicked,

    #[error("The solver worker thread has already been stopped")]
    WorkerStopped,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RunnerParams {
    fn default() -> Self {
        Self { worker_sleep_ms: 1 }
    }
}

impl<F: SolverFactory> SolverRunner<F> {
    /// Start the worker thread, which immediately begins solving from `initial_state` towards
    /// `desired_state`.
    pub fn start(
        factory: F,
        initial_state: DVector<f64>,
        desired_state: DVector<f64>,
        clock: Arc<dyn Clock>,
        params: RunnerParams,
    ) -> Result<Self, RunnerError> {
        check_state(&factory, &initial_state, "initial state")?;
        check_state(&factory, &desired_state, "desired state")?;

        let shared = Arc::new(Shared {
            factory,
            clock,
            params,
            states: RwLock::new(StatePair {
                current: initial_state,
                desired: desired_state,
            }),
            slot: Mutex::new(None),
            ready: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        });

        let worker_shared = shared.clone();
        let worker_jh = thread::Builder::new()
            .name("solver_worker".into())
            .spawn(move || worker_thread(worker_shared))
            .map_err(RunnerError::ThreadSpawn)?;

        info!("Solver runner started");

        Ok(Self {
            shared,
            worker_jh: Some(worker_jh),
            policy: None,
            policy_lag: Duration::ZERO,
            control_start: Duration::ZERO,
        })
    }

    /// Set the measured state the next solve will start from.
    pub fn update_state(&self, state: &DVector<f64>) -> Result<(), RunnerError> {
        check_state(&self.shared.factory, state, "state")?;
        self.shared.states.write()?.current = state.clone();
        Ok(())
    }

    /// Set the state the next solve will drive towards.
    pub fn set_desired_state(&self, state: &DVector<f64>) -> Result<(), RunnerError> {
        check_state(&self.shared.factory, state, "desired state")?;
        self.shared.states.write()?.desired = state.clone();
        Ok(())
    }

    /// Whether a solved policy is waiting to be adopted.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Adopt the latest solved policy if there is one. Never blocks on a solve.
    ///
    /// Returns the new policy, or `None` if the worker hasn't finished one since the last call.
    pub fn get_updated_solver(&mut self) -> Result<Option<Arc<F::Solver>>, RunnerError> {
        if !self.shared.ready.load(Ordering::Acquire) {
            return Ok(None);
        }

        let solved = self.shared.slot.lock()?.take();

        // Let the worker start the next solve
        self.shared.ready.store(false, Ordering::Release);

        match solved {
            Some(s) => {
                let now = self.shared.clock.now();
                self.policy_lag = now.saturating_sub(s.started_at);
                self.control_start = now;

                debug!(
                    "Adopted new policy with lag {:.3} ms",
                    self.policy_lag.as_secs_f64() * 1000.0
                );

                let policy = Arc::new(s.solver);
                self.policy = Some(policy.clone());
                Ok(Some(policy))
            }
            None => {
                warn!("Solver ready flag was set but no policy was found");
                Ok(None)
            }
        }
    }

    /// Optimal input for the measured state at the current latency compensated step.
    ///
    /// Gives the zero input until the first policy has been adopted.
    pub fn optimal_input(&self, state: &DVector<f64>) -> Result<DVector<f64>, RunnerError> {
        match self.policy_time_step() {
            Some(step) => self.optimal_input_at(step, state),
            None => Ok(DVector::zeros(self.shared.factory.input_dim())),
        }
    }

    /// Optimal input for the measured state at an explicit step of the current policy.
    pub fn optimal_input_at(
        &self,
        step: usize,
        state: &DVector<f64>,
    ) -> Result<DVector<f64>, RunnerError> {
        match self.policy {
            Some(ref p) => Ok(p.optimal_input(step, state)?),
            None => Ok(DVector::zeros(self.shared.factory.input_dim())),
        }
    }

    /// The step of the current policy which applies now, `⌊(elapsed + lag) / dt⌋`.
    pub fn policy_time_step(&self) -> Option<usize> {
        self.policy.as_ref().map(|p| {
            let elapsed = self.shared.clock.now().saturating_sub(self.control_start);
            steps_elapsed(elapsed + self.policy_lag, p.dt())
        })
    }

    /// Time between the start of the current policy's solve and its adoption.
    pub fn policy_lag(&self) -> Duration {
        self.policy_lag
    }

    /// The currently adopted policy.
    pub fn policy(&self) -> Option<&Arc<F::Solver>> {
        self.policy.as_ref()
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Check that the worker is still running, returning its error if it has exited.
    pub fn check_worker(&mut self) -> Result<(), RunnerError> {
        let finished = match self.worker_jh {
            Some(ref jh) => jh.is_finished(),
            None => return Err(RunnerError::WorkerStopped),
        };

        if finished {
            self.join_worker()?;
            return Err(RunnerError::WorkerStopped);
        }

        Ok(())
    }

    /// Stop the worker and wait for it to exit. This may take up to one full solve.
    pub fn stop(mut self) -> Result<(), RunnerError> {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<(), RunnerError> {
        match self.worker_jh.take() {
            Some(jh) => match jh.join() {
                Ok(r) => r,
                Err(_) => Err(RunnerError::WorkerPanicked),
            },
            None => Ok(()),
        }
    }
}

impl<F: SolverFactory> Drop for SolverRunner<F> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
    }
}

impl<G> From<PoisonError<G>> for RunnerError {
    fn from(_: PoisonError<G>) -> Self {
        Self::PoisonError
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_state<F: SolverFactory>(
    factory: &F,
    state: &DVector<f64>,
    what: &'static str,
) -> Result<(), RunnerError> {
    if state.len() != factory.state_dim() {
        return Err(SolverError::DimensionMismatch {
            what,
            expected: factory.state_dim(),
            found: state.len(),
        }
        .into());
    }
    Ok(())
}
