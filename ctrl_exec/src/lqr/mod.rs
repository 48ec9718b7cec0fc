//! # Linear-Quadratic Regulator
//!
//! Finite-horizon discrete LQR. `solve` linearises the model once about the initial state and
//! runs the Riccati recursion strictly backward from the terminal cost, filling the cost-to-go
//! sequence `P[0..N]` and the feedback gains `K[0..N-1]`. A singular step does not fail the solve:
//! the cost-to-go and gains for that step and every earlier one are left at zero, so the
//! controller commands zero input there, and a warning is logged.
//!
//! Once solved the instance is only read. Refining the solution means building a new instance.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use log::{trace, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    linalg::clip_input,
    model::{DynamicModel, ModelError},
};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod costs;
pub(crate) mod riccati;

pub use costs::CostMatrices;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Finite-horizon LQR solver.
#[derive(Clone)]
pub struct LqrSolver {
    horizon: usize,
    dt: f64,

    costs: CostMatrices,
    model: Arc<dyn DynamicModel>,

    /// Cost-to-go, `P[N-1] = Qf`
    p: Vec<DMatrix<f64>>,

    /// Feedback gains, one fewer than the cost-to-go
    k: Vec<DMatrix<f64>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("Dynamic model error: {0}")]
    Model(#[from] ModelError),

    #[error("The horizon must contain at least 2 steps, found {0}")]
    InvalidHorizon(usize),

    #[error("The time step must be positive and finite, found {0}")]
    InvalidTimeStep(f64),

    #[error("Dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("The solver must be initialised with {0} first")]
    NotInitialised(&'static str),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LqrSolver {
    /// Create a new solver.
    ///
    /// The model is checked for a specialisation so that a misconfigured model is reported here
    /// rather than on the first solve.
    pub fn new(
        horizon: usize,
        dt: f64,
        costs: CostMatrices,
        model: Arc<dyn DynamicModel>,
    ) -> Result<Self, SolverError> {
        if horizon < 2 {
            return Err(SolverError::InvalidHorizon(horizon));
        }
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SolverError::InvalidTimeStep(dt));
        }
        if model.as_linear().is_none() && model.as_nonlinear().is_none() {
            return Err(ModelError::NoSpecialisation.into());
        }
        costs.validate(model.as_ref())?;

        Ok(Self {
            horizon,
            dt,
            costs,
            model,
            p: Vec::new(),
            k: Vec::new(),
        })
    }

    /// Solve the Riccati recursion with the model linearised about `initial_state`.
    ///
    /// Every call recomputes the full sequences from scratch.
    pub fn solve(&mut self, initial_state: &DVector<f64>) -> Result<(), SolverError> {
        self.check_state(initial_state, "initial state")?;

        let (a, b) = self.model.transition_matrices(initial_state, self.dt)?;

        let n = self.model.state_dim();
        let m = self.model.input_dim();
        let last = self.horizon - 1;

        let mut p = vec![DMatrix::zeros(n, n); self.horizon];
        let mut k = vec![DMatrix::zeros(m, n); last];
        p[last] = self.costs.terminal.clone();

        for t in (1..=last).rev() {
            match riccati::step(&a, &b, &p[t], self.state_cost(t), &self.costs.input) {
                Some(s) => {
                    p[t - 1] = s.p;
                    k[t - 1] = s.k;
                }
                None => {
                    warn!(
                        "LQR: singular inversion at step {}, zeroing cost-to-go and gains for \
                         steps 0 to {}",
                        t,
                        t - 1
                    );
                    break;
                }
            }
        }

        trace!("LQR: solved {} steps, P[0] = {}", self.horizon, p[0]);

        self.p = p;
        self.k = k;

        Ok(())
    }

    /// Get the optimal input at the given step for the current and desired states.
    ///
    /// The model is re-linearised about `state` and a one-shot gain computed against the solved
    /// cost-to-go. If that is singular the stored gain for the step is used instead. Steps beyond
    /// the gain sequence produce the zero input.
    pub fn optimal_input(
        &self,
        step: usize,
        state: &DVector<f64>,
        desired_state: &DVector<f64>,
    ) -> Result<DVector<f64>, SolverError> {
        if !self.is_solved() {
            return Err(SolverError::NotInitialised("solve"));
        }
        self.check_state(state, "state")?;
        self.check_state(desired_state, "desired state")?;

        if step >= self.k.len() {
            return Ok(DVector::zeros(self.model.input_dim()));
        }

        let (a, b) = self.model.transition_matrices(state, self.dt)?;

        let k = match riccati::gain(&a, &b, &self.p[step], &self.costs.input) {
            Some(g) => g.k,
            None => {
                warn!("LQR: singular gain at step {}, using the stored gain", step);
                self.k[step].clone()
            }
        };

        Ok(clip_input(&(k * (state - desired_state))))
    }

    /// The state cost applying at step `t`: `Qf` on the final step, otherwise `Q`.
    pub fn state_cost(&self, t: usize) -> &DMatrix<f64> {
        if t >= self.horizon - 1 {
            &self.costs.terminal
        } else {
            &self.costs.stage
        }
    }

    /// Replace the cost matrices used by the next solve.
    pub fn set_costs(&mut self, costs: CostMatrices) -> Result<(), SolverError> {
        costs.validate(self.model.as_ref())?;
        self.costs = costs;
        Ok(())
    }

    pub fn is_solved(&self) -> bool {
        !self.p.is_empty()
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn costs(&self) -> &CostMatrices {
        &self.costs
    }

    pub fn model(&self) -> &Arc<dyn DynamicModel> {
        &self.model
    }

    pub fn state_dim(&self) -> usize {
        self.model.state_dim()
    }

    pub fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    /// The solved cost-to-go sequence, empty before the first solve.
    pub fn cost_to_go(&self) -> &[DMatrix<f64>] {
        &self.p
    }

    /// The solved feedback gains, empty before the first solve.
    pub fn gains(&self) -> &[DMatrix<f64>] {
        &self.k
    }

    fn check_state(&self, state: &DVector<f64>, what: &'static str) -> Result<(), SolverError> {
        if state.len() != self.model.state_dim() {
            return Err(SolverError::DimensionMismatch {
                what,
                expected: self.model.state_dim(),
                found: state.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for LqrSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LqrSolver")
            .field("horizon", &self.horizon)
            .field("dt", &self.dt)
            .field("costs", &self.costs)
            .field("solved", &self.is_solved())
            .finish()
    }
}
