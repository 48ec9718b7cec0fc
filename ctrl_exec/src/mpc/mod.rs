//! # Model Predictive Control
//!
//! Iterative LQR built on [`LqrSolver`]. Each refinement is a forward pass, which simulates the
//! nominal trajectory under the current policy and caches the model linearisation at every step,
//! followed by a backward pass, which runs the Riccati recursion along that trajectory with the
//! contributor costs folded in. The protocol is:
//!
//! 1. [`MpcSolver::initial_iteration`] - plain LQR solve at the current state,
//! 2. [`MpcSolver::simulate_iteration`] - forward pass,
//! 3. [`MpcSolver::run_iteration`] - backward pass,
//!
//! with 2 and 3 repeated for as many refinements as wanted. [`MpcSolver::initialize_and_iterate`]
//! runs the whole sequence.
//!
//! The value function about the nominal trajectory is kept in the form `δᵀPδ + 2lᵀδ`. After the
//! first backward pass each forward pass searches the feedforward step size, halving it until the
//! predicted cost does not increase, so refinement never makes the nominal trajectory worse.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::Arc;

use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector};

use crate::{
    cost::{ContributorSet, ContributorSnapshot},
    linalg::quad_form,
    lqr::{riccati, CostMatrices, LqrSolver, SolverError},
    model::DynamicModel,
    runner::steps_elapsed_secs,
};

use self::nominal::{Nominal, Policy};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod nominal;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default number of times the feedforward step is halved before a forward pass gives up.
pub const DEFAULT_MAX_STEP_HALVINGS: usize = 8;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Iterative LQR solver with pluggable cost contributors.
#[derive(Debug, Clone)]
pub struct MpcSolver {
    lqr: LqrSolver,
    contributors: ContributorSet,
    max_step_halvings: usize,

    initial_state: Option<DVector<f64>>,
    desired_state: Option<DVector<f64>>,

    nominal: Option<Nominal>,
    policy: Option<Policy>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MpcSolver {
    /// Create a new solver. See [`LqrSolver::new`] for the configuration checks.
    pub fn new(
        horizon: usize,
        dt: f64,
        costs: CostMatrices,
        model: Arc<dyn DynamicModel>,
        contributors: ContributorSet,
    ) -> Result<Self, SolverError> {
        Ok(Self::from_lqr(
            LqrSolver::new(horizon, dt, costs, model)?,
            contributors,
        ))
    }

    /// Wrap an existing LQR solver.
    pub fn from_lqr(lqr: LqrSolver, contributors: ContributorSet) -> Self {
        Self {
            lqr,
            contributors,
            max_step_halvings: DEFAULT_MAX_STEP_HALVINGS,
            initial_state: None,
            desired_state: None,
            nominal: None,
            policy: None,
        }
    }

    /// Set the number of step halvings tried by each forward pass.
    pub fn with_max_step_halvings(mut self, max_step_halvings: usize) -> Self {
        self.max_step_halvings = max_step_halvings;
        self
    }

    /// Run the initial iteration followed by `iterations` forward and backward passes.
    pub fn initialize_and_iterate(
        &mut self,
        iterations: usize,
        current_state: &DVector<f64>,
        desired_state: &DVector<f64>,
    ) -> Result<(), SolverError> {
        self.initial_iteration(current_state, desired_state)?;

        for i in 0..iterations {
            let alpha = self.simulate_iteration()?;
            self.run_iteration()?;

            debug!(
                "MPC: iteration {} step {} cost {:.6}",
                i,
                alpha,
                self.nominal_cost().unwrap_or(std::f64::NAN)
            );
        }

        Ok(())
    }

    /// Solve plain LQR about the current state and forget any previous trajectory.
    pub fn initial_iteration(
        &mut self,
        current_state: &DVector<f64>,
        desired_state: &DVector<f64>,
    ) -> Result<(), SolverError> {
        self.check_state(desired_state, "desired state")?;
        self.lqr.solve(current_state)?;

        self.initial_state = Some(current_state.clone());
        self.desired_state = Some(desired_state.clone());
        self.nominal = None;
        self.policy = None;

        Ok(())
    }

    /// Forward pass: simulate a new nominal trajectory.
    ///
    /// Before the first backward pass the LQR policy is simulated. Afterwards the policy from the
    /// latest backward pass is simulated with feedforward step sizes `1, ½, ¼, ...` and the first
    /// trajectory whose cost does not exceed the current one is accepted. Returns the accepted
    /// step size, or zero if the current trajectory was kept.
    pub fn simulate_iteration(&mut self) -> Result<f64, SolverError> {
        let snapshot = self.contributors.snapshot();

        let policy = match self.policy {
            Some(ref p) => p,
            None => {
                self.nominal = Some(self.rollout(&snapshot, None)?);
                return Ok(1.0);
            }
        };

        // Contributors may have changed since the nominal was costed
        let current_cost = match self.nominal {
            Some(ref n) => self.trajectory_cost_with(&snapshot, &n.states, &n.inputs)?,
            None => std::f64::INFINITY,
        };

        let mut alpha = 1.0;
        for _ in 0..=self.max_step_halvings {
            let candidate = self.rollout(&snapshot, Some((policy, alpha)))?;

            if candidate.cost <= current_cost {
                trace!(
                    "MPC: accepted step {} ({:.6} -> {:.6})",
                    alpha,
                    current_cost,
                    candidate.cost
                );
                self.nominal = Some(candidate);
                return Ok(alpha);
            }

            alpha *= 0.5;
        }

        debug!("MPC: no step reduced the cost, keeping the nominal trajectory");

        if let Some(ref mut n) = self.nominal {
            n.cost = current_cost;
        }

        Ok(0.0)
    }

    /// Backward pass along the nominal trajectory.
    ///
    /// A singular step zeroes the cost-to-go, gains and affine term for that step and every
    /// earlier one.
    pub fn run_iteration(&mut self) -> Result<(), SolverError> {
        let desired = self
            .desired_state
            .as_ref()
            .ok_or(SolverError::NotInitialised("initial_iteration"))?;
        let nominal = self
            .nominal
            .as_ref()
            .ok_or(SolverError::NotInitialised("simulate_iteration"))?;

        let snapshot = self.contributors.snapshot();

        let horizon = self.lqr.horizon();
        let dt = self.lqr.dt();
        let n = self.lqr.state_dim();
        let m = self.lqr.input_dim();
        let last = horizon - 1;
        let r = &self.lqr.costs().input;

        let mut p = vec![DMatrix::zeros(n, n); horizon];
        let mut k = vec![DMatrix::zeros(m, n); last];
        let mut l = vec![DVector::zeros(n); horizon];

        let terminal = &self.lqr.costs().terminal;
        p[last] = terminal.clone();
        l[last] = terminal * (&nominal.states[horizon] - desired);

        for t in (1..=last).rev() {
            let x = &nominal.states[t];
            let a = &nominal.a[t];
            let b = &nominal.b[t];
            let state_cost = self.lqr.state_cost(t);

            let q = state_cost + snapshot.quadratic(x, t, dt);

            let s = match riccati::step(a, b, &p[t], &q, r) {
                Some(s) => s,
                None => {
                    warn!(
                        "MPC: singular inversion at step {}, zeroing cost-to-go, gains and \
                         feedforward for steps 0 to {}",
                        t,
                        t - 1
                    );
                    break;
                }
            };

            // l[t-1] = Q_t(x̄ - x_d) + ½q + (A + BK)ᵀl[t] + KᵀRū
            let closed_loop = a + b * &s.k;
            l[t - 1] = state_cost * (x - desired)
                + snapshot.linear(x, t, dt) * 0.5
                + closed_loop.transpose() * &l[t]
                + s.k.transpose() * (r * &nominal.inputs[t]);

            p[t - 1] = s.p;
            k[t - 1] = s.k;
        }

        trace!("MPC: backward pass P[0] = {}, l[0] = {}", p[0], l[0]);

        self.policy = Some(Policy {
            states: nominal.states.clone(),
            inputs: nominal.inputs.clone(),
            p,
            k,
            l,
        });

        Ok(())
    }

    /// Get the optimal input at `step` for the measured `state`.
    ///
    /// Uses the feedback plus feedforward policy from the latest backward pass while `step` is
    /// inside the horizon, otherwise falls back to the LQR gains, which give the zero input past
    /// their end.
    pub fn optimal_input(
        &self,
        step: usize,
        state: &DVector<f64>,
    ) -> Result<DVector<f64>, SolverError> {
        self.check_state(state, "state")?;

        if let Some(ref policy) = self.policy {
            if step < policy.len() {
                let (a, b) = self.lqr.model().transition_matrices(state, self.lqr.dt())?;
                return Ok(policy.input(step, state, &a, &b, &self.lqr.costs().input, 1.0));
            }
        }

        match self.desired_state {
            Some(ref desired) => self.lqr.optimal_input(step, state, desired),
            None => Err(SolverError::NotInitialised("initial_iteration")),
        }
    }

    /// Get the optimal input `elapsed_s` seconds after the start of the horizon.
    pub fn optimal_input_at(
        &self,
        elapsed_s: f64,
        state: &DVector<f64>,
    ) -> Result<DVector<f64>, SolverError> {
        self.optimal_input(steps_elapsed_secs(elapsed_s, self.lqr.dt()), state)
    }

    /// Total predicted cost of a trajectory of `N+1` states and `N` inputs.
    pub fn trajectory_cost(
        &self,
        states: &[DVector<f64>],
        inputs: &[DVector<f64>],
    ) -> Result<f64, SolverError> {
        self.trajectory_cost_with(&self.contributors.snapshot(), states, inputs)
    }

    /// Simulate the model from the initial state under either the LQR policy or the given
    /// backward-pass policy and step size.
    fn rollout(
        &self,
        snapshot: &ContributorSnapshot,
        policy: Option<(&Policy, f64)>,
    ) -> Result<Nominal, SolverError> {
        let (initial, desired) = match (&self.initial_state, &self.desired_state) {
            (Some(i), Some(d)) => (i, d),
            _ => return Err(SolverError::NotInitialised("initial_iteration")),
        };

        let horizon = self.lqr.horizon();
        let dt = self.lqr.dt();
        let model = self.lqr.model();

        let mut states = Vec::with_capacity(horizon + 1);
        let mut inputs = Vec::with_capacity(horizon);
        let mut a_seq = Vec::with_capacity(horizon);
        let mut b_seq = Vec::with_capacity(horizon);

        states.push(initial.clone());

        for t in 0..horizon {
            let x = &states[t];
            let (a, b) = model.transition_matrices(x, dt)?;

            let u = match policy {
                Some((p, alpha)) => p.input(t, x, &a, &b, &self.lqr.costs().input, alpha),
                None => self.lqr.optimal_input(t, x, desired)?,
            };

            let next = model.simulate(x, &u, dt)?;

            states.push(next);
            inputs.push(u);
            a_seq.push(a);
            b_seq.push(b);
        }

        let cost = self.trajectory_cost_with(snapshot, &states, &inputs)?;

        Ok(Nominal {
            states,
            inputs,
            a: a_seq,
            b: b_seq,
            cost,
        })
    }

    fn trajectory_cost_with(
        &self,
        snapshot: &ContributorSnapshot,
        states: &[DVector<f64>],
        inputs: &[DVector<f64>],
    ) -> Result<f64, SolverError> {
        let desired = self
            .desired_state
            .as_ref()
            .ok_or(SolverError::NotInitialised("initial_iteration"))?;

        let horizon = self.lqr.horizon();
        if states.len() != horizon + 1 {
            return Err(SolverError::DimensionMismatch {
                what: "trajectory states",
                expected: horizon + 1,
                found: states.len(),
            });
        }
        if inputs.len() != horizon {
            return Err(SolverError::DimensionMismatch {
                what: "trajectory inputs",
                expected: horizon,
                found: inputs.len(),
            });
        }

        let dt = self.lqr.dt();
        let costs = self.lqr.costs();
        let mut cost = 0.0;

        for (t, x) in states.iter().enumerate().take(horizon).skip(1) {
            cost += quad_form(self.lqr.state_cost(t), &(x - desired));
            cost += snapshot.cost(x, t, dt);
        }

        for u in inputs {
            cost += quad_form(&costs.input, u);
        }

        cost += quad_form(&costs.terminal, &(&states[horizon] - desired));

        Ok(cost)
    }

    fn check_state(&self, state: &DVector<f64>, what: &'static str) -> Result<(), SolverError> {
        if state.len() != self.lqr.state_dim() {
            return Err(SolverError::DimensionMismatch {
                what,
                expected: self.lqr.state_dim(),
                found: state.len(),
            });
        }
        Ok(())
    }

    pub fn lqr(&self) -> &LqrSolver {
        &self.lqr
    }

    pub fn horizon(&self) -> usize {
        self.lqr.horizon()
    }

    pub fn dt(&self) -> f64 {
        self.lqr.dt()
    }

    pub fn input_dim(&self) -> usize {
        self.lqr.input_dim()
    }

    pub fn contributors(&self) -> &ContributorSet {
        &self.contributors
    }

    pub fn desired_state(&self) -> Option<&DVector<f64>> {
        self.desired_state.as_ref()
    }

    /// Whether a backward pass has produced a policy.
    pub fn has_policy(&self) -> bool {
        self.policy.is_some()
    }

    /// States of the latest nominal trajectory.
    pub fn nominal_states(&self) -> Option<&[DVector<f64>]> {
        self.nominal.as_ref().map(|n| n.states.as_slice())
    }

    /// Inputs of the latest nominal trajectory.
    pub fn nominal_inputs(&self) -> Option<&[DVector<f64>]> {
        self.nominal.as_ref().map(|n| n.inputs.as_slice())
    }

    /// Predicted cost of the latest nominal trajectory.
    pub fn nominal_cost(&self) -> Option<f64> {
        self.nominal.as_ref().map(|n| n.cost)
    }

    /// Cost-to-go of the latest backward pass.
    pub fn cost_to_go(&self) -> Option<&[DMatrix<f64>]> {
        self.policy.as_ref().map(|p| p.p.as_slice())
    }

    /// Feedback gains of the latest backward pass.
    pub fn gains(&self) -> Option<&[DMatrix<f64>]> {
        self.policy.as_ref().map(|p| p.k.as_slice())
    }

    /// Affine cost-to-go term of the latest backward pass.
    pub fn feedforward(&self) -> Option<&[DVector<f64>]> {
        self.policy.as_ref().map(|p| p.l.as_slice())
    }
}
