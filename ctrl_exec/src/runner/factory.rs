//! Solver factories and the read-only policy interface used by the control loop

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, RwLock};

use log::warn;
use nalgebra::DVector;

use crate::{
    cost::ContributorSet,
    lqr::{CostMatrices, LqrSolver, SolverError},
    model::DynamicModel,
    mpc::{MpcSolver, DEFAULT_MAX_STEP_HALVINGS},
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A solved policy which the foreground can query but never modify.
pub trait PolicySolver: Send + Sync {
    /// Input to apply at `step` of the horizon for the measured `state`.
    fn optimal_input(&self, step: usize, state: &DVector<f64>) -> Result<DVector<f64>, SolverError>;

    /// Length of one horizon step in seconds.
    fn dt(&self) -> f64;

    fn input_dim(&self) -> usize;
}

/// Builds and fully solves a fresh solver on the runner's worker thread.
pub trait SolverFactory: Send + Sync + 'static {
    type Solver: PolicySolver + 'static;

    /// Build a new solver and solve it from `current` towards `desired`.
    fn solve(
        &self,
        current: &DVector<f64>,
        desired: &DVector<f64>,
    ) -> Result<Self::Solver, SolverError>;

    fn state_dim(&self) -> usize;

    fn input_dim(&self) -> usize;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Builds iterative LQR solvers.
#[derive(Debug)]
pub struct MpcFactory {
    setup: Setup,
    contributors: ContributorSet,
    iterations: usize,
    max_step_halvings: usize,
}

/// Builds plain LQR solvers.
#[derive(Debug)]
pub struct LqrFactory {
    setup: Setup,
}

/// An LQR solver paired with the desired state it was solved for.
#[derive(Debug, Clone)]
pub struct LqrPolicy {
    lqr: LqrSolver,
    desired_state: DVector<f64>,
}

/// Configuration shared by both factories. The costs may be swapped between solves.
struct Setup {
    horizon: usize,
    dt: f64,
    costs: RwLock<CostMatrices>,
    model: Arc<dyn DynamicModel>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Setup {
    /// Builds a throwaway solver so that configuration errors surface at construction.
    fn new(
        horizon: usize,
        dt: f64,
        costs: CostMatrices,
        model: Arc<dyn DynamicModel>,
    ) -> Result<Self, SolverError> {
        LqrSolver::new(horizon, dt, costs.clone(), model.clone())?;

        Ok(Self {
            horizon,
            dt,
            costs: RwLock::new(costs),
            model,
        })
    }

    fn lqr(&self) -> Result<LqrSolver, SolverError> {
        LqrSolver::new(self.horizon, self.dt, self.costs(), self.model.clone())
    }

    fn costs(&self) -> CostMatrices {
        match self.costs.read() {
            Ok(c) => c.clone(),
            Err(e) => {
                warn!("Cost matrix lock was poisoned, recovering");
                e.into_inner().clone()
            }
        }
    }

    fn set_costs(&self, costs: CostMatrices) -> Result<(), SolverError> {
        costs.validate(self.model.as_ref())?;

        match self.costs.write() {
            Ok(mut c) => *c = costs,
            Err(e) => {
                warn!("Cost matrix lock was poisoned, recovering");
                *e.into_inner() = costs
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Setup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Setup")
            .field("horizon", &self.horizon)
            .field("dt", &self.dt)
            .field("costs", &self.costs)
            .finish()
    }
}

impl MpcFactory {
    pub fn new(
        horizon: usize,
        dt: f64,
        costs: CostMatrices,
        model: Arc<dyn DynamicModel>,
        contributors: ContributorSet,
        iterations: usize,
    ) -> Result<Self, SolverError> {
        Ok(Self {
            setup: Setup::new(horizon, dt, costs, model)?,
            contributors,
            iterations,
            max_step_halvings: DEFAULT_MAX_STEP_HALVINGS,
        })
    }

    pub fn with_max_step_halvings(mut self, max_step_halvings: usize) -> Self {
        self.max_step_halvings = max_step_halvings;
        self
    }

    /// Replace the cost matrices used from the next solve onwards.
    pub fn set_costs(&self, costs: CostMatrices) -> Result<(), SolverError> {
        self.setup.set_costs(costs)
    }

    /// The contributor set shared with every solver this factory builds.
    pub fn contributors(&self) -> &ContributorSet {
        &self.contributors
    }
}

impl SolverFactory for MpcFactory {
    type Solver = MpcSolver;

    fn solve(
        &self,
        current: &DVector<f64>,
        desired: &DVector<f64>,
    ) -> Result<Self::Solver, SolverError> {
        let mut mpc = MpcSolver::from_lqr(self.setup.lqr()?, self.contributors.clone())
            .with_max_step_halvings(self.max_step_halvings);

        mpc.initialize_and_iterate(self.iterations, current, desired)?;

        Ok(mpc)
    }

    fn state_dim(&self) -> usize {
        self.setup.model.state_dim()
    }

    fn input_dim(&self) -> usize {
        self.setup.model.input_dim()
    }
}

impl LqrFactory {
    pub fn new(
        horizon: usize,
        dt: f64,
        costs: CostMatrices,
        model: Arc<dyn DynamicModel>,
    ) -> Result<Self, SolverError> {
        Ok(Self {
            setup: Setup::new(horizon, dt, costs, model)?,
        })
    }

    /// Replace the cost matrices used from the next solve onwards.
    pub fn set_costs(&self, costs: CostMatrices) -> Result<(), SolverError> {
        self.setup.set_costs(costs)
    }
}

impl SolverFactory for LqrFactory {
    type Solver = LqrPolicy;

    fn solve(
        &self,
        current: &DVector<f64>,
        desired: &DVector<f64>,
    ) -> Result<Self::Solver, SolverError> {
        let mut lqr = self.setup.lqr()?;
        lqr.solve(current)?;

        Ok(LqrPolicy {
            lqr,
            desired_state: desired.clone(),
        })
    }

    fn state_dim(&self) -> usize {
        self.setup.model.state_dim()
    }

    fn input_dim(&self) -> usize {
        self.setup.model.input_dim()
    }
}

impl LqrPolicy {
    pub fn lqr(&self) -> &LqrSolver {
        &self.lqr
    }

    pub fn desired_state(&self) -> &DVector<f64> {
        &self.desired_state
    }
}

impl PolicySolver for LqrPolicy {
    fn optimal_input(&self, step: usize, state: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        self.lqr.optimal_input(step, state, &self.desired_state)
    }

    fn dt(&self) -> f64 {
        self.lqr.dt()
    }

    fn input_dim(&self) -> usize {
        self.lqr.input_dim()
    }
}

impl PolicySolver for MpcSolver {
    fn optimal_input(&self, step: usize, state: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        MpcSolver::optimal_input(self, step, state)
    }

    fn dt(&self) -> f64 {
        MpcSolver::dt(self)
    }

    fn input_dim(&self) -> usize {
        MpcSolver::input_dim(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::PointMass;

    fn costs() -> CostMatrices {
        CostMatrices::from_diagonals(&[1000.0, 1000.0], &[1.0, 0.0], &[1.0])
    }

    #[test]
    fn test_factories_check_configuration() {
        let model: Arc<dyn DynamicModel> = Arc::new(PointMass::new(1, 10.0));

        assert!(matches!(
            LqrFactory::new(1, 0.01, costs(), model.clone()),
            Err(SolverError::InvalidHorizon(1))
        ));
        assert!(matches!(
            MpcFactory::new(
                100,
                0.01,
                CostMatrices::from_diagonals(&[1.0], &[1.0], &[1.0]),
                model,
                ContributorSet::new(),
                5
            ),
            Err(SolverError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_lqr_factory() {
        let factory = LqrFactory::new(100, 0.01, costs(), Arc::new(PointMass::new(1, 10.0))).unwrap();
        let start = DVector::zeros(2);
        let goal = DVector::from_column_slice(&[1.0, 0.0]);

        let policy = factory.solve(&start, &goal).unwrap();

        assert_eq!(policy.desired_state(), &goal);
        assert_eq!(PolicySolver::input_dim(&policy), 1);
        assert_eq!(
            PolicySolver::optimal_input(&policy, 0, &start).unwrap(),
            policy.lqr().optimal_input(0, &start, &goal).unwrap()
        );
    }

    #[test]
    fn test_mpc_factory_set_costs() {
        let factory = MpcFactory::new(
            50,
            0.01,
            costs(),
            Arc::new(PointMass::new(1, 10.0)),
            ContributorSet::new(),
            2,
        )
        .unwrap();

        assert!(factory
            .set_costs(CostMatrices::from_diagonals(&[1.0], &[1.0], &[1.0]))
            .is_err());

        let new_costs = CostMatrices::from_diagonals(&[10.0, 10.0], &[2.0, 0.0], &[3.0]);
        factory.set_costs(new_costs.clone()).unwrap();

        let mpc = factory
            .solve(&DVector::zeros(2), &DVector::from_column_slice(&[1.0, 0.0]))
            .unwrap();
        assert_eq!(mpc.lqr().costs().input, new_costs.input);
        assert!(mpc.has_policy());
        assert_eq!(PolicySolver::dt(&mpc), 0.01);
    }
}
