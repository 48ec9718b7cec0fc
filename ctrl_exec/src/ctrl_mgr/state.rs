//! Implementations for the CtrlMgr state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::sync::Arc;

use log::{info, warn};
use nalgebra::DVector;
use util::{module::CyclicModule, session::Session};

// Internal
use super::{CtrlMgrError, InitData, InputData, OutputData, StatusReport};
use crate::{
    cost::{ContributorSet, Obstacle},
    model::PointMass,
    params::CtrlMgrParams,
    runner::{MonotonicClock, MpcFactory, SolverRunner},
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Control manager module state
#[derive(Default)]
pub struct CtrlMgr {
    pub(crate) params: Option<CtrlMgrParams>,

    runner: Option<SolverRunner<MpcFactory>>,

    /// Obstacles known to the manager, also held in the runner's contributor set
    obstacles: Vec<Obstacle>,

    desired_state: Option<DVector<f64>>,

    pub(crate) report: StatusReport,
}

// ------------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// ------------------------------------------------------------------------------------------------

impl CyclicModule for CtrlMgr {
    type InitData = InitData;
    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type Error = CtrlMgrError;

    /// Initialise the CtrlMgr module.
    ///
    /// Builds the plant model and the cost contributors from the parameters and starts the
    /// solver runner.
    fn init(&mut self, init_data: Self::InitData, session: &Session) -> Result<(), Self::Error> {
        let InitData { mpc, ctrl_mgr } = init_data;

        let state_dim = ctrl_mgr.initial_state.len();
        if state_dim == 0 || state_dim % 2 != 0 {
            return Err(CtrlMgrError::InvalidStateDim(state_dim));
        }

        let model = Arc::new(PointMass::new(state_dim / 2, ctrl_mgr.max_accel_mss));

        let contributors = ContributorSet::new();
        for obs in ctrl_mgr.obstacles.iter() {
            obs.validate()?;
            contributors.push(obs.clone());
        }
        for wp in ctrl_mgr.waypoints.iter() {
            contributors.push(wp.to_waypoint()?);
        }

        let factory = MpcFactory::new(
            mpc.horizon,
            mpc.dt_s,
            mpc.cost_matrices(),
            model,
            contributors,
            mpc.iterations,
        )?
        .with_max_step_halvings(mpc.max_step_halvings);

        let initial_state = DVector::from_column_slice(&ctrl_mgr.initial_state);
        let desired_state = DVector::from_column_slice(&ctrl_mgr.desired_state);

        self.runner = Some(SolverRunner::start(
            factory,
            initial_state,
            desired_state.clone(),
            Arc::new(MonotonicClock::new()),
            mpc.runner_params(),
        )?);

        info!(
            "CtrlMgr: {} obstacles, {} waypoints, horizon {} x {} s",
            ctrl_mgr.obstacles.len(),
            ctrl_mgr.waypoints.len(),
            mpc.horizon,
            mpc.dt_s
        );

        session.save("ctrl_mgr/obstacles.json", ctrl_mgr.obstacles.clone());

        self.obstacles = ctrl_mgr.obstacles.clone();
        self.desired_state = Some(desired_state);
        self.params = Some(ctrl_mgr);

        Ok(())
    }

    /// Perform cyclic processing of the control manager.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::Error> {
        // Clear the status report
        self.report = StatusReport::default();

        let runner = self.runner.as_mut().ok_or(CtrlMgrError::NotInitialised)?;

        // Bail out if the worker has died so the caller can stop actuating
        runner.check_worker()?;

        runner.update_state(&input_data.state)?;
        if let Some(ref desired) = input_data.desired_state {
            runner.set_desired_state(desired)?;
            self.desired_state = Some(desired.clone());
        }

        self.report.policy_updated = runner.get_updated_solver()?.is_some();
        self.report.policy_step = runner.policy_time_step();
        self.report.policy_lag_s = runner.policy_lag().as_secs_f64();

        let input = runner.optimal_input(&input_data.state)?;

        self.check_surroundings(&input_data.state);

        Ok((OutputData { input }, self.report.clone()))
    }

    /// Stop the solver runner, waiting for the worker to exit.
    fn stop(&mut self) -> Result<(), Self::Error> {
        match self.runner.take() {
            Some(r) => Ok(r.stop()?),
            None => Ok(()),
        }
    }
}

impl CtrlMgr {
    /// Fill in the obstacle and goal parts of the status report.
    fn check_surroundings(&mut self, state: &DVector<f64>) {
        self.report.min_obstacle_dist_m = self
            .obstacles
            .iter()
            .filter_map(|o| o.distance(state))
            .fold(None, |min: Option<f64>, d| Some(min.map_or(d, |m| m.min(d))));

        for obs in self.obstacles.iter() {
            if obs.collides(state) {
                warn!("CtrlMgr: collision with obstacle at {:?}", obs.centre);
                self.report.collision = true;
            }
        }

        if let (Some(desired), Some(params)) = (&self.desired_state, &self.params) {
            // Positions are every other element of the state
            let dist = state
                .iter()
                .zip(desired.iter())
                .step_by(2)
                .map(|(x, d)| (x - d).powi(2))
                .sum::<f64>()
                .sqrt();

            self.report.goal_reached = dist < params.goal_tolerance_m;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_proc_before_init() {
        let mut ctrl_mgr = CtrlMgr::default();
        let input = InputData {
            state: DVector::zeros(4),
            desired_state: None,
        };

        assert!(matches!(
            ctrl_mgr.proc(&input),
            Err(CtrlMgrError::NotInitialised)
        ));
        assert!(ctrl_mgr.stop().is_ok());
    }

    #[test]
    fn test_check_surroundings() {
        let mut ctrl_mgr = CtrlMgr::default();
        ctrl_mgr.obstacles = vec![
            Obstacle::new(0.5, 0.05, 0.1, 0.15, 1000.0).unwrap(),
            Obstacle::new(2.0, 0.0, 0.1, 0.15, 1000.0).unwrap(),
        ];
        ctrl_mgr.desired_state = Some(DVector::from_column_slice(&[1.0, 0.0, 0.1, 0.0]));
        ctrl_mgr.params = Some(CtrlMgrParams {
            cycle_period_s: 0.02,
            run_duration_s: 1.0,
            max_accel_mss: 10.0,
            initial_state: vec![0.0; 4],
            desired_state: vec![1.0, 0.0, 0.1, 0.0],
            goal_tolerance_m: 0.02,
            obstacles: Vec::new(),
            waypoints: Vec::new(),
        });

        ctrl_mgr.check_surroundings(&DVector::from_column_slice(&[0.5, 1.0, 0.1, 0.0]));
        assert!(ctrl_mgr.report.collision);
        assert!(!ctrl_mgr.report.goal_reached);
        let d = ctrl_mgr.report.min_obstacle_dist_m.unwrap();
        assert!((d - 0.05).abs() < 1e-12);

        ctrl_mgr.report = StatusReport::default();
        ctrl_mgr.check_surroundings(&DVector::from_column_slice(&[1.01, 0.0, 0.1, 0.3]));
        assert!(!ctrl_mgr.report.collision);
        assert!(ctrl_mgr.report.goal_reached);
    }
}
