//! Main control executable entry point.
//!
//! # Architecture
//!
//! The executable runs a fixed-rate control loop around a simulated point-mass plant:
//!
//!     - Initialise the session, logging and parameters
//!     - Initialise the control manager, which starts the background solver
//!     - Main loop:
//!         - Control manager processing: adopt any new policy and compute the input
//!         - Plant simulation over one cycle
//!         - Cycle management
//!     - Save the executed trajectory and shut down
//!
//! # Modules
//!
//! All modules (e.g. `ctrl_mgr`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::CyclicModule` trait.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use ctrl_lib::{
    ctrl_mgr::{CtrlMgr, InitData, InputData},
    model::{DynamicModel, PointMass},
};
use util::{
    logger::{logger_init, LevelFilter, LogConfig},
    module::CyclicModule,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// DATA STRUCTURES
// ------------------------------------------------------------------------------------------------

/// Record of the executed trajectory, saved at the end of the run.
#[derive(Default, Serialize)]
struct Trajectory {
    time_s: Vec<f64>,
    states: Vec<Vec<f64>>,
    inputs: Vec<Vec<f64>>,
    policy_steps: Vec<Option<usize>>,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("ctrl_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger, keeping the per-iteration solver output out of the debug log
    let log_config = LogConfig::new(LevelFilter::Debug)
        .with_target("ctrl_lib::mpc", LevelFilter::Info)
        .with_target("ctrl_lib::lqr", LevelFilter::Info);
    logger_init(log_config, &session).wrap_err("Failed to initialise logging")?;

    info!("Control Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let init_data = InitData::load().wrap_err("Could not load parameters")?;
    let cycle_period = Duration::from_secs_f64(init_data.ctrl_mgr.cycle_period_s);
    let run_duration_s = init_data.ctrl_mgr.run_duration_s;

    let plant = PointMass::new(
        init_data.ctrl_mgr.initial_state.len() / 2,
        init_data.ctrl_mgr.max_accel_mss,
    );
    let mut state = DVector::from_column_slice(&init_data.ctrl_mgr.initial_state);

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut ctrl_mgr = CtrlMgr::default();
    ctrl_mgr
        .init(init_data, &session)
        .wrap_err("Failed to initialise CtrlMgr")?;
    info!("CtrlMgr init complete\n");

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    let mut traj = Trajectory::default();
    let mut num_cycles: u64 = 0;
    let loop_start = Instant::now();

    loop {
        let cycle_start_instant = Instant::now();
        let time_s = (cycle_start_instant - loop_start).as_secs_f64();

        if time_s > run_duration_s {
            info!("Run duration elapsed");
            break;
        }

        // ---- CONTROL PROCESSING ----

        let (output, report) = ctrl_mgr
            .proc(&InputData {
                state: state.clone(),
                desired_state: None,
            })
            .wrap_err("CtrlMgr processing failed, stopping actuation")?;

        if report.policy_updated {
            debug!(
                "New policy, lag {:.3} ms, step {:?}",
                report.policy_lag_s * 1000.0,
                report.policy_step
            );
        }

        traj.time_s.push(time_s);
        traj.states.push(state.iter().copied().collect());
        traj.inputs.push(output.input.iter().copied().collect());
        traj.policy_steps.push(report.policy_step);

        if report.goal_reached {
            info!("Goal reached at {:.2} s", time_s);
            break;
        }

        // ---- PLANT SIMULATION ----

        state = plant
            .simulate(&state, &output.input, cycle_period.as_secs_f64())
            .wrap_err("Plant simulation failed")?;

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }

        num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    info!("Final state: {:?}", state.as_slice());

    session.save("ctrl_mgr/trajectory.json", traj);

    ctrl_mgr.stop().wrap_err("Failed to stop CtrlMgr")?;

    info!("End of execution after {} cycles", num_cycles);

    session.exit();

    Ok(())
}
