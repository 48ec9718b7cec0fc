//! Closed loop scenarios for the LQR and iterative LQR solvers.

use std::sync::Arc;

use ctrl_lib::{
    cost::{ContributorSet, Obstacle, Waypoint},
    linalg::diag,
    lqr::{CostMatrices, LqrSolver},
    model::{DynamicModel, PointMass},
    mpc::MpcSolver,
    DVector,
};

const HORIZON: usize = 100;
const DT: f64 = 0.01;

fn single_axis_costs() -> CostMatrices {
    CostMatrices::from_diagonals(&[1000.0, 1000.0], &[1.0, 0.0], &[1.0])
}

fn planar_costs() -> CostMatrices {
    CostMatrices::from_diagonals(
        &[1000.0, 1000.0, 1000.0, 1000.0],
        &[1.0, 0.0, 1.0, 0.0],
        &[1.0, 1.0],
    )
}

#[test]
fn test_lqr_closed_loop_reaches_target() {
    let model = Arc::new(PointMass::new(1, 10.0));
    let mut lqr = LqrSolver::new(HORIZON, DT, single_axis_costs(), model.clone()).unwrap();

    let desired = DVector::from_column_slice(&[1.0, 0.0]);
    let mut x = DVector::zeros(2);
    lqr.solve(&x).unwrap();

    let mut max_input: f64 = 0.0;
    for t in 0..HORIZON {
        let u = lqr.optimal_input(t, &x, &desired).unwrap();
        max_input = max_input.max(u[0].abs());
        x = model.simulate(&x, &u, DT).unwrap();
    }

    assert!((x[0] - 1.0).abs() < 0.01, "final position {}", x[0]);
    assert!(max_input <= 1.0);
    // The demand saturates early in the manoeuvre
    assert!((max_input - 1.0).abs() < 1e-12);
}

#[test]
fn test_mpc_closed_loop_follows_nominal() {
    let model = Arc::new(PointMass::new(1, 10.0));
    let mut mpc = MpcSolver::new(
        HORIZON,
        DT,
        single_axis_costs(),
        model.clone(),
        ContributorSet::new(),
    )
    .unwrap();

    let desired = DVector::from_column_slice(&[1.0, 0.0]);
    let mut x = DVector::zeros(2);
    mpc.initialize_and_iterate(5, &x, &desired).unwrap();

    let nominal_final = mpc.nominal_states().unwrap()[HORIZON][0];
    assert!((nominal_final - 1.0).abs() < 0.01);

    for t in 0..HORIZON {
        let u = mpc.optimal_input(t, &x).unwrap();
        assert!(u[0].abs() <= 1.0);
        x = model.simulate(&x, &u, DT).unwrap();
    }

    assert!((x[0] - nominal_final).abs() < 1e-6);
}

#[test]
fn test_mpc_avoids_obstacle() {
    let model = Arc::new(PointMass::new(2, 10.0));
    let obstacle = Obstacle::new(0.5, 0.05, 0.1, 0.15, 1000.0).unwrap();

    let contributors = ContributorSet::new();
    contributors.push(obstacle.clone());

    let mut mpc = MpcSolver::new(HORIZON, DT, planar_costs(), model, contributors).unwrap();

    let current = DVector::zeros(4);
    let desired = DVector::from_column_slice(&[1.0, 0.0, 0.1, 0.0]);
    mpc.initialize_and_iterate(5, &current, &desired).unwrap();

    let min_dist = mpc
        .nominal_states()
        .unwrap()
        .iter()
        .filter_map(|x| obstacle.distance(x))
        .fold(f64::INFINITY, f64::min);

    assert!(min_dist > obstacle.radius_m, "min distance {}", min_dist);
}

#[test]
fn test_mpc_passes_through_waypoint() {
    let desired = DVector::from_column_slice(&[1.0, 0.0, 0.1, 0.0]);

    // Pull y up to 0.4 half way through the horizon
    let waypoint = Waypoint::new(
        DVector::from_column_slice(&[0.5, 0.0, 0.4, 0.0]),
        diag(&[0.0, 0.0, 50.0, 0.0]),
        50.0,
        0.5,
    )
    .unwrap();

    let solve = |contributors: ContributorSet| {
        let model = Arc::new(PointMass::new(2, 10.0));
        let mut mpc = MpcSolver::new(HORIZON, DT, planar_costs(), model, contributors).unwrap();
        mpc.initialize_and_iterate(5, &DVector::zeros(4), &desired)
            .unwrap();
        mpc.nominal_states().unwrap().to_vec()
    };

    let direct = solve(ContributorSet::new());
    let with_waypoint = {
        let contributors = ContributorSet::new();
        contributors.push(waypoint);
        solve(contributors)
    };

    // Step 50 is the waypoint time
    let y_direct = direct[50][2];
    let y_waypoint = with_waypoint[50][2];
    assert!(y_direct < 0.1, "y without waypoint {}", y_direct);
    assert!((y_waypoint - 0.4).abs() < 0.05, "y with waypoint {}", y_waypoint);

    // The detour peaks around the waypoint time and fades away from it
    let peak = (0..=HORIZON)
        .max_by(|&a, &b| with_waypoint[a][2].partial_cmp(&with_waypoint[b][2]).unwrap())
        .unwrap();
    assert!((40..=60).contains(&peak), "peak at step {}", peak);
    assert!(with_waypoint[10][2] < y_waypoint);

    // The x axis is untouched by the waypoint weight and still reaches the goal
    assert!((with_waypoint[HORIZON][0] - 1.0).abs() < 0.01);
}

#[test]
fn test_mpc_cost_never_increases() {
    let model = Arc::new(PointMass::new(2, 10.0));
    let contributors = ContributorSet::new();
    contributors.push(Obstacle::new(0.5, 0.05, 0.1, 0.15, 1000.0).unwrap());

    let mut mpc = MpcSolver::new(HORIZON, DT, planar_costs(), model, contributors).unwrap();

    let current = DVector::zeros(4);
    let desired = DVector::from_column_slice(&[1.0, 0.0, 0.1, 0.0]);
    mpc.initial_iteration(&current, &desired).unwrap();

    mpc.simulate_iteration().unwrap();
    let mut last = mpc.nominal_cost().unwrap();
    for _ in 0..5 {
        mpc.run_iteration().unwrap();
        mpc.simulate_iteration().unwrap();
        let cost = mpc.nominal_cost().unwrap();
        assert!(cost <= last + 1e-9, "{} > {}", cost, last);
        last = cost;
    }
}

#[test]
fn test_riccati_cost_to_go_bounded() {
    let model = Arc::new(PointMass::new(2, 10.0));
    let mut lqr = LqrSolver::new(HORIZON, DT, planar_costs(), model).unwrap();
    lqr.solve(&DVector::zeros(4)).unwrap();

    let p = lqr.cost_to_go();
    assert_eq!(p.len(), HORIZON);
    for p_t in p {
        assert!(p_t.iter().all(|v| v.is_finite()));
        assert!((p_t - p_t.transpose()).amax() < 1e-9);
        for i in 0..4 {
            assert!(p_t[(i, i)] > 0.0);
            assert!(p_t[(i, i)] < 1.0e4);
        }
    }
}
