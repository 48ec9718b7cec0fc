//! # Solver Benchmark

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use ctrl_lib::{
    cost::{ContributorSet, Obstacle},
    lqr::{CostMatrices, LqrSolver},
    model::{DragPointMass, PointMass},
    mpc::MpcSolver,
    DVector,
};

fn solver_benchmark(c: &mut Criterion) {
    // ---- Planar point mass avoiding one obstacle ----

    let costs = CostMatrices::from_diagonals(
        &[1000.0, 1000.0, 1000.0, 1000.0],
        &[1.0, 0.0, 1.0, 0.0],
        &[1.0, 1.0],
    );
    let model = Arc::new(PointMass::new(2, 10.0));

    let current = DVector::zeros(4);
    let desired = DVector::from_column_slice(&[1.0, 0.0, 0.1, 0.0]);

    let contributors = ContributorSet::new();
    contributors.push(Obstacle::new(0.5, 0.05, 0.1, 0.15, 1000.0).unwrap());

    c.bench_function("LqrSolver::solve", |b| {
        let mut lqr = LqrSolver::new(100, 0.01, costs.clone(), model.clone()).unwrap();
        b.iter(|| lqr.solve(&current).unwrap())
    });

    c.bench_function("MpcSolver::initialize_and_iterate::obstacle", |b| {
        let mut mpc =
            MpcSolver::new(100, 0.01, costs.clone(), model.clone(), contributors.clone()).unwrap();
        b.iter(|| mpc.initialize_and_iterate(5, &current, &desired).unwrap())
    });

    // ---- Nonlinear drag model, no contributors ----

    let drag_costs = CostMatrices::from_diagonals(&[1000.0, 1000.0], &[1.0, 0.0], &[1.0]);
    let drag_model = Arc::new(DragPointMass::new(10.0, 3.0));
    let drag_current = DVector::zeros(2);
    let drag_desired = DVector::from_column_slice(&[1.0, 0.0]);

    c.bench_function("MpcSolver::initialize_and_iterate::drag", |b| {
        let mut mpc =
            MpcSolver::new(100, 0.01, drag_costs.clone(), drag_model.clone(), ContributorSet::new())
                .unwrap();
        b.iter(|| {
            mpc.initialize_and_iterate(5, &drag_current, &drag_desired)
                .unwrap()
        })
    });
}

criterion_group!(benches, solver_benchmark);
criterion_main!(benches);
