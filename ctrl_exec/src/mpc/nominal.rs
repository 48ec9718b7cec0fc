//! Nominal trajectory and policy bookkeeping for the MPC engine

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::warn;
use nalgebra::{DMatrix, DVector};

use crate::{linalg::clip_input, lqr::riccati};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A forward-simulated trajectory with the linearisations cached along it.
#[derive(Debug, Clone)]
pub(crate) struct Nominal {
    /// Simulated states `x̄[0..=N]`
    pub states: Vec<DVector<f64>>,

    /// Inputs applied during the simulation `ū[0..N]`
    pub inputs: Vec<DVector<f64>>,

    /// State transition matrices at each `x̄[t]`, `t < N`
    pub a: Vec<DMatrix<f64>>,

    /// Input transition matrices at each `x̄[t]`, `t < N`
    pub b: Vec<DMatrix<f64>>,

    /// Total predicted cost of the trajectory
    pub cost: f64,
}

/// The result of one backward pass, paired with the trajectory it was computed about.
#[derive(Debug, Clone)]
pub(crate) struct Policy {
    pub states: Vec<DVector<f64>>,
    pub inputs: Vec<DVector<f64>>,

    /// Cost-to-go `P[0..N]`
    pub p: Vec<DMatrix<f64>>,

    /// Feedback gains `K[0..N-1]` along the trajectory
    pub k: Vec<DMatrix<f64>>,

    /// Affine cost-to-go term `l[0..N]`
    pub l: Vec<DVector<f64>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Policy {
    /// Number of steps the policy covers.
    pub fn len(&self) -> usize {
        self.p.len()
    }

    /// Feedback plus feedforward input at `step` for the measured `state`, using the model
    /// linearised about that state:
    ///
    /// ```text
    /// u = clip(ū + K(x - x̄) + α·k),    k = -H⁻¹(Bᵀl + Rū)
    /// ```
    ///
    /// A singular `H` gives the zero input.
    pub fn input(
        &self,
        step: usize,
        state: &DVector<f64>,
        a: &DMatrix<f64>,
        b: &DMatrix<f64>,
        r: &DMatrix<f64>,
        alpha: f64,
    ) -> DVector<f64> {
        let nominal_input = &self.inputs[step];

        let gain = match riccati::gain(a, b, &self.p[step], r) {
            Some(g) => g,
            None => {
                warn!("MPC: singular gain at step {}, commanding zero input", step);
                return DVector::zeros(r.nrows());
            }
        };

        let feedforward = -(&gain.h_inv * (b.transpose() * &self.l[step] + r * nominal_input));
        let feedback = gain.k * (state - &self.states[step]);

        clip_input(&(nominal_input + feedback + feedforward * alpha))
    }
}
