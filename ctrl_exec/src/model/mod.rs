//! # Dynamic models
//!
//! The engines never see concrete vehicle dynamics, only this contract. A model provides its
//! transition matrices through exactly one of two specialisations:
//!
//! - [`LinearDynamicModel`], whose `A` and `B` depend only on the time step,
//! - [`NonlinearDynamicModel`], whose `A(x)` and `B(x)` are a local linearisation about a state.
//!
//! A model which provides neither is a configuration error, reported as
//! [`ModelError::NoSpecialisation`] the first time its matrices are requested.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::{DMatrix, DVector};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod drag;
mod point_mass;

pub use drag::DragPointMass;
pub use point_mass::PointMass;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A dynamic model of the controlled plant.
pub trait DynamicModel: Send + Sync {
    /// Number of elements in the state vector.
    fn state_dim(&self) -> usize;

    /// Number of elements in the input vector.
    fn input_dim(&self) -> usize;

    /// The linear specialisation of this model, if it has one.
    fn as_linear(&self) -> Option<&dyn LinearDynamicModel> {
        None
    }

    /// The nonlinear specialisation of this model, if it has one.
    fn as_nonlinear(&self) -> Option<&dyn NonlinearDynamicModel> {
        None
    }

    /// Get the `(A, B)` transition matrices at the given state.
    ///
    /// Linear models ignore the state.
    fn transition_matrices(
        &self,
        state: &DVector<f64>,
        dt: f64,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>), ModelError> {
        let (a, b) = if let Some(lin) = self.as_linear() {
            (lin.state_transition(dt), lin.input_transition(dt))
        } else if let Some(nonlin) = self.as_nonlinear() {
            check_dim("state", self.state_dim(), state.len())?;
            (
                nonlin.state_transition(state, dt),
                nonlin.input_transition(state, dt),
            )
        } else {
            return Err(ModelError::NoSpecialisation);
        };

        check_dim("state transition rows", self.state_dim(), a.nrows())?;
        check_dim("state transition columns", self.state_dim(), a.ncols())?;
        check_dim("input transition rows", self.state_dim(), b.nrows())?;
        check_dim("input transition columns", self.input_dim(), b.ncols())?;

        Ok((a, b))
    }

    /// Step the model forward by `dt` from `state` under `input`.
    ///
    /// The default is the linearised step `A·x + B·u`. Higher fidelity plants may override this.
    fn simulate(
        &self,
        state: &DVector<f64>,
        input: &DVector<f64>,
        dt: f64,
    ) -> Result<DVector<f64>, ModelError> {
        check_dim("state", self.state_dim(), state.len())?;
        check_dim("input", self.input_dim(), input.len())?;

        let (a, b) = self.transition_matrices(state, dt)?;

        Ok(a * state + b * input)
    }
}

/// A model whose transition matrices are constant for a given time step.
pub trait LinearDynamicModel {
    /// The state transition matrix `A`.
    fn state_transition(&self, dt: f64) -> DMatrix<f64>;

    /// The input transition matrix `B`.
    fn input_transition(&self, dt: f64) -> DMatrix<f64>;
}

/// A model linearised locally about the current state.
pub trait NonlinearDynamicModel {
    /// The state transition matrix `A(x)`.
    fn state_transition(&self, state: &DVector<f64>, dt: f64) -> DMatrix<f64>;

    /// The input transition matrix `B(x)`.
    fn input_transition(&self, state: &DVector<f64>, dt: f64) -> DMatrix<f64>;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("The dynamic model implements neither the linear nor the nonlinear specialisation")]
    NoSpecialisation,

    #[error("Dimension mismatch in {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn check_dim(what: &'static str, expected: usize, found: usize) -> Result<(), ModelError> {
    if expected == found {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            what,
            expected,
            found,
        })
    }
}
