//! # Cost contributors
//!
//! Additive, time-varying cost terms folded into the MPC backward pass on top of the quadratic
//! tracking cost. Each contributor gives a local model of its cost about a simulated state `x̄`:
//!
//! ```text
//! c(x̄ + δ) ≈ c(x̄) + qᵀδ + δᵀQδ
//! ```
//!
//! where `q` is the linear cost and `Q` the quadratic cost. Returning `None` means the
//! contributor adds nothing on that step.
//!
//! Contributors live in a [`ContributorSet`], which may be modified by other threads while a
//! solve is running. The engine only ever reads a [`ContributorSnapshot`] taken at the start of
//! each pass.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt::Debug,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::warn;
use nalgebra::{DMatrix, DVector};

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod obstacle;
mod waypoint;

pub use obstacle::Obstacle;
pub use waypoint::Waypoint;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors in the configuration of a contributor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContributorError {
    #[error("Obstacle {what} must be non-negative and finite, found {value}")]
    InvalidRadius { what: &'static str, value: f64 },

    #[error("Obstacle and robot radii are both zero, the potential has no extent")]
    ZeroExtent,

    #[error("Obstacle centre has {centre} elements but {indices} position indices were given")]
    PositionIndices { centre: usize, indices: usize },

    #[error("Waypoint temporal spread must be positive and finite, found {0}")]
    InvalidTemporalSpread(f64),

    #[error("Waypoint desired time must be finite, found {0}")]
    InvalidDesiredTime(f64),

    #[error("Waypoint weight is {rows}x{cols} but its state has {n} elements")]
    WeightShape { rows: usize, cols: usize, n: usize },
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A pluggable cost term.
pub trait CostContributor: Debug + Send + Sync {
    /// Quadratic cost matrix (n×n, positive semi-definite) about the simulated state.
    fn quadratic_cost(&self, state: &DVector<f64>, step: usize, dt: f64) -> Option<DMatrix<f64>>;

    /// Linear cost vector (n) about the simulated state.
    fn linear_cost(&self, state: &DVector<f64>, step: usize, dt: f64) -> Option<DVector<f64>>;

    /// Value of the cost at the given state, used when comparing trajectories.
    fn cost(&self, _state: &DVector<f64>, _step: usize, _dt: f64) -> Option<f64> {
        None
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A shared, thread safe collection of cost contributors.
///
/// Clones share the same underlying collection.
#[derive(Debug, Clone, Default)]
pub struct ContributorSet {
    inner: Arc<RwLock<Vec<Arc<dyn CostContributor>>>>,
}

/// An immutable copy of a [`ContributorSet`] taken at one instant.
#[derive(Debug, Clone, Default)]
pub struct ContributorSnapshot {
    items: Vec<Arc<dyn CostContributor>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ContributorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a contributor to the set.
    pub fn push<C>(&self, contributor: C)
    where
        C: CostContributor + 'static,
    {
        self.write().push(Arc::new(contributor));
    }

    /// Remove all contributors.
    pub fn clear(&self) {
        self.write().clear();
    }

    /// Replace the whole set in one go.
    pub fn replace(&self, contributors: Vec<Arc<dyn CostContributor>>) {
        *self.write() = contributors;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy the current contents of the set.
    pub fn snapshot(&self) -> ContributorSnapshot {
        ContributorSnapshot {
            items: self.read().clone(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn CostContributor>>> {
        self.inner.read().unwrap_or_else(|e| {
            warn!("Contributor set lock was poisoned, recovering");
            e.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn CostContributor>>> {
        self.inner.write().unwrap_or_else(|e| {
            warn!("Contributor set lock was poisoned, recovering");
            e.into_inner()
        })
    }
}

impl From<Vec<Arc<dyn CostContributor>>> for ContributorSet {
    fn from(items: Vec<Arc<dyn CostContributor>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(items)),
        }
    }
}

impl ContributorSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the quadratic costs of every contributor.
    ///
    /// Contributions which are not n×n are dropped with a warning.
    pub fn quadratic(&self, state: &DVector<f64>, step: usize, dt: f64) -> DMatrix<f64> {
        let n = state.len();
        let mut sum = DMatrix::zeros(n, n);

        for c in self.items.iter() {
            if let Some(q) = c.quadratic_cost(state, step, dt) {
                if q.shape() == (n, n) {
                    sum += q;
                } else {
                    warn!(
                        "Ignoring quadratic cost of shape {:?} from {:?} at step {}",
                        q.shape(),
                        c,
                        step
                    );
                }
            }
        }

        sum
    }

    /// Sum of the linear costs of every contributor.
    ///
    /// Contributions which are not of length n are dropped with a warning.
    pub fn linear(&self, state: &DVector<f64>, step: usize, dt: f64) -> DVector<f64> {
        let n = state.len();
        let mut sum = DVector::zeros(n);

        for c in self.items.iter() {
            if let Some(q) = c.linear_cost(state, step, dt) {
                if q.len() == n {
                    sum += q;
                } else {
                    warn!(
                        "Ignoring linear cost of length {} from {:?} at step {}",
                        q.len(),
                        c,
                        step
                    );
                }
            }
        }

        sum
    }

    /// Sum of the cost values of every contributor.
    pub fn cost(&self, state: &DVector<f64>, step: usize, dt: f64) -> f64 {
        self.items
            .iter()
            .filter_map(|c| c.cost(state, step, dt))
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use std::thread;

    /// Contributes a fixed quadratic and linear cost regardless of state
    #[derive(Debug)]
    struct Constant {
        dim: usize,
        value: f64,
    }

    impl CostContributor for Constant {
        fn quadratic_cost(&self, _: &DVector<f64>, _: usize, _: f64) -> Option<DMatrix<f64>> {
            Some(DMatrix::identity(self.dim, self.dim) * self.value)
        }

        fn linear_cost(&self, _: &DVector<f64>, _: usize, _: f64) -> Option<DVector<f64>> {
            Some(DVector::from_element(self.dim, self.value))
        }

        fn cost(&self, _: &DVector<f64>, _: usize, _: f64) -> Option<f64> {
            Some(self.value)
        }
    }

    #[test]
    fn test_snapshot_sums() {
        let set = ContributorSet::new();
        set.push(Constant { dim: 2, value: 1.0 });
        set.push(Constant { dim: 2, value: 2.0 });

        // Wrong shape, ignored
        set.push(Constant { dim: 3, value: 100.0 });

        let snap = set.snapshot();
        let x = DVector::zeros(2);

        assert_eq!(snap.len(), 3);
        assert_relative_eq!(snap.quadratic(&x, 0, 0.1), DMatrix::identity(2, 2) * 3.0);
        assert_relative_eq!(snap.linear(&x, 0, 0.1), DVector::from_element(2, 3.0));
        assert_relative_eq!(snap.cost(&x, 0, 0.1), 103.0);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let set = ContributorSet::new();
        set.push(Constant { dim: 2, value: 1.0 });

        let snap = set.snapshot();
        set.clear();

        assert!(set.is_empty());
        assert_eq!(snap.len(), 1);

        let other: Vec<Arc<dyn CostContributor>> = vec![
            Arc::new(Constant { dim: 2, value: 1.0 }),
            Arc::new(Constant { dim: 2, value: 1.0 }),
        ];
        set.replace(other);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_concurrent_modification() {
        let set = ContributorSet::new();
        let writer_set = set.clone();

        let writer = thread::spawn(move || {
            for i in 0..200 {
                writer_set.push(Constant { dim: 2, value: 1.0 });
                if i % 10 == 0 {
                    writer_set.clear();
                }
            }
        });

        let x = DVector::zeros(2);
        for _ in 0..200 {
            let snap = set.snapshot();
            let q = snap.quadratic(&x, 0, 0.1);
            assert_relative_eq!(q[(0, 0)], snap.len() as f64);
        }

        writer.join().unwrap();
    }
}
