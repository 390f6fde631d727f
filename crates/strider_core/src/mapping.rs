//! Vector mappings: the foundation of the solver stack.
//!
//! A [`VectorMapping`] is a pure function from R^n to R^m with a fixed
//! dimension and per-coordinate semantic ids declared at construction time.
//! Composition wrappers ([`NarrowingMapping`], [`ReorderingMapping`],
//! [`NormalizingMapping`]) transform the coordinate space of an inner
//! mapping while preserving the mapping contract.

pub mod narrowing;
pub mod normalizing;
pub mod reordering;

pub use narrowing::NarrowingMapping;
pub use normalizing::{NormalizingMapping, ScalingMapping};
pub use reordering::ReorderingMapping;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic identifier of one vector coordinate, assigned by the host
/// simulation's variable directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VarId(pub u64);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stateless-apart-from-configuration function object R^n -> R^m.
///
/// Input and output dimensions and the ids attached to each coordinate are
/// fixed for the mapping's lifetime; resizing after construction is
/// forbidden by contract.
pub trait VectorMapping {
    fn input_dimension(&self) -> usize;
    fn output_dimension(&self) -> usize;

    /// Semantic ids of the input coordinates, one per dimension.
    fn input_ids(&self) -> &[VarId];

    /// Semantic ids of the output coordinates, one per dimension.
    fn output_ids(&self) -> &[VarId];

    /// Evaluates the mapping at `x`, writing the image into `out`.
    ///
    /// `x` must have length `input_dimension()` and `out` length
    /// `output_dimension()`.
    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>);
}

impl<M: VectorMapping + ?Sized> VectorMapping for &M {
    fn input_dimension(&self) -> usize {
        (**self).input_dimension()
    }

    fn output_dimension(&self) -> usize {
        (**self).output_dimension()
    }

    fn input_ids(&self) -> &[VarId] {
        (**self).input_ids()
    }

    fn output_ids(&self) -> &[VarId] {
        (**self).output_ids()
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        (**self).apply(x, out)
    }
}

impl<M: VectorMapping + ?Sized> VectorMapping for Box<M> {
    fn input_dimension(&self) -> usize {
        (**self).input_dimension()
    }

    fn output_dimension(&self) -> usize {
        (**self).output_dimension()
    }

    fn input_ids(&self) -> &[VarId] {
        (**self).input_ids()
    }

    fn output_ids(&self) -> &[VarId] {
        (**self).output_ids()
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        (**self).apply(x, out)
    }
}

/// Sequential ids 0..dim, for mappings whose coordinates carry no external
/// meaning (tests, anonymous per-step residual systems).
pub fn anonymous_ids(dim: usize) -> Vec<VarId> {
    (0..dim as u64).map(VarId).collect()
}
