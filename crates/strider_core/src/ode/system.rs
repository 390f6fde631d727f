//! The ODE right-hand-side collaborator supplied by the host simulation.

use nalgebra::DVector;

use crate::mapping::VarId;

/// A first-order ODE system dx/dt = f(t, x) with declared per-variable
/// semantic ids and optional scalar "zero functions" whose sign changes mark
/// events during integration.
pub trait OdeSystem {
    fn dimension(&self) -> usize;

    /// Semantic ids of the state variables, one per dimension.
    fn variable_ids(&self) -> &[VarId];

    /// Evaluates dx/dt at (t, x) into `out`.
    fn rhs(&self, t: f64, x: &DVector<f64>, out: &mut DVector<f64>);

    /// Number of monitored zero functions.
    fn zero_function_count(&self) -> usize {
        0
    }

    /// Evaluates every zero function at (t, x) into `out`, which has length
    /// `zero_function_count()`.
    fn zero_functions(&self, _t: f64, _x: &DVector<f64>, _out: &mut DVector<f64>) {}
}
