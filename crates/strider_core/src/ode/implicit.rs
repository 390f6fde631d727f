//! The per-step implicit equation handed to the Newton solver.

use nalgebra::DVector;

use crate::mapping::{VarId, VectorMapping};
use crate::ode::system::OdeSystem;

/// Backward-Euler residual of one sub-step:
/// F(y) = y - x0 - h * f(t0 + h, y). Its root is the state after the step.
pub struct ImplicitStepMapping<'a, S> {
    system: &'a S,
    t0: f64,
    h: f64,
    x0: &'a DVector<f64>,
}

impl<'a, S: OdeSystem> ImplicitStepMapping<'a, S> {
    pub fn new(system: &'a S, t0: f64, h: f64, x0: &'a DVector<f64>) -> Self {
        Self { system, t0, h, x0 }
    }
}

impl<S: OdeSystem> VectorMapping for ImplicitStepMapping<'_, S> {
    fn input_dimension(&self) -> usize {
        self.system.dimension()
    }

    fn output_dimension(&self) -> usize {
        self.system.dimension()
    }

    fn input_ids(&self) -> &[VarId] {
        self.system.variable_ids()
    }

    fn output_ids(&self) -> &[VarId] {
        self.system.variable_ids()
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        let mut f = DVector::zeros(self.system.dimension());
        self.system.rhs(self.t0 + self.h, x, &mut f);
        for i in 0..out.len() {
            out[i] = x[i] - self.x0[i] - self.h * f[i];
        }
    }
}
