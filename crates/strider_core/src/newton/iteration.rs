//! One Newton step: residual, Jacobian, descent direction, line search,
//! update, error norm, regularization adjustment.

use nalgebra::DVector;

use crate::error::SolveError;
use crate::jacobian::{JacobianProvider, JacobianTrimmer};
use crate::mapping::VectorMapping;
use crate::newton::descent::DescentDirection;
use crate::newton::error_estimator::ErrorEstimator;
use crate::newton::line_search::LineSearch;
use crate::newton::regularization::Regularization;

/// Outcome of one completed iteration. Divergence is recoverable by the
/// caller (shrink-and-retry at the step level), so it is reported here as a
/// value rather than raised as an error.
#[derive(Debug, Clone, Copy)]
pub struct IterationReport {
    pub error_norm: f64,
    pub converged: bool,
    pub diverged: bool,
    pub step_length: f64,
    pub regularization_changed: bool,
}

impl IterationReport {
    fn diverged(error_norm: f64) -> Self {
        Self {
            error_norm,
            converged: false,
            diverged: true,
            step_length: 0.0,
            regularization_changed: false,
        }
    }
}

/// Executes Newton iterations from injected strategies. Holds solve-scoped
/// adaptive state (previous norm, cached Jacobian, damping parameter) that
/// a hard reset clears and a warm start carries over.
pub struct IterationPerformer {
    jacobian: Box<dyn JacobianProvider>,
    trimmer: Option<JacobianTrimmer>,
    descent: Box<dyn DescentDirection>,
    line_search: Box<dyn LineSearch>,
    estimator: Box<dyn ErrorEstimator>,
    regularization: Option<Box<dyn Regularization>>,
    last_norm: Option<f64>,
}

impl IterationPerformer {
    pub fn new(
        jacobian: Box<dyn JacobianProvider>,
        descent: Box<dyn DescentDirection>,
        line_search: Box<dyn LineSearch>,
        estimator: Box<dyn ErrorEstimator>,
    ) -> Self {
        Self {
            jacobian,
            trimmer: None,
            descent,
            line_search,
            estimator,
            regularization: None,
            last_norm: None,
        }
    }

    pub fn with_trimmer(mut self, trimmer: JacobianTrimmer) -> Self {
        self.trimmer = Some(trimmer);
        self
    }

    pub fn with_regularization(mut self, regularization: Box<dyn Regularization>) -> Self {
        self.regularization = Some(regularization);
        self
    }

    pub fn estimator(&self) -> &dyn ErrorEstimator {
        self.estimator.as_ref()
    }

    pub fn regularization_parameter(&self) -> Option<f64> {
        self.regularization.as_ref().map(|r| r.parameter())
    }

    /// Norm of the most recent iteration, if one has completed.
    pub fn last_error_norm(&self) -> Option<f64> {
        self.last_norm
    }

    /// Clears adaptive state for a fresh solve: cached Jacobian, previous
    /// norm, and the damping parameter.
    pub fn reset_adaptive_state(&mut self) {
        self.jacobian.invalidate();
        self.last_norm = None;
        if let Some(reg) = self.regularization.as_mut() {
            reg.reset();
        }
    }

    /// Performs one Newton step on `x` in place.
    pub fn perform(
        &mut self,
        mapping: &dyn VectorMapping,
        x: &mut DVector<f64>,
    ) -> Result<IterationReport, SolveError> {
        let mut residual = DVector::zeros(mapping.output_dimension());
        mapping.apply(x, &mut residual);

        let jacobian = self.jacobian.jacobian(mapping, x)?;
        let jacobian = match &self.trimmer {
            Some(trimmer) => trimmer.trim(&jacobian),
            None => jacobian,
        };

        let lambda = self
            .regularization
            .as_ref()
            .filter(|reg| reg.is_available())
            .map(|reg| reg.parameter())
            .unwrap_or(0.0);

        let direction = match self.descent.direction(&jacobian, &residual, lambda) {
            Ok(direction) => direction,
            Err(SolveError::SingularSystem) => {
                let norm = self.estimator.error_norm(&residual, mapping.output_ids())?;
                self.note_outcome(false);
                return Ok(IterationReport::diverged(norm));
            }
            Err(other) => return Err(other),
        };

        let step_length = self
            .line_search
            .step_length(mapping, x, &direction, residual.norm());
        *x += direction * step_length;

        if x.iter().any(|v| !v.is_finite()) {
            self.note_outcome(false);
            return Ok(IterationReport::diverged(f64::INFINITY));
        }

        mapping.apply(x, &mut residual);
        let error_norm = self.estimator.error_norm(&residual, mapping.output_ids())?;
        let converged = self.estimator.is_converged(error_norm);
        let diverged = !error_norm.is_finite();

        // A good step shrinks the damping used for the *next* iteration;
        // a poor one grows it.
        let progressed =
            converged || self.last_norm.map_or(true, |previous| error_norm < previous);
        let regularization_changed = self.note_outcome(progressed);
        self.last_norm = Some(error_norm);

        Ok(IterationReport {
            error_norm,
            converged,
            diverged,
            step_length,
            regularization_changed,
        })
    }

    fn note_outcome(&mut self, progressed: bool) -> bool {
        match self.regularization.as_mut() {
            Some(reg) if reg.is_available() => reg.adjust(progressed),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IterationPerformer;
    use crate::jacobian::FiniteDifferenceJacobian;
    use crate::linear::DenseLu;
    use crate::mapping::test_support::Shifted;
    use crate::newton::descent::NewtonDirection;
    use crate::newton::error_estimator::InfNormEstimator;
    use crate::newton::line_search::FullStep;
    use crate::newton::regularization::{
        AdaptiveRegularization, Regularization, RegularizationSettings,
    };
    use nalgebra::DVector;

    fn plain_performer() -> IterationPerformer {
        IterationPerformer::new(
            Box::new(FiniteDifferenceJacobian::new()),
            Box::new(NewtonDirection::new(Box::new(DenseLu))),
            Box::new(FullStep::default()),
            Box::new(InfNormEstimator::new(1e-9).expect("estimator should build")),
        )
    }

    #[test]
    fn one_step_solves_a_shift_mapping() {
        let mapping = Shifted::new(DVector::from_vec(vec![3.0, -1.0]));
        let mut performer = plain_performer();
        let mut x = DVector::from_vec(vec![100.0, 100.0]);

        let report = performer
            .perform(&mapping, &mut x)
            .expect("iteration should run");
        assert!(report.converged);
        assert!(!report.diverged);
        assert!((x[0] - 3.0).abs() < 1e-6);
        assert!((x[1] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn hard_reset_restores_the_damping_parameter() {
        let settings = RegularizationSettings::default();
        let mut reg =
            AdaptiveRegularization::new(settings).expect("regularization should build");
        reg.adjust(false);
        let mut performer = plain_performer().with_regularization(Box::new(reg));

        let grown = performer
            .regularization_parameter()
            .expect("regularization is attached");
        assert!(grown > settings.initial);

        performer.reset_adaptive_state();
        let fresh = performer
            .regularization_parameter()
            .expect("regularization is attached");
        assert_eq!(fresh, settings.initial);
    }
}
