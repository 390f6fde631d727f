//! Convergence norms: plain infinity norm against a single tolerance, or a
//! per-variable scaled norm drawn from an id-keyed tolerance table.

use nalgebra::DVector;
use std::collections::HashMap;

use crate::error::SolveError;
use crate::mapping::VarId;

pub trait ErrorEstimator {
    /// Non-negative convergence norm of the residual. `ids` carries the
    /// semantic id of each residual component.
    fn error_norm(&self, residual: &DVector<f64>, ids: &[VarId]) -> Result<f64, SolveError>;

    fn is_converged(&self, norm: f64) -> bool;

    /// Diagnostic text for telemetry.
    fn status_message(&self, norm: f64) -> String;
}

/// Maximum absolute residual component against one global tolerance.
#[derive(Debug, Clone, Copy)]
pub struct InfNormEstimator {
    tolerance: f64,
}

impl InfNormEstimator {
    pub fn new(tolerance: f64) -> Result<Self, SolveError> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(SolveError::configuration(format!(
                "tolerance must be finite and positive, got {tolerance}"
            )));
        }
        Ok(Self { tolerance })
    }
}

impl ErrorEstimator for InfNormEstimator {
    fn error_norm(&self, residual: &DVector<f64>, _ids: &[VarId]) -> Result<f64, SolveError> {
        Ok(residual.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())))
    }

    fn is_converged(&self, norm: f64) -> bool {
        norm.is_finite() && norm <= self.tolerance
    }

    fn status_message(&self, norm: f64) -> String {
        format!(
            "inf-norm {norm:.3e} against tolerance {:.3e}",
            self.tolerance
        )
    }
}

/// Each residual component divided by its variable's configured tolerance;
/// converged when every scaled component is at most 1.
pub struct ScaledEstimator {
    tolerances: HashMap<VarId, f64>,
}

impl ScaledEstimator {
    pub fn new(tolerances: HashMap<VarId, f64>) -> Result<Self, SolveError> {
        if let Some((id, value)) = tolerances
            .iter()
            .find(|(_, value)| !value.is_finite() || **value <= 0.0)
        {
            return Err(SolveError::configuration(format!(
                "tolerance for variable id {id} must be finite and positive, got {value}"
            )));
        }
        Ok(Self { tolerances })
    }
}

impl ErrorEstimator for ScaledEstimator {
    fn error_norm(&self, residual: &DVector<f64>, ids: &[VarId]) -> Result<f64, SolveError> {
        if residual.len() != ids.len() {
            return Err(SolveError::configuration(format!(
                "residual has {} components but {} ids were supplied",
                residual.len(),
                ids.len()
            )));
        }

        let missing: Vec<VarId> = ids
            .iter()
            .filter(|id| !self.tolerances.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SolveError::MissingScale { ids: missing });
        }

        let mut norm = 0.0_f64;
        for (value, id) in residual.iter().zip(ids) {
            let scale = self.tolerances[id];
            norm = norm.max(value.abs() / scale);
        }
        Ok(norm)
    }

    fn is_converged(&self, norm: f64) -> bool {
        norm.is_finite() && norm <= 1.0
    }

    fn status_message(&self, norm: f64) -> String {
        format!("scaled norm {norm:.3e} against unit threshold")
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorEstimator, InfNormEstimator, ScaledEstimator};
    use crate::error::SolveError;
    use crate::mapping::{anonymous_ids, VarId};
    use nalgebra::DVector;
    use std::collections::HashMap;

    #[test]
    fn inf_norm_is_the_largest_component_magnitude() {
        let estimator = InfNormEstimator::new(1e-6).expect("estimator should build");
        let residual = DVector::from_vec(vec![0.5, -2.0, 1.0]);
        let norm = estimator
            .error_norm(&residual, &anonymous_ids(3))
            .expect("norm should compute");
        assert_eq!(norm, 2.0);
        assert!(!estimator.is_converged(norm));
        assert!(estimator.is_converged(1e-7));
    }

    #[test]
    fn scaled_norm_divides_by_per_variable_tolerance() {
        let mut tolerances = HashMap::new();
        tolerances.insert(VarId(0), 0.5);
        tolerances.insert(VarId(1), 10.0);
        let estimator = ScaledEstimator::new(tolerances).expect("estimator should build");

        let residual = DVector::from_vec(vec![1.0, 5.0]);
        let norm = estimator
            .error_norm(&residual, &[VarId(0), VarId(1)])
            .expect("norm should compute");
        // 1.0 / 0.5 = 2.0 dominates 5.0 / 10.0 = 0.5.
        assert_eq!(norm, 2.0);
        assert!(!estimator.is_converged(norm));
        assert!(estimator.is_converged(0.5));
    }

    #[test]
    fn scaled_norm_aggregates_every_missing_id() {
        let mut tolerances = HashMap::new();
        tolerances.insert(VarId(0), 1.0);
        let estimator = ScaledEstimator::new(tolerances).expect("estimator should build");

        let residual = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        let err = estimator
            .error_norm(&residual, &[VarId(0), VarId(7), VarId(9)])
            .err()
            .expect("expected error");
        match err {
            SolveError::MissingScale { ids } => {
                assert_eq!(ids, vec![VarId(7), VarId(9)]);
            }
            other => panic!("expected MissingScale, got {other:?}"),
        }
    }

    #[test]
    fn scaled_norm_rejects_mismatched_residual_and_id_lengths() {
        let mut tolerances = HashMap::new();
        tolerances.insert(VarId(0), 1.0);
        let estimator = ScaledEstimator::new(tolerances).expect("estimator should build");

        let residual = DVector::from_vec(vec![1.0, 2.0]);
        let err = estimator
            .error_norm(&residual, &[VarId(0)])
            .err()
            .expect("expected error");
        assert!(format!("{err}").contains("2 components but 1 ids"));
    }

    #[test]
    fn non_finite_norm_never_converges() {
        let estimator = InfNormEstimator::new(1.0).expect("estimator should build");
        assert!(!estimator.is_converged(f64::NAN));
        assert!(!estimator.is_converged(f64::INFINITY));
    }
}
