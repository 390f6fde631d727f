//! Line-search strategies choosing the step-length multiplier along a
//! descent direction.

use nalgebra::DVector;

use crate::error::SolveError;
use crate::mapping::VectorMapping;

pub trait LineSearch {
    /// Chooses the multiplier alpha for the update x + alpha * direction.
    fn step_length(
        &self,
        mapping: &dyn VectorMapping,
        x: &DVector<f64>,
        direction: &DVector<f64>,
        residual_norm: f64,
    ) -> f64;
}

/// Fixed step length; alpha = 1 is the plain Newton update.
#[derive(Debug, Clone, Copy)]
pub struct FullStep {
    alpha: f64,
}

impl FullStep {
    pub fn new(alpha: f64) -> Result<Self, SolveError> {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(SolveError::configuration(format!(
                "step length must be finite and positive, got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }
}

impl Default for FullStep {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl LineSearch for FullStep {
    fn step_length(
        &self,
        _mapping: &dyn VectorMapping,
        _x: &DVector<f64>,
        _direction: &DVector<f64>,
        _residual_norm: f64,
    ) -> f64 {
        self.alpha
    }
}

/// Halves alpha until the residual norm decreases or the floor is reached.
/// The final alpha is returned either way; a step that never improved is the
/// iteration performer's divergence signal, not the line search's.
#[derive(Debug, Clone, Copy)]
pub struct Backtracking {
    min_alpha: f64,
}

impl Backtracking {
    pub fn new(min_alpha: f64) -> Result<Self, SolveError> {
        if !min_alpha.is_finite() || min_alpha <= 0.0 || min_alpha > 1.0 {
            return Err(SolveError::configuration(format!(
                "minimum step length must be in (0, 1], got {min_alpha}"
            )));
        }
        Ok(Self { min_alpha })
    }
}

impl Default for Backtracking {
    fn default() -> Self {
        Self { min_alpha: 1.0 / 1024.0 }
    }
}

impl LineSearch for Backtracking {
    fn step_length(
        &self,
        mapping: &dyn VectorMapping,
        x: &DVector<f64>,
        direction: &DVector<f64>,
        residual_norm: f64,
    ) -> f64 {
        let mut alpha = 1.0;
        let mut residual = DVector::zeros(mapping.output_dimension());
        loop {
            let candidate = x + direction * alpha;
            mapping.apply(&candidate, &mut residual);
            let candidate_norm = residual.norm();
            if candidate_norm.is_finite() && candidate_norm < residual_norm {
                return alpha;
            }
            if alpha <= self.min_alpha {
                return alpha;
            }
            alpha = (alpha * 0.5).max(self.min_alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Backtracking, FullStep, LineSearch};
    use crate::mapping::test_support::Shifted;
    use nalgebra::DVector;

    #[test]
    fn full_step_returns_the_configured_alpha() {
        let mapping = Shifted::new(DVector::zeros(1));
        let alpha = FullStep::new(0.25)
            .expect("line search should build")
            .step_length(
                &mapping,
                &DVector::from_vec(vec![1.0]),
                &DVector::from_vec(vec![-1.0]),
                1.0,
            );
        assert_eq!(alpha, 0.25);
    }

    #[test]
    fn full_step_rejects_non_positive_alpha() {
        let err = FullStep::new(0.0).err().expect("expected error");
        assert!(format!("{err}").contains("finite and positive"));
    }

    #[test]
    fn backtracking_accepts_the_full_newton_step_when_it_improves() {
        let mapping = Shifted::new(DVector::from_vec(vec![5.0]));
        let x = DVector::from_vec(vec![0.0]);
        // Newton direction for F(x) = x - 5 from x = 0.
        let direction = DVector::from_vec(vec![5.0]);
        let alpha = Backtracking::default().step_length(&mapping, &x, &direction, 5.0);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn backtracking_halves_until_the_residual_improves() {
        let mapping = Shifted::new(DVector::from_vec(vec![0.0]));
        let x = DVector::from_vec(vec![1.0]);
        // Overshooting direction: full step lands at -3, worse than 1.
        let direction = DVector::from_vec(vec![-4.0]);
        let alpha = Backtracking::default().step_length(&mapping, &x, &direction, 1.0);
        // alpha = 1 lands at -3, alpha = 1/2 at -1 (no improvement),
        // alpha = 1/4 at the root.
        assert_eq!(alpha, 0.25);
    }
}
