//! Trust-region style adaptation of the damping parameter across Newton
//! iterations: increase after poor progress, decrease after good progress.

use serde::{Deserialize, Serialize};

use crate::error::SolveError;

pub trait Regularization {
    /// Current damping parameter, fed into the next Jacobian/direction
    /// computation.
    fn parameter(&self) -> f64;

    /// Whether regularization applies to the current solver state.
    fn is_available(&self) -> bool;

    /// Overrides the damping parameter directly.
    fn apply_parameter(&mut self, parameter: f64);

    /// Adapts the parameter to the latest iteration's outcome. Returns
    /// whether the parameter actually changed; callers may retry the same
    /// iterate with the new parameter before accepting it.
    fn adjust(&mut self, progressed: bool) -> bool;

    /// Restores the configured initial parameter (hard reset of a solve).
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegularizationSettings {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    pub increase_factor: f64,
    pub decrease_factor: f64,
}

impl Default for RegularizationSettings {
    fn default() -> Self {
        Self {
            initial: 1e-3,
            min: 1e-12,
            max: 1e12,
            increase_factor: 10.0,
            decrease_factor: 0.3,
        }
    }
}

impl RegularizationSettings {
    pub fn validate(&self) -> Result<(), SolveError> {
        if !(self.min > 0.0 && self.min <= self.initial && self.initial <= self.max) {
            return Err(SolveError::configuration(format!(
                "regularization bounds must satisfy 0 < min <= initial <= max, \
                 got min {} initial {} max {}",
                self.min, self.initial, self.max
            )));
        }
        if self.increase_factor <= 1.0 {
            return Err(SolveError::configuration(
                "regularization increase factor must exceed 1",
            ));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor < 1.0) {
            return Err(SolveError::configuration(
                "regularization decrease factor must lie in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Levenberg-Marquardt style damping with multiplicative updates clamped to
/// configured bounds.
pub struct AdaptiveRegularization {
    settings: RegularizationSettings,
    current: f64,
}

impl AdaptiveRegularization {
    pub fn new(settings: RegularizationSettings) -> Result<Self, SolveError> {
        settings.validate()?;
        Ok(Self {
            current: settings.initial,
            settings,
        })
    }
}

impl Regularization for AdaptiveRegularization {
    fn parameter(&self) -> f64 {
        self.current
    }

    fn is_available(&self) -> bool {
        true
    }

    fn apply_parameter(&mut self, parameter: f64) {
        self.current = parameter.clamp(self.settings.min, self.settings.max);
    }

    fn adjust(&mut self, progressed: bool) -> bool {
        let previous = self.current;
        let factor = if progressed {
            self.settings.decrease_factor
        } else {
            self.settings.increase_factor
        };
        self.current = (self.current * factor).clamp(self.settings.min, self.settings.max);
        self.current != previous
    }

    fn reset(&mut self) {
        self.current = self.settings.initial;
    }
}
