//! Deterministic integer sequences scheduling the sub-step counts of
//! Richardson-extrapolation refinement. Each generator is restartable:
//! after `reset`, calling `next` N times reproduces the same values.

use crate::error::SolveError;

pub trait StepSequence {
    /// The next sub-step count of the current sweep. Values are strictly
    /// increasing within a sweep.
    fn next(&mut self) -> usize;

    /// Restarts the sweep from its first value.
    fn reset(&mut self);
}

/// 1, 2, 3, 4, 5, 6, ...
#[derive(Debug, Default)]
pub struct Harmonic {
    current: usize,
}

impl StepSequence for Harmonic {
    fn next(&mut self) -> usize {
        self.current += 1;
        self.current
    }

    fn reset(&mut self) {
        self.current = 0;
    }
}

/// 1, 2, 4, 8, 16, 32, ...
#[derive(Debug)]
pub struct Romberg {
    next_value: usize,
}

impl Default for Romberg {
    fn default() -> Self {
        Self { next_value: 1 }
    }
}

impl StepSequence for Romberg {
    fn next(&mut self) -> usize {
        let value = self.next_value;
        self.next_value *= 2;
        value
    }

    fn reset(&mut self) {
        self.next_value = 1;
    }
}

/// 1, 2, 3, 4, 6, 8, 12, 16, ... Interleaves a doubling odd-position track
/// with a doubling even-position track.
#[derive(Debug)]
pub struct Bulirsch {
    ordinal: usize,
    odd_value: usize,
    even_value: usize,
}

impl Default for Bulirsch {
    fn default() -> Self {
        Self {
            ordinal: 0,
            odd_value: 1,
            even_value: 2,
        }
    }
}

impl StepSequence for Bulirsch {
    fn next(&mut self) -> usize {
        self.ordinal += 1;
        if self.ordinal % 2 == 1 {
            self.odd_value
        } else {
            let value = self.even_value;
            self.odd_value = if self.ordinal == 2 {
                3
            } else {
                self.odd_value * 2
            };
            self.even_value *= 2;
            value
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Builds a sequence from its configured name.
pub fn sequence_by_name(name: &str) -> Result<Box<dyn StepSequence>, SolveError> {
    match name {
        "harmonic" => Ok(Box::new(Harmonic::default())),
        "romberg" => Ok(Box::new(Romberg::default())),
        "bulirsch" => Ok(Box::new(Bulirsch::default())),
        other => Err(SolveError::configuration(format!(
            "unknown step sequence \"{other}\""
        ))),
    }
}
