//! Error taxonomy shared by the solver stack.
//!
//! Failures here are hard faults that unwind to the caller. Outcomes the
//! caller is expected to recover from locally (divergence, hitting the
//! iteration limit, observer-requested termination) are values of
//! [`SolveStatus`], never errors: the step controller retries those with
//! adjusted parameters instead of unwinding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mapping::VarId;

#[derive(Debug, Error)]
pub enum SolveError {
    /// Unknown strategy name, rejected option key, or invalid option value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The linear-solve service detected a non-invertible system matrix.
    #[error("linear system is singular")]
    SingularSystem,

    /// The tolerance table lacks an entry for one or more active variables.
    #[error("no tolerance configured for variable ids {ids:?}")]
    MissingScale { ids: Vec<VarId> },

    /// A tolerance file violated the two-column format.
    #[error("{path}:{line}: {reason}")]
    MalformedInput {
        path: String,
        line: usize,
        reason: String,
    },

    /// An observer requested termination.
    #[error("cancelled by observer")]
    Cancelled,
}

impl SolveError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SolveError::Configuration(message.into())
    }
}

/// Terminal outcome of a Newton solve. A first-class value: the ODE step
/// controller inspects it to decide whether to accept, shrink, or retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    Diverged,
    Terminated,
    IterationLimitExceeded,
}

impl SolveStatus {
    pub fn is_converged(self) -> bool {
        matches!(self, SolveStatus::Converged)
    }
}
