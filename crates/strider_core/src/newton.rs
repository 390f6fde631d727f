//! Newton-Raphson root finding built from interchangeable strategies:
//! descent direction, line search, error estimation, and regularization are
//! injected into an iteration performer, which a [`NewtonSolver`]
//! orchestrates to a terminal [`crate::error::SolveStatus`].

pub mod descent;
pub mod error_estimator;
pub mod iteration;
pub mod line_search;
pub mod regularization;
pub mod solver;

pub use descent::{DescentDirection, NewtonDirection, RegularizedDirection};
pub use error_estimator::{ErrorEstimator, InfNormEstimator, ScaledEstimator};
pub use iteration::{IterationPerformer, IterationReport};
pub use line_search::{Backtracking, FullStep, LineSearch};
pub use regularization::{AdaptiveRegularization, Regularization, RegularizationSettings};
pub use solver::{IterationEvent, IterationObserver, NewtonSolver, ObserverId, SolverAction};
