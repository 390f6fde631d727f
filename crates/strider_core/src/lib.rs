/// The `strider_core` crate is the numerical engine for Strider transient
/// simulation: a Newton-Raphson root finder composed from interchangeable
/// strategies, driven by an adaptive implicit ODE step controller.
///
/// Key components:
/// - **Mappings**: `VectorMapping` plus the narrowing/reordering/normalizing
///   composition wrappers.
/// - **Newton stack**: Jacobian providers, descent directions, line
///   searches, error estimators, regularization, and the solver loop.
/// - **ODE stepping**: the per-step implicit equation, the adaptive
///   accept/reject/truncate controller, and extrapolation step sequences.
/// - **Configuration**: string-keyed option tables, strategy factories, and
///   the per-variable tolerance-table loader.
pub mod error;
pub mod jacobian;
pub mod linear;
pub mod mapping;
pub mod newton;
pub mod ode;
pub mod options;
pub mod sequence;
pub mod tolerances;
