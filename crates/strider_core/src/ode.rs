//! Implicit ODE integration: one nonlinear equation per time step, solved
//! by the Newton stack, under an adaptive accept/reject/truncate step
//! controller with zero-crossing event detection.

pub mod implicit;
pub mod stepper;
pub mod system;

pub use implicit::ImplicitStepMapping;
pub use stepper::{
    AdaptiveStepper, StepAction, StepEvent, StepObserver, StepObserverId, StepReport,
    StepperSettings, TransitionSign, ZeroCrossing,
};
pub use system::OdeSystem;
