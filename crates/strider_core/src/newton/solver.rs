//! The Newton solver: drives repeated iterations to a terminal status and
//! reports each completed iteration to subscribed observers.

use nalgebra::DVector;

use crate::error::{SolveError, SolveStatus};
use crate::mapping::VectorMapping;
use crate::newton::iteration::IterationPerformer;

/// Snapshot handed to observers after each completed iteration.
pub struct IterationEvent<'a> {
    pub iteration: usize,
    pub error_norm: f64,
    pub converged: bool,
    pub solution: &'a DVector<f64>,
}

/// Control action an observer may request. Honored at the next iteration
/// boundary, never mid-iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverAction {
    Stop,
}

/// Receives iteration events and optionally steers the solver. Closures
/// `FnMut(&IterationEvent) -> Option<SolverAction>` implement this directly.
pub trait IterationObserver {
    fn observe(&mut self, event: &IterationEvent<'_>) -> Option<SolverAction>;
}

impl<F> IterationObserver for F
where
    F: FnMut(&IterationEvent<'_>) -> Option<SolverAction>,
{
    fn observe(&mut self, event: &IterationEvent<'_>) -> Option<SolverAction> {
        self(event)
    }
}

/// Handle identifying one observer subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

/// Newton solver over a square equation mapping.
///
/// `run` loops until convergence, divergence, observer-requested
/// termination, or the iteration limit; `current_solution` always reflects
/// the latest iterate, terminal status notwithstanding.
pub struct NewtonSolver {
    performer: IterationPerformer,
    max_iterations: usize,
    x: DVector<f64>,
    iterations: usize,
    stop_requested: bool,
    observers: Vec<(ObserverId, Box<dyn IterationObserver>)>,
    next_observer_id: u64,
}

impl NewtonSolver {
    pub fn new(
        performer: IterationPerformer,
        initial_guess: DVector<f64>,
        max_iterations: usize,
    ) -> Result<Self, SolveError> {
        if max_iterations == 0 {
            return Err(SolveError::configuration(
                "iteration limit must be at least 1",
            ));
        }
        if initial_guess.is_empty() {
            return Err(SolveError::configuration(
                "initial guess must have positive dimension",
            ));
        }
        Ok(Self {
            performer,
            max_iterations,
            x: initial_guess,
            iterations: 0,
            stop_requested: false,
            observers: Vec::new(),
            next_observer_id: 0,
        })
    }

    /// Latest iterate, available even after a failed solve.
    pub fn current_solution(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Diagnostic text describing the latest iteration's norm.
    pub fn current_status_message(&self) -> String {
        match self.performer.last_error_norm() {
            Some(norm) => self.performer.estimator().status_message(norm),
            None => "no iteration performed yet".to_string(),
        }
    }

    pub fn regularization_parameter(&self) -> Option<f64> {
        self.performer.regularization_parameter()
    }

    /// Installs the starting iterate for the next `run`. A hard reset
    /// clears persisted adaptive state (damping parameter, cached Jacobian,
    /// previous norm); a warm start keeps it, for chained per-step solves.
    pub fn set_initial_guess(&mut self, guess: DVector<f64>, hard_reset: bool) {
        self.x = guess;
        self.iterations = 0;
        self.stop_requested = false;
        if hard_reset {
            self.performer.reset_adaptive_state();
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn IterationObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Runs `f` with `observer` subscribed, removing the subscription when
    /// the scope ends regardless of how `f` returns, panics included.
    pub fn with_observer<O, R>(&mut self, observer: O, f: impl FnOnce(&mut Self) -> R) -> R
    where
        O: IterationObserver + 'static,
    {
        struct Unsubscribe<'a> {
            solver: &'a mut NewtonSolver,
            id: ObserverId,
        }
        impl Drop for Unsubscribe<'_> {
            fn drop(&mut self) {
                self.solver.unsubscribe(self.id);
            }
        }

        let id = self.subscribe(Box::new(observer));
        let scope = Unsubscribe { solver: self, id };
        f(scope.solver)
    }

    /// Iterates to a terminal status.
    pub fn run(&mut self, mapping: &dyn VectorMapping) -> Result<SolveStatus, SolveError> {
        if mapping.input_dimension() != mapping.output_dimension() {
            return Err(SolveError::configuration(format!(
                "equation mapping must be square, got {}x{}",
                mapping.output_dimension(),
                mapping.input_dimension()
            )));
        }
        if mapping.input_dimension() != self.x.len() {
            return Err(SolveError::configuration(format!(
                "initial guess length {} does not match mapping dimension {}",
                self.x.len(),
                mapping.input_dimension()
            )));
        }

        loop {
            if self.stop_requested {
                return Ok(SolveStatus::Terminated);
            }
            if self.iterations >= self.max_iterations {
                return Ok(SolveStatus::IterationLimitExceeded);
            }

            let report = self.performer.perform(mapping, &mut self.x)?;
            self.iterations += 1;

            let event = IterationEvent {
                iteration: self.iterations,
                error_norm: report.error_norm,
                converged: report.converged,
                solution: &self.x,
            };
            let mut stop = false;
            for (_, observer) in self.observers.iter_mut() {
                if observer.observe(&event) == Some(SolverAction::Stop) {
                    stop = true;
                }
            }
            if stop {
                self.stop_requested = true;
            }

            if report.converged {
                return Ok(SolveStatus::Converged);
            }
            if report.diverged {
                return Ok(SolveStatus::Diverged);
            }
        }
    }
}
