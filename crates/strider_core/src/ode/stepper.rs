//! Adaptive step-size control over the implicit per-step equation.
//!
//! Each attempt runs Propose -> Evaluate -> {Accept | Reject-and-shrink |
//! Truncate-at-event}. Evaluation integrates the proposed step twice with
//! sub-step counts drawn from an extrapolation sequence, Richardson-
//! extrapolates the pair, and feeds their difference to the error estimator
//! as the local error. Integration state (t, x) is mutated only on
//! acceptance.

use anyhow::{bail, Context, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{SolveError, SolveStatus};
use crate::newton::{ErrorEstimator, NewtonSolver};
use crate::ode::implicit::ImplicitStepMapping;
use crate::ode::system::OdeSystem;
use crate::sequence::StepSequence;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StepperSettings {
    pub initial_step: f64,
    pub min_step: f64,
    pub max_step: f64,
    /// Step-size multiplier after a rejection, in (0, 1).
    pub shrink_factor: f64,
    /// Step-size multiplier after a comfortable acceptance, above 1.
    pub growth_factor: f64,
    /// Damps the growth so the controller does not ride the tolerance.
    pub safety_factor: f64,
    /// Fraction of the acceptance threshold under which an accepted step
    /// counts as comfortable, in (0, 1].
    pub comfort_fraction: f64,
    /// Consecutive rejections tolerated by the driver before the run fails.
    pub max_consecutive_rejections: usize,
    /// Width to which an event's crossing time is localized.
    pub event_time_tolerance: f64,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            initial_step: 1e-2,
            min_step: 1e-10,
            max_step: 1.0,
            shrink_factor: 0.5,
            growth_factor: 2.0,
            safety_factor: 0.9,
            comfort_fraction: 0.5,
            max_consecutive_rejections: 25,
            event_time_tolerance: 1e-9,
        }
    }
}

impl StepperSettings {
    pub fn validate(&self) -> Result<(), SolveError> {
        if !(self.min_step > 0.0 && self.min_step <= self.initial_step
            && self.initial_step <= self.max_step)
        {
            return Err(SolveError::configuration(format!(
                "step sizes must satisfy 0 < min <= initial <= max, got min {} initial {} max {}",
                self.min_step, self.initial_step, self.max_step
            )));
        }
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(SolveError::configuration(
                "shrink factor must lie in (0, 1)",
            ));
        }
        if self.growth_factor <= 1.0 {
            return Err(SolveError::configuration("growth factor must exceed 1"));
        }
        if !(self.safety_factor > 0.0 && self.safety_factor <= 1.0) {
            return Err(SolveError::configuration(
                "safety factor must lie in (0, 1]",
            ));
        }
        if !(self.comfort_fraction > 0.0 && self.comfort_fraction <= 1.0) {
            return Err(SolveError::configuration(
                "comfort fraction must lie in (0, 1]",
            ));
        }
        if self.event_time_tolerance <= 0.0 {
            return Err(SolveError::configuration(
                "event time tolerance must be positive",
            ));
        }
        Ok(())
    }
}

/// Direction of a zero function's sign change across a truncated step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionSign {
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZeroCrossing {
    /// Index of the zero function that triggered the truncation.
    pub index: usize,
    pub transition: TransitionSign,
    /// Crossing time within the step.
    pub time: f64,
}

/// Outcome of one step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// Step size the attempt was evaluated with.
    pub h_attempted: f64,
    /// Step actually realized; differs from `h_attempted` when truncated.
    pub h_realized: f64,
    pub accepted: bool,
    /// Whether the next proposed step size differs from this attempt's.
    pub size_changed: bool,
    pub truncated: bool,
    pub error_norm: f64,
    pub zero_crossing: Option<ZeroCrossing>,
    /// Newton iterations spent across the attempt's sub-step solves.
    pub newton_iterations: usize,
}

/// Snapshot handed to step observers after every attempt, accepted or not.
pub struct StepEvent<'a> {
    pub report: &'a StepReport,
    pub time: f64,
    pub state: &'a DVector<f64>,
    pub solver: &'a NewtonSolver,
}

/// Control action a step observer may request, honored at the next step
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Stop,
}

pub trait StepObserver {
    fn observe(&mut self, event: &StepEvent<'_>) -> Option<StepAction>;
}

impl<F> StepObserver for F
where
    F: FnMut(&StepEvent<'_>) -> Option<StepAction>,
{
    fn observe(&mut self, event: &StepEvent<'_>) -> Option<StepAction> {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepObserverId(u64);

/// Adaptive implicit integrator over an [`OdeSystem`].
pub struct AdaptiveStepper<S> {
    system: S,
    solver: NewtonSolver,
    estimator: Box<dyn ErrorEstimator>,
    sequence: Box<dyn StepSequence>,
    settings: StepperSettings,
    t: f64,
    x: DVector<f64>,
    h: f64,
    stop_requested: bool,
    observers: Vec<(StepObserverId, Box<dyn StepObserver>)>,
    next_observer_id: u64,
}

impl<S: OdeSystem> AdaptiveStepper<S> {
    /// `solver` handles the per-sub-step implicit equations; `estimator`
    /// judges the local extrapolation error.
    pub fn new(
        system: S,
        solver: NewtonSolver,
        estimator: Box<dyn ErrorEstimator>,
        sequence: Box<dyn StepSequence>,
        settings: StepperSettings,
        t0: f64,
        x0: DVector<f64>,
    ) -> Result<Self, SolveError> {
        settings.validate()?;
        if x0.len() != system.dimension() {
            return Err(SolveError::configuration(format!(
                "initial state length {} does not match system dimension {}",
                x0.len(),
                system.dimension()
            )));
        }
        if system.variable_ids().len() != system.dimension() {
            return Err(SolveError::configuration(format!(
                "system declares {} variable ids for dimension {}",
                system.variable_ids().len(),
                system.dimension()
            )));
        }
        Ok(Self {
            system,
            solver,
            estimator,
            sequence,
            h: settings.initial_step,
            settings,
            t: t0,
            x: x0,
            stop_requested: false,
            observers: Vec::new(),
            next_observer_id: 0,
        })
    }

    pub fn time(&self) -> f64 {
        self.t
    }

    pub fn state(&self) -> &DVector<f64> {
        &self.x
    }

    /// Step size the next attempt will propose.
    pub fn proposed_step(&self) -> f64 {
        self.h
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn subscribe(&mut self, observer: Box<dyn StepObserver>) -> StepObserverId {
        let id = StepObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, observer));
        id
    }

    pub fn unsubscribe(&mut self, id: StepObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Caps the next proposal so the step does not overshoot `t_end`.
    pub fn clamp_to(&mut self, t_end: f64) {
        let remaining = t_end - self.t;
        if remaining > 0.0 && self.h > remaining {
            self.h = remaining;
        }
    }

    /// Integrates `[t, t+h]` with `n` backward-Euler sub-steps, chaining
    /// warm-started Newton solves. `None` means a sub-solve diverged or ran
    /// out of iterations; the attempt is then rejected.
    fn advance_substeps(&mut self, n: usize, h: f64) -> Result<Option<(DVector<f64>, usize)>, SolveError> {
        let sub_h = h / n as f64;
        let mut t = self.t;
        let mut x = self.x.clone();
        let mut iterations = 0;

        for _ in 0..n {
            let mapping = ImplicitStepMapping::new(&self.system, t, sub_h, &x);
            // Current state is the predictor; adaptive state carries over.
            self.solver.set_initial_guess(x.clone(), false);
            let status = self.solver.run(&mapping)?;
            iterations += self.solver.iterations();
            match status {
                SolveStatus::Converged => {
                    x = self.solver.current_solution().clone();
                    t += sub_h;
                }
                SolveStatus::Terminated => return Err(SolveError::Cancelled),
                SolveStatus::Diverged | SolveStatus::IterationLimitExceeded => {
                    return Ok(None);
                }
            }
        }
        Ok(Some((x, iterations)))
    }

    /// Performs one step attempt and reports it. The integration state
    /// advances only when the attempt is accepted; a rejection only shrinks
    /// the next proposal. Counting consecutive rejections against
    /// `max_consecutive_rejections` is the driver's concern.
    pub fn step(&mut self) -> Result<StepReport, SolveError> {
        let h = self.h.clamp(self.settings.min_step, self.settings.max_step);

        self.sequence.reset();
        let n1 = self.sequence.next();
        let n2 = self.sequence.next();

        let first = self.advance_substeps(n1, h)?;
        let second = match &first {
            Some(_) => self.advance_substeps(n2, h)?,
            None => None,
        };

        let report = match (first, second) {
            (Some((coarse, it1)), Some((fine, it2))) => {
                let difference = &fine - &coarse;
                let error_norm = self
                    .estimator
                    .error_norm(&difference, self.system.variable_ids())?;

                if self.estimator.is_converged(error_norm) {
                    // Richardson extrapolation of the sub-step pair.
                    let weight = n2 as f64 / (n2 - n1) as f64;
                    let extrapolated = &fine * weight - &coarse * (weight - 1.0);
                    self.accept(h, extrapolated, error_norm, it1 + it2)?
                } else {
                    self.reject(h, error_norm, it1 + it2)
                }
            }
            (Some((_, it1)), None) => self.reject(h, f64::INFINITY, it1),
            _ => self.reject(h, f64::INFINITY, 0),
        };

        let event = StepEvent {
            report: &report,
            time: self.t,
            state: &self.x,
            solver: &self.solver,
        };
        let mut stop = false;
        for (_, observer) in self.observers.iter_mut() {
            if observer.observe(&event) == Some(StepAction::Stop) {
                stop = true;
            }
        }
        if stop {
            self.stop_requested = true;
        }

        Ok(report)
    }

    fn reject(&mut self, h: f64, error_norm: f64, newton_iterations: usize) -> StepReport {
        let next = (h * self.settings.shrink_factor).max(self.settings.min_step);
        let size_changed = next != h;
        self.h = next;
        StepReport {
            h_attempted: h,
            h_realized: 0.0,
            accepted: false,
            size_changed,
            truncated: false,
            error_norm,
            zero_crossing: None,
            newton_iterations,
        }
    }

    fn accept(
        &mut self,
        h: f64,
        next_state: DVector<f64>,
        error_norm: f64,
        newton_iterations: usize,
    ) -> Result<StepReport, SolveError> {
        let crossing = self.locate_crossing(h, &next_state);

        let (h_realized, truncated) = match &crossing {
            Some(crossing) => {
                let fraction = crossing.time / h;
                self.x = &self.x + (&next_state - &self.x) * fraction;
                self.t += crossing.time;
                (crossing.time, true)
            }
            None => {
                self.x = next_state;
                self.t += h;
                (h, false)
            }
        };

        // Grow only after a comfortable acceptance, and never shrink after
        // an accept.
        let comfortable = self
            .estimator
            .is_converged(error_norm / self.settings.comfort_fraction);
        let next = if comfortable {
            let grown = h * self.settings.growth_factor * self.settings.safety_factor;
            grown.clamp(h, self.settings.max_step)
        } else {
            h
        };
        let size_changed = next != h;
        self.h = next;

        Ok(StepReport {
            h_attempted: h,
            h_realized,
            accepted: true,
            size_changed,
            truncated,
            error_norm,
            zero_crossing: crossing,
            newton_iterations,
        })
    }

    /// Checks every monitored zero function across the accepted step and
    /// localizes the earliest sign change by bisection over the linearly
    /// interpolated state.
    fn locate_crossing(&self, h: f64, next_state: &DVector<f64>) -> Option<ZeroCrossing> {
        let count = self.system.zero_function_count();
        if count == 0 {
            return None;
        }

        let mut before = DVector::zeros(count);
        let mut after = DVector::zeros(count);
        self.system.zero_functions(self.t, &self.x, &mut before);
        self.system.zero_functions(self.t + h, next_state, &mut after);

        let mut earliest: Option<ZeroCrossing> = None;
        for k in 0..count {
            // A zero landing exactly on the step end still counts as a
            // crossing; only a same-signed nonzero pair is skipped.
            if before[k] == 0.0
                || (after[k] != 0.0 && before[k].signum() == after[k].signum())
            {
                continue;
            }
            let transition = if after[k] > before[k] {
                TransitionSign::Rising
            } else {
                TransitionSign::Falling
            };

            let mut lo = 0.0_f64;
            let mut hi = h;
            let mut z_lo = before[k];
            let mut scratch = DVector::zeros(count);
            while hi - lo > self.settings.event_time_tolerance {
                let mid = 0.5 * (lo + hi);
                let state = &self.x + (next_state - &self.x) * (mid / h);
                self.system.zero_functions(self.t + mid, &state, &mut scratch);
                if scratch[k].signum() == z_lo.signum() && scratch[k] != 0.0 {
                    lo = mid;
                    z_lo = scratch[k];
                } else {
                    hi = mid;
                }
            }

            let candidate = ZeroCrossing {
                index: k,
                transition,
                time: hi,
            };
            let is_earlier = earliest
                .as_ref()
                .map_or(true, |current| candidate.time < current.time);
            if is_earlier {
                earliest = Some(candidate);
            }
        }
        earliest
    }

    /// Drives step attempts until `t_end`, owning the consecutive-rejection
    /// cap. Observer-requested stops surface as [`SolveError::Cancelled`].
    pub fn integrate_to(&mut self, t_end: f64) -> Result<()> {
        if t_end <= self.t {
            bail!("integration end {} is not ahead of current time {}", t_end, self.t);
        }

        let mut consecutive_rejections = 0usize;
        while self.t < t_end - self.settings.event_time_tolerance {
            if self.stop_requested {
                return Err(SolveError::Cancelled.into());
            }
            self.clamp_to(t_end);
            let report = self
                .step()
                .with_context(|| format!("step attempt at t = {} failed", self.t))?;

            if report.accepted {
                consecutive_rejections = 0;
            } else {
                consecutive_rejections += 1;
                if consecutive_rejections > self.settings.max_consecutive_rejections {
                    bail!(
                        "step rejected {consecutive_rejections} consecutive times at t = {} (h = {:.3e})",
                        self.t,
                        report.h_attempted
                    );
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AdaptiveStepper, StepAction, StepEvent, StepperSettings, TransitionSign,
    };
    use crate::jacobian::FiniteDifferenceJacobian;
    use crate::linear::DenseLu;
    use crate::mapping::{anonymous_ids, VarId};
    use crate::newton::{
        FullStep, InfNormEstimator, IterationPerformer, NewtonDirection, NewtonSolver,
    };
    use crate::ode::system::OdeSystem;
    use crate::sequence::Harmonic;
    use nalgebra::DVector;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Decay {
        ids: Vec<VarId>,
    }

    impl Decay {
        fn new() -> Self {
            Self {
                ids: anonymous_ids(1),
            }
        }
    }

    impl OdeSystem for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn variable_ids(&self) -> &[VarId] {
            &self.ids
        }

        fn rhs(&self, _t: f64, x: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = -x[0];
        }
    }

    /// dx/dt = 1 with a zero function crossing at x = 0.5.
    struct Ramp {
        ids: Vec<VarId>,
    }

    impl Ramp {
        fn new() -> Self {
            Self {
                ids: anonymous_ids(1),
            }
        }
    }

    impl OdeSystem for Ramp {
        fn dimension(&self) -> usize {
            1
        }

        fn variable_ids(&self) -> &[VarId] {
            &self.ids
        }

        fn rhs(&self, _t: f64, _x: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = 1.0;
        }

        fn zero_function_count(&self) -> usize {
            1
        }

        fn zero_functions(&self, _t: f64, x: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = x[0] - 0.5;
        }
    }

    /// dx/dt = 1 with a clamped zero function, positive below x = 0.5 and
    /// exactly zero from there on.
    struct ClampedRamp {
        ids: Vec<VarId>,
    }

    impl ClampedRamp {
        fn new() -> Self {
            Self {
                ids: anonymous_ids(1),
            }
        }
    }

    impl OdeSystem for ClampedRamp {
        fn dimension(&self) -> usize {
            1
        }

        fn variable_ids(&self) -> &[VarId] {
            &self.ids
        }

        fn rhs(&self, _t: f64, _x: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = 1.0;
        }

        fn zero_function_count(&self) -> usize {
            1
        }

        fn zero_functions(&self, _t: f64, x: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = (0.5 - x[0]).max(0.0);
        }
    }

    struct Broken {
        ids: Vec<VarId>,
    }

    impl OdeSystem for Broken {
        fn dimension(&self) -> usize {
            1
        }

        fn variable_ids(&self) -> &[VarId] {
            &self.ids
        }

        fn rhs(&self, _t: f64, _x: &DVector<f64>, out: &mut DVector<f64>) {
            out[0] = f64::NAN;
        }
    }

    fn newton_solver(dim: usize) -> NewtonSolver {
        let performer = IterationPerformer::new(
            Box::new(FiniteDifferenceJacobian::new()),
            Box::new(NewtonDirection::new(Box::new(DenseLu))),
            Box::new(FullStep::default()),
            Box::new(InfNormEstimator::new(1e-12).expect("estimator should build")),
        );
        NewtonSolver::new(performer, DVector::zeros(dim), 10).expect("solver should build")
    }

    fn stepper<S: OdeSystem>(
        system: S,
        tolerance: f64,
        settings: StepperSettings,
        x0: Vec<f64>,
    ) -> AdaptiveStepper<S> {
        let dim = x0.len();
        AdaptiveStepper::new(
            system,
            newton_solver(dim),
            Box::new(InfNormEstimator::new(tolerance).expect("estimator should build")),
            Box::new(Harmonic::default()),
            settings,
            0.0,
            DVector::from_vec(x0),
        )
        .expect("stepper should build")
    }

    #[test]
    fn decay_integrates_close_to_the_analytic_solution() {
        let mut stepper = stepper(
            Decay::new(),
            1e-6,
            StepperSettings::default(),
            vec![1.0],
        );
        stepper.integrate_to(1.0).expect("integration should run");

        assert!((stepper.time() - 1.0).abs() < 1e-6);
        let expected = (-1.0_f64).exp();
        assert!(
            (stepper.state()[0] - expected).abs() < 1e-3,
            "got {}, expected {expected}",
            stepper.state()[0]
        );
    }

    #[test]
    fn rejected_step_shrinks_the_next_proposal() {
        // Tolerance so tight the first attempt cannot pass.
        let mut stepper = stepper(
            Decay::new(),
            1e-15,
            StepperSettings::default(),
            vec![1.0],
        );
        let before = stepper.proposed_step();
        let report = stepper.step().expect("attempt should run");

        assert!(!report.accepted);
        assert!(stepper.proposed_step() < before);
        // Rejection leaves the integration state untouched.
        assert_eq!(stepper.time(), 0.0);
        assert_eq!(stepper.state()[0], 1.0);
    }

    #[test]
    fn comfortable_accept_never_shrinks_the_proposal() {
        let settings = StepperSettings {
            initial_step: 1e-4,
            ..StepperSettings::default()
        };
        let mut stepper = stepper(Decay::new(), 1e-4, settings, vec![1.0]);

        let before = stepper.proposed_step();
        let report = stepper.step().expect("attempt should run");
        assert!(report.accepted);
        assert!(stepper.proposed_step() >= before);
    }

    #[test]
    fn zero_crossing_truncates_the_step() {
        let settings = StepperSettings {
            initial_step: 0.8,
            max_step: 0.8,
            ..StepperSettings::default()
        };
        // Linear system: any step size passes the error test.
        let mut stepper = stepper(Ramp::new(), 1e-6, settings, vec![0.0]);

        let report = stepper.step().expect("attempt should run");
        assert!(report.accepted);
        assert!(report.truncated);
        let crossing = report.zero_crossing.expect("crossing should be recorded");
        assert_eq!(crossing.index, 0);
        assert_eq!(crossing.transition, TransitionSign::Rising);
        assert!((stepper.time() - 0.5).abs() < 1e-6);
        assert!((stepper.state()[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_function_reaching_exactly_zero_at_the_step_end_truncates() {
        let settings = StepperSettings {
            initial_step: 0.8,
            max_step: 0.8,
            ..StepperSettings::default()
        };
        let mut stepper = stepper(ClampedRamp::new(), 1e-6, settings, vec![0.0]);

        let report = stepper.step().expect("attempt should run");
        assert!(report.accepted);
        assert!(report.truncated);
        let crossing = report.zero_crossing.expect("crossing should be recorded");
        assert_eq!(crossing.transition, TransitionSign::Falling);
        assert!((stepper.time() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn observers_see_every_attempt_and_can_cancel() {
        let attempts = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&attempts);

        let mut stepper = stepper(
            Decay::new(),
            1e-6,
            StepperSettings::default(),
            vec![1.0],
        );
        stepper.subscribe(Box::new(move |event: &StepEvent<'_>| {
            log.borrow_mut().push(event.report.accepted);
            if log.borrow().len() >= 4 {
                Some(StepAction::Stop)
            } else {
                None
            }
        }));

        let err = stepper
            .integrate_to(10.0)
            .err()
            .expect("cancellation should surface");
        assert!(format!("{err:#}").contains("cancelled"));
        assert!(attempts.borrow().len() >= 4);
    }

    #[test]
    fn persistent_newton_failure_exhausts_the_rejection_cap() {
        let settings = StepperSettings {
            max_consecutive_rejections: 5,
            ..StepperSettings::default()
        };
        let mut stepper = stepper(
            Broken {
                ids: anonymous_ids(1),
            },
            1e-6,
            settings,
            vec![1.0],
        );

        let err = stepper
            .integrate_to(1.0)
            .err()
            .expect("run should fail");
        assert!(format!("{err:#}").contains("consecutive"));
        // The failed run never advanced the state.
        assert_eq!(stepper.time(), 0.0);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = StepperSettings {
            shrink_factor: 1.5,
            ..StepperSettings::default()
        };
        let err = settings.validate().err().expect("expected error");
        assert!(format!("{err}").contains("shrink factor"));
    }
}
