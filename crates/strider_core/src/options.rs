//! String-keyed configuration surface.
//!
//! Each configurable component exposes a fixed allow-list of option keys
//! with paired help text, so external configuration sources can populate
//! strategy choices without the core depending on any particular format.
//! Unknown keys and unknown strategy names fail at configuration time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SolveError;
use crate::jacobian::{CachedJacobian, FiniteDifferenceJacobian, JacobianProvider, JacobianTrimmer};
use crate::linear::{DenseLu, LinearSolver};
use crate::newton::{
    AdaptiveRegularization, Backtracking, DescentDirection, ErrorEstimator, FullStep,
    InfNormEstimator, IterationPerformer, LineSearch, NewtonDirection, NewtonSolver,
    RegularizedDirection, RegularizationSettings, ScaledEstimator,
};
use crate::tolerances::ToleranceTable;

/// Discriminated option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptionValue {
    Integer(i64),
    Real(f64),
    Text(String),
    /// Reference to a nested component configured elsewhere.
    Component(String),
}

impl OptionValue {
    fn kind(&self) -> &'static str {
        match self {
            OptionValue::Integer(_) => "integer",
            OptionValue::Real(_) => "real",
            OptionValue::Text(_) => "text",
            OptionValue::Component(_) => "component",
        }
    }
}

/// One allowed key: its default value (which also fixes the expected type)
/// and its help text.
pub struct OptionSpec {
    pub key: &'static str,
    pub help: &'static str,
    pub default: OptionValue,
}

/// A component's option table: a fixed allow-list of keys, each with help
/// text and a typed value.
pub struct OptionTable {
    specs: Vec<OptionSpec>,
    values: HashMap<&'static str, OptionValue>,
}

impl OptionTable {
    pub fn new(specs: Vec<OptionSpec>) -> Self {
        let values = specs
            .iter()
            .map(|spec| (spec.key, spec.default.clone()))
            .collect();
        Self { specs, values }
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.specs.iter().map(|spec| spec.key)
    }

    pub fn help(&self, key: &str) -> Option<&'static str> {
        self.specs
            .iter()
            .find(|spec| spec.key == key)
            .map(|spec| spec.help)
    }

    /// Sets `key`, rejecting unknown keys and type mismatches.
    pub fn set(&mut self, key: &str, value: OptionValue) -> Result<(), SolveError> {
        let spec = self
            .specs
            .iter()
            .find(|spec| spec.key == key)
            .ok_or_else(|| SolveError::configuration(format!("unknown option \"{key}\"")))?;
        if std::mem::discriminant(&spec.default) != std::mem::discriminant(&value) {
            return Err(SolveError::configuration(format!(
                "option \"{key}\" expects {} values, got {}",
                spec.default.kind(),
                value.kind()
            )));
        }
        self.values.insert(spec.key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn integer(&self, key: &str) -> Result<i64, SolveError> {
        match self.values.get(key) {
            Some(OptionValue::Integer(v)) => Ok(*v),
            _ => Err(SolveError::configuration(format!(
                "option \"{key}\" is not a configured integer"
            ))),
        }
    }

    pub fn real(&self, key: &str) -> Result<f64, SolveError> {
        match self.values.get(key) {
            Some(OptionValue::Real(v)) => Ok(*v),
            _ => Err(SolveError::configuration(format!(
                "option \"{key}\" is not a configured real"
            ))),
        }
    }

    pub fn text(&self, key: &str) -> Result<&str, SolveError> {
        match self.values.get(key) {
            Some(OptionValue::Text(v)) => Ok(v),
            _ => Err(SolveError::configuration(format!(
                "option \"{key}\" is not a configured text"
            ))),
        }
    }
}

/// The Newton solver's option allow-list.
pub fn newton_option_table() -> OptionTable {
    OptionTable::new(vec![
        OptionSpec {
            key: "descent",
            help: "descent direction strategy: newton | regularized",
            default: OptionValue::Text("newton".to_string()),
        },
        OptionSpec {
            key: "line_search",
            help: "line search strategy: full | backtracking",
            default: OptionValue::Text("full".to_string()),
        },
        OptionSpec {
            key: "estimator",
            help: "error estimator: inf_norm | scaled",
            default: OptionValue::Text("inf_norm".to_string()),
        },
        OptionSpec {
            key: "tolerance",
            help: "convergence tolerance for the inf-norm estimator",
            default: OptionValue::Real(1e-9),
        },
        OptionSpec {
            key: "max_iterations",
            help: "iteration limit per solve",
            default: OptionValue::Integer(25),
        },
        OptionSpec {
            key: "step_length",
            help: "fixed step-length multiplier for the full line search",
            default: OptionValue::Real(1.0),
        },
        OptionSpec {
            key: "jacobian_refresh",
            help: "requests between Jacobian recomputations (1 = always fresh)",
            default: OptionValue::Integer(1),
        },
        OptionSpec {
            key: "trim_threshold",
            help: "drop Jacobian entries below this magnitude (0 disables)",
            default: OptionValue::Real(0.0),
        },
        OptionSpec {
            key: "regularization",
            help: "damping adaptation: none | adaptive",
            default: OptionValue::Text("none".to_string()),
        },
    ])
}

fn descent_by_name(name: &str) -> Result<Box<dyn DescentDirection>, SolveError> {
    let linear: Box<dyn LinearSolver> = Box::new(DenseLu);
    match name {
        "newton" => Ok(Box::new(NewtonDirection::new(linear))),
        "regularized" => Ok(Box::new(RegularizedDirection::new(linear))),
        other => Err(SolveError::configuration(format!(
            "unknown descent direction \"{other}\""
        ))),
    }
}

fn line_search_by_name(name: &str, step_length: f64) -> Result<Box<dyn LineSearch>, SolveError> {
    match name {
        "full" => Ok(Box::new(FullStep::new(step_length)?)),
        "backtracking" => Ok(Box::new(Backtracking::default())),
        other => Err(SolveError::configuration(format!(
            "unknown line search \"{other}\""
        ))),
    }
}

fn estimator_by_name(
    name: &str,
    tolerance: f64,
    scales: Option<&ToleranceTable>,
) -> Result<Box<dyn ErrorEstimator>, SolveError> {
    match name {
        "inf_norm" => Ok(Box::new(InfNormEstimator::new(tolerance)?)),
        "scaled" => {
            let table = scales.ok_or_else(|| {
                SolveError::configuration(
                    "the scaled estimator requires a loaded tolerance table",
                )
            })?;
            Ok(Box::new(ScaledEstimator::new(table.to_map())?))
        }
        other => Err(SolveError::configuration(format!(
            "unknown error estimator \"{other}\""
        ))),
    }
}

/// Assembles a [`NewtonSolver`] from an option table, selecting every
/// strategy by its configured name.
pub fn build_newton_solver(
    options: &OptionTable,
    initial_guess: nalgebra::DVector<f64>,
    scales: Option<&ToleranceTable>,
) -> Result<NewtonSolver, SolveError> {
    let descent = descent_by_name(options.text("descent")?)?;
    let line_search = line_search_by_name(options.text("line_search")?, options.real("step_length")?)?;
    let estimator = estimator_by_name(options.text("estimator")?, options.real("tolerance")?, scales)?;

    let refresh = options.integer("jacobian_refresh")?;
    if refresh < 1 {
        return Err(SolveError::configuration(
            "jacobian_refresh must be at least 1",
        ));
    }
    let jacobian: Box<dyn JacobianProvider> = if refresh == 1 {
        Box::new(FiniteDifferenceJacobian::new())
    } else {
        Box::new(CachedJacobian::new(
            FiniteDifferenceJacobian::new(),
            refresh as usize,
        )?)
    };

    let mut performer = IterationPerformer::new(jacobian, descent, line_search, estimator);

    let trim_threshold = options.real("trim_threshold")?;
    if trim_threshold > 0.0 {
        performer = performer.with_trimmer(JacobianTrimmer::new(trim_threshold)?);
    }

    match options.text("regularization")? {
        "none" => {}
        "adaptive" => {
            performer = performer.with_regularization(Box::new(AdaptiveRegularization::new(
                RegularizationSettings::default(),
            )?));
        }
        other => {
            return Err(SolveError::configuration(format!(
                "unknown regularization \"{other}\""
            )));
        }
    }

    let max_iterations = options.integer("max_iterations")?;
    if max_iterations < 1 {
        return Err(SolveError::configuration(
            "max_iterations must be at least 1",
        ));
    }

    NewtonSolver::new(performer, initial_guess, max_iterations as usize)
}
