//! Per-variable tolerance tables loaded from two-column text files.
//!
//! File format: `variable-name<TAB>positive-value`, one entry per line.
//! Blank lines and `#` comments are skipped. Names are resolved to ids
//! through an external [`VariableDirectory`]; format violations report the
//! file path and line number.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SolveError;
use crate::mapping::VarId;

/// External id/name resolution owned by the host simulation.
pub trait VariableDirectory {
    fn id_of(&self, name: &str) -> Option<VarId>;
    fn name_of(&self, id: VarId) -> Option<String>;
}

impl VariableDirectory for HashMap<String, VarId> {
    fn id_of(&self, name: &str) -> Option<VarId> {
        self.get(name).copied()
    }

    fn name_of(&self, id: VarId) -> Option<String> {
        self.iter()
            .find(|(_, existing)| **existing == id)
            .map(|(name, _)| name.clone())
    }
}

/// Id-keyed tolerance lookup for the scaled error estimator.
#[derive(Debug, Clone, Default)]
pub struct ToleranceTable {
    by_id: HashMap<VarId, f64>,
}

impl ToleranceTable {
    pub fn from_path(
        path: impl AsRef<Path>,
        directory: &dyn VariableDirectory,
    ) -> Result<Self, SolveError> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let file = File::open(path).map_err(|err| SolveError::MalformedInput {
            path: label.clone(),
            line: 0,
            reason: format!("cannot open tolerance file: {err}"),
        })?;
        Self::from_reader(BufReader::new(file), &label, directory)
    }

    /// Parses tolerance entries from `reader`; `label` names the source in
    /// diagnostics.
    pub fn from_reader(
        reader: impl BufRead,
        label: &str,
        directory: &dyn VariableDirectory,
    ) -> Result<Self, SolveError> {
        let malformed = |line: usize, reason: String| SolveError::MalformedInput {
            path: label.to_string(),
            line,
            reason,
        };

        let mut by_id = HashMap::new();
        let mut first_line_of_id: HashMap<VarId, usize> = HashMap::new();
        let mut unresolved: Vec<String> = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line = line.map_err(|err| malformed(line_number, format!("read error: {err}")))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let tabs = trimmed.matches('\t').count();
            if tabs != 1 {
                return Err(malformed(
                    line_number,
                    format!("expected exactly one tab separator, found {tabs}"),
                ));
            }
            let (name, value_text) = trimmed
                .split_once('\t')
                .ok_or_else(|| malformed(line_number, "missing tab separator".to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(malformed(line_number, "empty variable name".to_string()));
            }

            let value: f64 = value_text.trim().parse().map_err(|_| {
                malformed(
                    line_number,
                    format!("\"{}\" is not a numeric value", value_text.trim()),
                )
            })?;
            if !value.is_finite() || value <= 0.0 {
                return Err(malformed(
                    line_number,
                    format!("tolerance must be positive, got {value}"),
                ));
            }

            let Some(id) = directory.id_of(name) else {
                unresolved.push(name.to_string());
                continue;
            };

            if let Some(&first_line) = first_line_of_id.get(&id) {
                return Err(malformed(
                    line_number,
                    format!("duplicate entry for \"{name}\" (first defined on line {first_line})"),
                ));
            }
            first_line_of_id.insert(id, line_number);
            by_id.insert(id, value);
        }

        if !unresolved.is_empty() {
            return Err(SolveError::configuration(format!(
                "{label}: variable names not present in the directory: {}",
                unresolved.join(", ")
            )));
        }

        Ok(Self { by_id })
    }

    pub fn get(&self, id: VarId) -> Option<f64> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All configured entries, for estimators that hold the whole table.
    pub fn to_map(&self) -> HashMap<VarId, f64> {
        self.by_id.clone()
    }

    /// Looks up every queried id, aggregating all misses into one
    /// [`SolveError::MissingScale`].
    pub fn resolve(&self, ids: &[VarId]) -> Result<HashMap<VarId, f64>, SolveError> {
        let missing: Vec<VarId> = ids
            .iter()
            .filter(|id| !self.by_id.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SolveError::MissingScale { ids: missing });
        }
        Ok(ids.iter().map(|id| (*id, self.by_id[id])).collect())
    }
}
