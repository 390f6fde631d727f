//! Normalizing: rescaling each coordinate by a factor derived from the
//! initial guess so the solver iterates on O(1) quantities.

use nalgebra::DVector;

use crate::error::SolveError;
use crate::mapping::{VarId, VectorMapping};

/// Diagonal, invertible change of coordinates. `scale`/`unscale` are mutual
/// inverses; the mapping itself evaluates `unscale` (normalized space back
/// to physical space).
pub struct ScalingMapping {
    factors: Vec<f64>,
    ids: Vec<VarId>,
}

impl ScalingMapping {
    pub fn new(factors: Vec<f64>, ids: Vec<VarId>) -> Result<Self, SolveError> {
        if factors.len() != ids.len() {
            return Err(SolveError::configuration(format!(
                "{} scale factors for {} ids",
                factors.len(),
                ids.len()
            )));
        }
        if let Some(f) = factors.iter().find(|f| !f.is_finite() || **f <= 0.0) {
            return Err(SolveError::configuration(format!(
                "scale factors must be finite and positive, got {f}"
            )));
        }
        Ok(Self { factors, ids })
    }

    /// Factors derived from a reference point: `max(|x0_i|, 1)`.
    pub fn from_reference(x0: &DVector<f64>, ids: Vec<VarId>) -> Result<Self, SolveError> {
        let factors = x0.iter().map(|v| v.abs().max(1.0)).collect();
        Self::new(factors, ids)
    }

    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    /// Physical to normalized: divide by the factors.
    pub fn scale(&self, physical: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.factors.len(),
            physical.iter().zip(&self.factors).map(|(v, s)| v / s),
        )
    }

    /// Normalized to physical: multiply by the factors.
    pub fn unscale(&self, normalized: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.factors.len(),
            normalized.iter().zip(&self.factors).map(|(v, s)| v * s),
        )
    }
}

impl VectorMapping for ScalingMapping {
    fn input_dimension(&self) -> usize {
        self.factors.len()
    }

    fn output_dimension(&self) -> usize {
        self.factors.len()
    }

    fn input_ids(&self) -> &[VarId] {
        &self.ids
    }

    fn output_ids(&self) -> &[VarId] {
        &self.ids
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        out.copy_from(&self.unscale(x));
    }
}

/// Presents an inner mapping in normalized input coordinates.
pub struct NormalizingMapping<M> {
    inner: M,
    scaling: ScalingMapping,
}

impl<M: VectorMapping> NormalizingMapping<M> {
    /// Derives per-coordinate factors from the magnitudes of `initial_guess`.
    pub fn new(inner: M, initial_guess: &DVector<f64>) -> Result<Self, SolveError> {
        if initial_guess.len() != inner.input_dimension() {
            return Err(SolveError::configuration(format!(
                "initial guess length {} does not match input dimension {}",
                initial_guess.len(),
                inner.input_dimension()
            )));
        }
        let scaling = ScalingMapping::from_reference(initial_guess, inner.input_ids().to_vec())?;
        Ok(Self { inner, scaling })
    }

    pub fn scaling(&self) -> &ScalingMapping {
        &self.scaling
    }
}

impl<M: VectorMapping> VectorMapping for NormalizingMapping<M> {
    fn input_dimension(&self) -> usize {
        self.inner.input_dimension()
    }

    fn output_dimension(&self) -> usize {
        self.inner.output_dimension()
    }

    fn input_ids(&self) -> &[VarId] {
        self.inner.input_ids()
    }

    fn output_ids(&self) -> &[VarId] {
        self.inner.output_ids()
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        let physical = self.scaling.unscale(x);
        self.inner.apply(&physical, out);
    }
}
