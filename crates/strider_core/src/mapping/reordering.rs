//! Reordering: a fixed permutation of a square mapping's coordinates.

use nalgebra::DVector;

use crate::error::SolveError;
use crate::mapping::{VarId, VectorMapping};

/// Applies one fixed permutation to both the input and output coordinates of
/// a square mapping. `order`/`unorder` are mutual inverses.
pub struct ReorderingMapping<M> {
    inner: M,
    /// ordered[i] = full[permutation[i]]
    permutation: Vec<usize>,
    inverse: Vec<usize>,
    input_ids: Vec<VarId>,
    output_ids: Vec<VarId>,
}

impl<M: VectorMapping> ReorderingMapping<M> {
    pub fn new(inner: M, permutation: Vec<usize>) -> Result<Self, SolveError> {
        let dim = inner.input_dimension();
        if inner.output_dimension() != dim {
            return Err(SolveError::configuration(format!(
                "reordering requires a square mapping, got {}x{}",
                inner.output_dimension(),
                dim
            )));
        }
        if permutation.len() != dim {
            return Err(SolveError::configuration(format!(
                "permutation length {} does not match dimension {dim}",
                permutation.len()
            )));
        }

        let mut inverse = vec![usize::MAX; dim];
        for (i, &p) in permutation.iter().enumerate() {
            if p >= dim {
                return Err(SolveError::configuration(format!(
                    "permutation entry {p} out of range for dimension {dim}"
                )));
            }
            if inverse[p] != usize::MAX {
                return Err(SolveError::configuration(format!(
                    "permutation is not a bijection: index {p} appears twice"
                )));
            }
            inverse[p] = i;
        }

        let input_ids = permutation.iter().map(|&p| inner.input_ids()[p]).collect();
        let output_ids = permutation.iter().map(|&p| inner.output_ids()[p]).collect();

        Ok(Self {
            inner,
            permutation,
            inverse,
            input_ids,
            output_ids,
        })
    }

    /// Maps a vector from the inner ordering into the reordered view.
    pub fn order(&self, full: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.permutation.len(),
            self.permutation.iter().map(|&p| full[p]),
        )
    }

    /// Maps a reordered vector back to the inner ordering.
    pub fn unorder(&self, ordered: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(self.inverse.len(), self.inverse.iter().map(|&p| ordered[p]))
    }
}

impl<M: VectorMapping> VectorMapping for ReorderingMapping<M> {
    fn input_dimension(&self) -> usize {
        self.permutation.len()
    }

    fn output_dimension(&self) -> usize {
        self.permutation.len()
    }

    fn input_ids(&self) -> &[VarId] {
        &self.input_ids
    }

    fn output_ids(&self) -> &[VarId] {
        &self.output_ids
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        let inner_x = self.unorder(x);
        let mut inner_out = DVector::zeros(self.permutation.len());
        self.inner.apply(&inner_x, &mut inner_out);
        out.copy_from(&self.order(&inner_out));
    }
}
