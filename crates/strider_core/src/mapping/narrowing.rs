//! Narrowing: fixing a subset of input coordinates to constants and hiding
//! them (and selected outputs) from the externally visible vectors.

use nalgebra::DVector;

use crate::error::SolveError;
use crate::mapping::{VarId, VectorMapping};

/// Wraps a mapping, pinning chosen input coordinates to supplied constants.
///
/// The narrowed mapping exposes only the retained coordinates;
/// [`narrow`](NarrowingMapping::narrow) and
/// [`expand`](NarrowingMapping::expand) are mutual inverses on them.
pub struct NarrowingMapping<M> {
    inner: M,
    /// Sorted (full input index, pinned value) pairs.
    pinned: Vec<(usize, f64)>,
    /// Full input indices that survive narrowing, ascending.
    retained_inputs: Vec<usize>,
    /// Full output indices that survive narrowing, ascending.
    retained_outputs: Vec<usize>,
    input_ids: Vec<VarId>,
    output_ids: Vec<VarId>,
}

impl<M: VectorMapping> NarrowingMapping<M> {
    /// Builds a narrowing over `inner`. `pinned` lists (input index, value)
    /// pairs to fix; `dropped_outputs` lists output indices to hide.
    pub fn new(
        inner: M,
        pinned: Vec<(usize, f64)>,
        dropped_outputs: &[usize],
    ) -> Result<Self, SolveError> {
        let n_in = inner.input_dimension();
        let n_out = inner.output_dimension();

        let mut pinned = pinned;
        pinned.sort_by_key(|&(index, _)| index);
        for pair in pinned.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(SolveError::configuration(format!(
                    "input index {} pinned more than once",
                    pair[0].0
                )));
            }
        }
        if let Some(&(index, _)) = pinned.iter().find(|&&(index, _)| index >= n_in) {
            return Err(SolveError::configuration(format!(
                "pinned input index {index} out of range for dimension {n_in}"
            )));
        }
        if let Some(&index) = dropped_outputs.iter().find(|&&index| index >= n_out) {
            return Err(SolveError::configuration(format!(
                "dropped output index {index} out of range for dimension {n_out}"
            )));
        }

        let retained_inputs: Vec<usize> = (0..n_in)
            .filter(|i| pinned.binary_search_by_key(i, |&(index, _)| index).is_err())
            .collect();
        let retained_outputs: Vec<usize> = (0..n_out)
            .filter(|i| !dropped_outputs.contains(i))
            .collect();

        let input_ids = retained_inputs
            .iter()
            .map(|&i| inner.input_ids()[i])
            .collect();
        let output_ids = retained_outputs
            .iter()
            .map(|&i| inner.output_ids()[i])
            .collect();

        Ok(Self {
            inner,
            pinned,
            retained_inputs,
            retained_outputs,
            input_ids,
            output_ids,
        })
    }

    /// Projects a full-space vector onto the retained coordinates.
    pub fn narrow(&self, full: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.retained_inputs.len(),
            self.retained_inputs.iter().map(|&i| full[i]),
        )
    }

    /// Reconstructs a full-space vector from retained coordinates, filling
    /// pinned positions with their configured constants.
    pub fn expand(&self, narrow: &DVector<f64>) -> DVector<f64> {
        let mut full = DVector::zeros(self.inner.input_dimension());
        for &(index, value) in &self.pinned {
            full[index] = value;
        }
        for (k, &i) in self.retained_inputs.iter().enumerate() {
            full[i] = narrow[k];
        }
        full
    }
}

impl<M: VectorMapping> VectorMapping for NarrowingMapping<M> {
    fn input_dimension(&self) -> usize {
        self.retained_inputs.len()
    }

    fn output_dimension(&self) -> usize {
        self.retained_outputs.len()
    }

    fn input_ids(&self) -> &[VarId] {
        &self.input_ids
    }

    fn output_ids(&self) -> &[VarId] {
        &self.output_ids
    }

    fn apply(&self, x: &DVector<f64>, out: &mut DVector<f64>) {
        let full_in = self.expand(x);
        let mut full_out = DVector::zeros(self.inner.output_dimension());
        self.inner.apply(&full_in, &mut full_out);
        for (k, &i) in self.retained_outputs.iter().enumerate() {
            out[k] = full_out[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NarrowingMapping;
    use crate::mapping::test_support::Shifted;
    use crate::mapping::{VarId, VectorMapping};
    use nalgebra::DVector;

    fn assert_err_contains<T>(result: Result<T, crate::error::SolveError>, needle: &str) {
        let err = result.err().expect("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn narrow_then_expand_round_trips_retained_coordinates() {
        let inner = Shifted::new(DVector::zeros(4));
        let narrowing = NarrowingMapping::new(inner, vec![(1, 7.5), (3, -2.0)], &[])
            .expect("narrowing should build");

        let full = DVector::from_vec(vec![10.0, 99.0, 30.0, 99.0]);
        let narrow = narrowing.narrow(&full);
        assert_eq!(narrow.as_slice(), &[10.0, 30.0]);

        let expanded = narrowing.expand(&narrow);
        assert_eq!(expanded.as_slice(), &[10.0, 7.5, 30.0, -2.0]);
    }

    #[test]
    fn narrowed_apply_sees_pinned_constants() {
        let inner = Shifted::new(DVector::from_vec(vec![1.0, 2.0, 3.0]));
        let narrowing =
            NarrowingMapping::new(inner, vec![(1, 5.0)], &[1]).expect("narrowing should build");

        assert_eq!(narrowing.input_dimension(), 2);
        assert_eq!(narrowing.output_dimension(), 2);
        assert_eq!(narrowing.input_ids(), &[VarId(0), VarId(2)]);

        let x = DVector::from_vec(vec![1.0, 3.0]);
        let mut out = DVector::zeros(2);
        narrowing.apply(&x, &mut out);
        // Retained outputs 0 and 2 of x - (1, 2, 3) with x1 pinned to 5.
        assert_eq!(out.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn rejects_duplicate_and_out_of_range_indices() {
        let inner = Shifted::new(DVector::zeros(2));
        assert_err_contains(
            NarrowingMapping::new(inner, vec![(0, 1.0), (0, 2.0)], &[]),
            "pinned more than once",
        );
        let inner = Shifted::new(DVector::zeros(2));
        assert_err_contains(
            NarrowingMapping::new(inner, vec![(5, 1.0)], &[]),
            "out of range",
        );
        let inner = Shifted::new(DVector::zeros(2));
        assert_err_contains(NarrowingMapping::new(inner, vec![], &[9]), "out of range");
    }
}
