//! External linear-solve service consumed by the descent-direction
//! strategies. Sparse factorization backends plug in behind the same trait;
//! the bundled default densifies and runs nalgebra's LU.

use nalgebra::{DMatrix, DVector};

use crate::error::SolveError;
use crate::jacobian::Jacobian;

pub trait LinearSolver {
    /// Solves `matrix * solution = rhs`.
    ///
    /// # Errors
    ///
    /// [`SolveError::SingularSystem`] when the matrix is not invertible.
    fn solve(&self, matrix: &Jacobian, rhs: &DVector<f64>) -> Result<DVector<f64>, SolveError>;
}

/// Dense LU factorization via nalgebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenseLu;

impl LinearSolver for DenseLu {
    fn solve(&self, matrix: &Jacobian, rhs: &DVector<f64>) -> Result<DVector<f64>, SolveError> {
        let dense: DMatrix<f64> = matrix.to_dense();
        dense
            .lu()
            .solve(rhs)
            .filter(|solution| solution.iter().all(|v| v.is_finite()))
            .ok_or(SolveError::SingularSystem)
    }
}
