//! Descent-direction strategies: turning (Jacobian, residual) into a step
//! vector through the external linear-solve service.

use nalgebra::DVector;

use crate::error::SolveError;
use crate::jacobian::Jacobian;
use crate::linear::LinearSolver;

pub trait DescentDirection {
    /// Computes the update direction at the current iterate.
    ///
    /// # Errors
    ///
    /// [`SolveError::SingularSystem`] when the linear-solve service cannot
    /// invert the system matrix; callers treat this as divergence.
    fn direction(
        &self,
        jacobian: &Jacobian,
        residual: &DVector<f64>,
        regularization: f64,
    ) -> Result<DVector<f64>, SolveError>;
}

/// Plain Newton direction: solve J d = -F. Ignores the regularization
/// parameter.
pub struct NewtonDirection {
    linear: Box<dyn LinearSolver>,
}

impl NewtonDirection {
    pub fn new(linear: Box<dyn LinearSolver>) -> Self {
        Self { linear }
    }
}

impl DescentDirection for NewtonDirection {
    fn direction(
        &self,
        jacobian: &Jacobian,
        residual: &DVector<f64>,
        _regularization: f64,
    ) -> Result<DVector<f64>, SolveError> {
        self.linear.solve(jacobian, &(-residual))
    }
}

/// Damped Newton direction: solve (J + lambda I) d = -F.
pub struct RegularizedDirection {
    linear: Box<dyn LinearSolver>,
}

impl RegularizedDirection {
    pub fn new(linear: Box<dyn LinearSolver>) -> Self {
        Self { linear }
    }
}

impl DescentDirection for RegularizedDirection {
    fn direction(
        &self,
        jacobian: &Jacobian,
        residual: &DVector<f64>,
        regularization: f64,
    ) -> Result<DVector<f64>, SolveError> {
        let mut damped = jacobian.to_dense();
        let n = damped.nrows().min(damped.ncols());
        for i in 0..n {
            damped[(i, i)] += regularization;
        }
        self.linear.solve(&Jacobian::Dense(damped), &(-residual))
    }
}

#[cfg(test)]
mod tests {
    use super::{DescentDirection, NewtonDirection, RegularizedDirection};
    use crate::jacobian::Jacobian;
    use crate::linear::DenseLu;
    use nalgebra::{DMatrix, DVector};

    #[test]
    fn newton_direction_points_at_the_root_of_a_linear_system() {
        let descent = NewtonDirection::new(Box::new(DenseLu));
        let jacobian = Jacobian::Dense(DMatrix::identity(2, 2));
        let residual = DVector::from_vec(vec![3.0, -4.0]);
        let d = descent
            .direction(&jacobian, &residual, 0.0)
            .expect("direction should compute");
        assert_eq!(d.as_slice(), &[-3.0, 4.0]);
    }

    #[test]
    fn regularization_shortens_the_step() {
        let jacobian = Jacobian::Dense(DMatrix::identity(2, 2));
        let residual = DVector::from_vec(vec![2.0, 2.0]);

        let damped = RegularizedDirection::new(Box::new(DenseLu));
        let d = damped
            .direction(&jacobian, &residual, 1.0)
            .expect("direction should compute");
        // (I + I) d = -F  =>  d = -F / 2
        assert_eq!(d.as_slice(), &[-1.0, -1.0]);
    }

    #[test]
    fn singular_jacobian_surfaces_as_singular_system() {
        let descent = NewtonDirection::new(Box::new(DenseLu));
        let jacobian = Jacobian::Dense(DMatrix::zeros(2, 2));
        let residual = DVector::from_vec(vec![1.0, 1.0]);
        let err = descent
            .direction(&jacobian, &residual, 0.0)
            .err()
            .expect("expected error");
        assert!(matches!(err, crate::error::SolveError::SingularSystem));
    }

    #[test]
    fn regularization_rescues_a_singular_jacobian() {
        let damped = RegularizedDirection::new(Box::new(DenseLu));
        let jacobian = Jacobian::Dense(DMatrix::zeros(2, 2));
        let residual = DVector::from_vec(vec![1.0, 1.0]);
        let d = damped
            .direction(&jacobian, &residual, 0.5)
            .expect("direction should compute");
        assert_eq!(d.as_slice(), &[-2.0, -2.0]);
    }
}
