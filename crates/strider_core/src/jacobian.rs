//! Jacobian supply: finite-difference computation, periodic caching, and
//! magnitude-based trimming to a sparse representation.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::error::SolveError;
use crate::mapping::VectorMapping;

/// Local linearization of a mapping at one state point. Scoped to one
/// refresh cycle and consumed by the descent-direction computation.
#[derive(Debug, Clone)]
pub enum Jacobian {
    Dense(DMatrix<f64>),
    Sparse(CscMatrix<f64>),
}

impl Jacobian {
    pub fn nrows(&self) -> usize {
        match self {
            Jacobian::Dense(m) => m.nrows(),
            Jacobian::Sparse(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Jacobian::Dense(m) => m.ncols(),
            Jacobian::Sparse(m) => m.ncols(),
        }
    }

    /// Dense copy; sparse storage is expanded.
    pub fn to_dense(&self) -> DMatrix<f64> {
        match self {
            Jacobian::Dense(m) => m.clone(),
            Jacobian::Sparse(m) => nalgebra_sparse::convert::serial::convert_csc_dense(m),
        }
    }
}

/// Supplies the Jacobian of a mapping at a point. Whether the matrix is
/// recomputed on every request or reused across requests is a performance
/// policy of the provider, not a correctness requirement; refresh events
/// are observable through [`refresh_count`](JacobianProvider::refresh_count).
pub trait JacobianProvider {
    fn jacobian(
        &mut self,
        mapping: &dyn VectorMapping,
        x: &DVector<f64>,
    ) -> Result<Jacobian, SolveError>;

    /// Discards any cached matrix; the next request recomputes.
    fn invalidate(&mut self);

    /// Number of actual recomputations performed so far.
    fn refresh_count(&self) -> usize;
}

/// Forward-difference Jacobian, recomputed on every request.
pub struct FiniteDifferenceJacobian {
    refreshes: usize,
}

impl FiniteDifferenceJacobian {
    pub fn new() -> Self {
        Self { refreshes: 0 }
    }
}

impl Default for FiniteDifferenceJacobian {
    fn default() -> Self {
        Self::new()
    }
}

impl JacobianProvider for FiniteDifferenceJacobian {
    fn jacobian(
        &mut self,
        mapping: &dyn VectorMapping,
        x: &DVector<f64>,
    ) -> Result<Jacobian, SolveError> {
        let n_in = mapping.input_dimension();
        let n_out = mapping.output_dimension();

        let mut base = DVector::zeros(n_out);
        mapping.apply(x, &mut base);

        let mut perturbed_x = x.clone();
        let mut perturbed = DVector::zeros(n_out);
        let mut matrix = DMatrix::zeros(n_out, n_in);
        let sqrt_eps = f64::EPSILON.sqrt();

        for j in 0..n_in {
            let h = sqrt_eps * x[j].abs().max(1.0);
            perturbed_x[j] = x[j] + h;
            mapping.apply(&perturbed_x, &mut perturbed);
            for i in 0..n_out {
                matrix[(i, j)] = (perturbed[i] - base[i]) / h;
            }
            perturbed_x[j] = x[j];
        }

        self.refreshes += 1;
        Ok(Jacobian::Dense(matrix))
    }

    fn invalidate(&mut self) {}

    fn refresh_count(&self) -> usize {
        self.refreshes
    }
}

/// Wraps a provider, reusing its last matrix for a fixed number of requests
/// before refreshing.
pub struct CachedJacobian<P> {
    inner: P,
    refresh_interval: usize,
    requests_since_refresh: usize,
    cached: Option<Jacobian>,
}

impl<P: JacobianProvider> CachedJacobian<P> {
    pub fn new(inner: P, refresh_interval: usize) -> Result<Self, SolveError> {
        if refresh_interval == 0 {
            return Err(SolveError::configuration(
                "jacobian refresh interval must be at least 1",
            ));
        }
        Ok(Self {
            inner,
            refresh_interval,
            requests_since_refresh: 0,
            cached: None,
        })
    }
}

impl<P: JacobianProvider> JacobianProvider for CachedJacobian<P> {
    fn jacobian(
        &mut self,
        mapping: &dyn VectorMapping,
        x: &DVector<f64>,
    ) -> Result<Jacobian, SolveError> {
        let stale = self.requests_since_refresh >= self.refresh_interval;
        let current = match self.cached.take() {
            Some(jacobian) if !stale => jacobian,
            _ => {
                let fresh = self.inner.jacobian(mapping, x)?;
                self.requests_since_refresh = 0;
                fresh
            }
        };
        self.requests_since_refresh += 1;
        let out = current.clone();
        self.cached = Some(current);
        Ok(out)
    }

    fn invalidate(&mut self) {
        self.cached = None;
        self.requests_since_refresh = 0;
        self.inner.invalidate();
    }

    fn refresh_count(&self) -> usize {
        self.inner.refresh_count()
    }
}

/// Drops Jacobian entries below a magnitude threshold, producing a sparse
/// matrix of identical dimensions. Trades accuracy for factorization speed.
#[derive(Debug, Clone, Copy)]
pub struct JacobianTrimmer {
    threshold: f64,
}

impl JacobianTrimmer {
    pub fn new(threshold: f64) -> Result<Self, SolveError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(SolveError::configuration(format!(
                "trim threshold must be finite and non-negative, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn trim(&self, jacobian: &Jacobian) -> Jacobian {
        let dense = jacobian.to_dense();
        let mut coo = CooMatrix::new(dense.nrows(), dense.ncols());
        for j in 0..dense.ncols() {
            for i in 0..dense.nrows() {
                let value = dense[(i, j)];
                if value.abs() >= self.threshold && value != 0.0 {
                    coo.push(i, j, value);
                }
            }
        }
        Jacobian::Sparse(CscMatrix::from(&coo))
    }
}
