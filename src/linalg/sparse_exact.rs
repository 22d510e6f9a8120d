//! Symmetric banded systems solved through faer's sparse Cholesky.
//!
//! The smoothing-spline normal equations are pentadiagonal, so only the diagonal and the
//! first `bandwidth` super-diagonals are stored; the factorization reads the upper triangle.

use super::faer_ndarray::{FaerLinalgError, array_to_mat, mat_to_array};
use faer::Side;
use faer::linalg::solvers::Solve;
use faer::sparse::linalg::solvers::Llt as SparseLlt;
use faer::sparse::{SparseColMat, Triplet};
use ndarray::{Array2, ArrayBase, Data, Ix2};

/// Upper band storage: `bands[[d, i]]` holds `A[i, i + d]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetricBandMatrix {
    bands: Array2<f64>,
}

impl SymmetricBandMatrix {
    pub fn zeros(n: usize, bandwidth: usize) -> Self {
        Self {
            bands: Array2::zeros((bandwidth + 1, n)),
        }
    }

    pub fn dim(&self) -> usize {
        self.bands.ncols()
    }

    pub fn bandwidth(&self) -> usize {
        self.bands.nrows() - 1
    }

    /// Adds `value` to `A[row, col]` (and implicitly to `A[col, row]`).
    ///
    /// # Panics
    /// If the entry lies outside the band.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let (lo, hi) = if row <= col { (row, col) } else { (col, row) };
        let offset = hi - lo;
        assert!(
            offset <= self.bandwidth(),
            "entry ({row}, {col}) lies outside bandwidth {}",
            self.bandwidth()
        );
        self.bands[[offset, lo]] += value;
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        let (lo, hi) = if row <= col { (row, col) } else { (col, row) };
        let offset = hi - lo;
        if offset > self.bandwidth() {
            0.0
        } else {
            self.bands[[offset, lo]]
        }
    }

    pub fn trace(&self) -> f64 {
        self.bands.row(0).sum()
    }

    /// `alpha * self + beta * other`, both with the same shape.
    pub fn combine(&self, alpha: f64, other: &Self, beta: f64) -> Self {
        debug_assert_eq!(self.bands.dim(), other.bands.dim());
        Self {
            bands: &self.bands * alpha + &other.bands * beta,
        }
    }

    fn to_sparse_upper(&self) -> Result<SparseColMat<usize, f64>, FaerLinalgError> {
        let n = self.dim();
        let mut triplets = Vec::with_capacity(self.bands.len());
        for ((offset, lo), &value) in self.bands.indexed_iter() {
            if lo + offset >= n {
                continue;
            }
            if !value.is_finite() {
                return Err(FaerLinalgError::NonFiniteSystem {
                    row: lo,
                    col: lo + offset,
                });
            }
            if offset == 0 || value != 0.0 {
                triplets.push(Triplet::new(lo, lo + offset, value));
            }
        }
        SparseColMat::try_new_from_triplets(n, n, &triplets)
            .map_err(|e| FaerLinalgError::SparseAssembly(format!("{e:?}")))
    }

    pub fn factorize(&self) -> Result<SparseSpdFactor, FaerLinalgError> {
        let n = self.dim();
        let sparse = self.to_sparse_upper()?;
        let factor = sparse
            .as_ref()
            .sp_cholesky(Side::Upper)
            .map_err(|_| FaerLinalgError::FactorizationFailed { dim: n })?;
        Ok(SparseSpdFactor { factor, n })
    }
}

pub struct SparseSpdFactor {
    factor: SparseLlt<usize, f64>,
    n: usize,
}

impl SparseSpdFactor {
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solves `A X = B` for every column of `rhs` at once.
    pub fn solve_multi<S: Data<Elem = f64>>(
        &self,
        rhs: &ArrayBase<S, Ix2>,
    ) -> Result<Array2<f64>, FaerLinalgError> {
        debug_assert_eq!(rhs.nrows(), self.n, "rhs rows must match system size");
        let rhs = array_to_mat(rhs);
        let solved = mat_to_array(self.factor.solve(rhs.as_ref()).as_ref());
        if solved.iter().any(|v| !v.is_finite()) {
            return Err(FaerLinalgError::NonFiniteSolution);
        }
        Ok(solved)
    }
}
