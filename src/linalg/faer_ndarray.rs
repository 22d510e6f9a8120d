use faer::{Mat, MatRef};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FaerLinalgError {
    #[error("Cholesky factorization of the {dim}x{dim} system failed; matrix is not positive definite")]
    FactorizationFailed { dim: usize },
    #[error("System matrix contains a non-finite entry at ({row}, {col})")]
    NonFiniteSystem { row: usize, col: usize },
    #[error("Solve produced non-finite values; the system is numerically singular")]
    NonFiniteSolution,
    #[error("Failed to assemble sparse system: {0}")]
    SparseAssembly(String),
}

/// Owned faer copy of an ndarray matrix with any strides, negative ones included.
pub(crate) fn array_to_mat<S: Data<Elem = f64>>(array: &ArrayBase<S, Ix2>) -> Mat<f64> {
    Mat::from_fn(array.nrows(), array.ncols(), |i, j| array[[i, j]])
}

pub(crate) fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((mat.nrows(), mat.ncols()), |(i, j)| mat[(i, j)])
}
