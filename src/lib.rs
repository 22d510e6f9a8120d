#![deny(dead_code)]
#![deny(unused_imports)]

pub mod grid;
pub mod linalg;
pub mod smooth;
mod tensor;
pub mod types;
pub mod univariate;
pub mod validation;

pub use grid::{ErrorKind, GridError, GridPPForm};
pub use linalg::faer_ndarray::FaerLinalgError;
pub use smooth::{NdGridSmoothingSpline, NdGridSmoothingSplineBuilder, smooth_grid};
pub use types::{GridFitOptions, SmoothSpec, SmoothingParameter};
pub use univariate::{
    CubicSmoother, PiecewisePolynomial, SplineError, UnivariateFit, UnivariateSmoother,
};
pub use validation::{AxisError, AxisInput, prepare_axes};
