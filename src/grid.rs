//! Tensor-product piecewise polynomials on rectilinear grids.

use crate::tensor::separable_sweep;
use crate::types::GridFitOptions;
use crate::univariate::{SplineError, evaluate_piecewise};
use crate::validation::{AxisError, AxisInput, prepare_axes};
use ndarray::{Array1, ArrayD, ShapeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of [`GridError`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Sequence, dimension-count or per-axis length mismatches between inputs.
    InputShape,
    /// An axis vector that is too short, not finite, or not a vector.
    DegenerateAxis,
    /// The 1-D solver failed on some axis.
    Solver,
}

#[derive(Error, Debug)]
pub enum GridError {
    #[error(transparent)]
    Axis(#[from] AxisError),

    #[error("ydata must have dimension {expected} according to xdata, but has {found}.")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("ydata ({found}) and xdata ({expected}) dimension size mismatch on axis {axis}.")]
    DataShapeMismatch {
        axis: usize,
        expected: usize,
        found: usize,
    },

    #[error("{label} ({found}) and xdata ({expected}) dimensions mismatch.")]
    AxisCountMismatch {
        label: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("weights ({found}) and xdata ({expected}) dimension size mismatch on axis {axis}.")]
    WeightsShapeMismatch {
        axis: usize,
        expected: usize,
        found: usize,
    },

    #[error(
        "Number of smoothing parameter values ({found}) must be equal to the number of dimensions ({expected})."
    )]
    SmoothCountMismatch { expected: usize, found: usize },

    #[error("Smoothing parameter for axis {axis} must be in range [0, 1], but was {value}.")]
    SmoothOutOfRange { axis: usize, value: f64 },

    #[error("Invalid grid form: {0}")]
    InvalidForm(String),

    #[error("Tensor layout error: {0}")]
    Layout(#[from] ShapeError),

    #[error("Smoothing spline fit failed on axis {axis}: {source}")]
    Solver {
        axis: usize,
        #[source]
        source: SplineError,
    },
}

impl GridError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GridError::Axis(AxisError::NotASequence { .. }) => ErrorKind::InputShape,
            GridError::Axis(_) => ErrorKind::DegenerateAxis,
            GridError::Solver { .. } => ErrorKind::Solver,
            GridError::DimensionMismatch { .. }
            | GridError::DataShapeMismatch { .. }
            | GridError::AxisCountMismatch { .. }
            | GridError::WeightsShapeMismatch { .. }
            | GridError::SmoothCountMismatch { .. }
            | GridError::SmoothOutOfRange { .. }
            | GridError::InvalidForm(_)
            | GridError::Layout(_) => ErrorKind::InputShape,
        }
    }
}

/// Serialized shape of a [`GridPPForm`]; derived fields are recomputed on load.
#[derive(Serialize, Deserialize)]
struct RawGridPPForm {
    breaks: Vec<Array1<f64>>,
    coeffs: ArrayD<f64>,
}

/// N-D grid spline in PP-form.
///
/// `coeffs` has one axis per grid axis. Along axis `k` it holds `pieces[k] * order[k]`
/// entries laid out like [`crate::PiecewisePolynomial`] coefficients: index
/// `i * pieces[k] + j` is the coefficient of power `order[k] - 1 - i` on piece `j`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGridPPForm", into = "RawGridPPForm")]
pub struct GridPPForm {
    breaks: Vec<Array1<f64>>,
    coeffs: ArrayD<f64>,
    pieces: Vec<usize>,
    order: Vec<usize>,
}

impl GridPPForm {
    pub fn new(breaks: Vec<Array1<f64>>, coeffs: ArrayD<f64>) -> Result<Self, GridError> {
        if breaks.is_empty() {
            return Err(GridError::InvalidForm("at least one axis is required".into()));
        }
        if coeffs.ndim() != breaks.len() {
            return Err(GridError::InvalidForm(format!(
                "coefficients have {} dimensions but there are {} break vectors",
                coeffs.ndim(),
                breaks.len()
            )));
        }

        let mut pieces = Vec::with_capacity(breaks.len());
        let mut order = Vec::with_capacity(breaks.len());
        for (axis, (b, &width)) in breaks.iter().zip(coeffs.shape()).enumerate() {
            if b.len() < 2 {
                return Err(GridError::InvalidForm(format!(
                    "axis {axis} needs at least 2 breaks, got {}",
                    b.len()
                )));
            }
            if b.iter().any(|v| !v.is_finite()) || b.windows(2).into_iter().any(|w| w[1] <= w[0]) {
                return Err(GridError::InvalidForm(format!(
                    "breaks on axis {axis} must be finite and strictly increasing"
                )));
            }
            let p = b.len() - 1;
            if width == 0 || width % p != 0 {
                return Err(GridError::InvalidForm(format!(
                    "axis {axis} has {width} coefficients, not a positive multiple of {p} pieces"
                )));
            }
            pieces.push(p);
            order.push(width / p);
        }

        Ok(Self {
            breaks,
            coeffs: if coeffs.is_standard_layout() {
                coeffs
            } else {
                coeffs.as_standard_layout().into_owned()
            },
            pieces,
            order,
        })
    }

    pub fn breaks(&self) -> &[Array1<f64>] {
        &self.breaks
    }

    pub fn coeffs(&self) -> &ArrayD<f64> {
        &self.coeffs
    }

    pub fn pieces(&self) -> &[usize] {
        &self.pieces
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn ndim(&self) -> usize {
        self.breaks.len()
    }

    /// Evaluates the spline on the grid spanned by `xi`.
    ///
    /// The result has shape `(xi[0].len(), ..., xi[ndim - 1].len())`.
    pub fn evaluate<A: AxisInput>(&self, xi: &[A]) -> Result<ArrayD<f64>, GridError> {
        self.evaluate_with(xi, &GridFitOptions::default())
    }

    pub fn evaluate_with<A: AxisInput>(
        &self,
        xi: &[A],
        options: &GridFitOptions,
    ) -> Result<ArrayD<f64>, GridError> {
        let xi = prepare_axes(xi, "xi")?;
        if xi.len() != self.ndim() {
            return Err(GridError::AxisCountMismatch {
                label: "xi",
                expected: self.ndim(),
                found: xi.len(),
            });
        }
        self.evaluate_prepared(&xi, options)
    }

    pub(crate) fn evaluate_prepared(
        &self,
        xi: &[Array1<f64>],
        options: &GridFitOptions,
    ) -> Result<ArrayD<f64>, GridError> {
        separable_sweep(self.coeffs.clone(), |axis, rows| {
            log::debug!(
                "evaluating axis {axis}: {} rows at {} points",
                rows.nrows(),
                xi[axis].len()
            );
            Ok(evaluate_piecewise(
                self.breaks[axis].view(),
                rows,
                self.order[axis],
                xi[axis].view(),
                options.parallel_row_threshold,
            ))
        })
    }
}

impl TryFrom<RawGridPPForm> for GridPPForm {
    type Error = GridError;

    fn try_from(raw: RawGridPPForm) -> Result<Self, Self::Error> {
        GridPPForm::new(raw.breaks, raw.coeffs)
    }
}

impl From<GridPPForm> for RawGridPPForm {
    fn from(form: GridPPForm) -> Self {
        RawGridPPForm {
            breaks: form.breaks,
            coeffs: form.coeffs,
        }
    }
}
