//! Smoothing splines on N-D rectilinear grids.
//!
//! The fit is separable: a 1-D smoothing spline is fitted along every axis in turn, each
//! pass acting on the coefficients produced by the previous one. The result is a
//! tensor-product [`GridPPForm`].

use crate::grid::{GridError, GridPPForm};
use crate::tensor::separable_sweep;
use crate::types::{GridFitOptions, SmoothSpec, SmoothingParameter};
use crate::univariate::{CubicSmoother, UnivariateSmoother};
use crate::validation::{AxisInput, grid_shape, owned_standard, prepare_axes, prepare_axis};
use ndarray::{Array1, ArrayD, ArrayView, ArrayViewD, Dimension};

/// A fitted N-D grid smoothing spline.
#[derive(Debug, Clone, PartialEq)]
pub struct NdGridSmoothingSpline {
    spline: GridPPForm,
    smooth: Vec<f64>,
    options: GridFitOptions,
}

impl NdGridSmoothingSpline {
    /// Starts a fit of `ydata` sampled on the grid spanned by `xdata`.
    ///
    /// Nothing is validated until [`NdGridSmoothingSplineBuilder::fit`] is called.
    pub fn builder<'a, X: AxisInput, D: Dimension>(
        xdata: &'a [X],
        ydata: ArrayView<'a, f64, D>,
    ) -> NdGridSmoothingSplineBuilder<'a> {
        NdGridSmoothingSplineBuilder {
            xdata: xdata.iter().map(AxisInput::axis_view).collect(),
            ydata: ydata.into_dyn(),
            weights: None,
            smooth: SmoothSpec::Auto,
            options: GridFitOptions::default(),
        }
    }

    pub fn spline(&self) -> &GridPPForm {
        &self.spline
    }

    /// Smoothing parameter used on each axis, in axis order.
    pub fn smooth(&self) -> &[f64] {
        &self.smooth
    }

    pub fn ndim(&self) -> usize {
        self.spline.ndim()
    }

    pub fn evaluate<A: AxisInput>(&self, xi: &[A]) -> Result<ArrayD<f64>, GridError> {
        self.spline.evaluate_with(xi, &self.options)
    }

    pub fn into_parts(self) -> (GridPPForm, Vec<f64>) {
        (self.spline, self.smooth)
    }
}

pub struct NdGridSmoothingSplineBuilder<'a> {
    xdata: Vec<ArrayViewD<'a, f64>>,
    ydata: ArrayViewD<'a, f64>,
    weights: Option<Vec<Option<ArrayViewD<'a, f64>>>>,
    smooth: SmoothSpec,
    options: GridFitOptions,
}

impl<'a> NdGridSmoothingSplineBuilder<'a> {
    /// One weight vector per axis.
    pub fn weights<W: AxisInput>(mut self, weights: &'a [W]) -> Self {
        self.weights = Some(weights.iter().map(|w| Some(w.axis_view())).collect());
        self
    }

    /// Per-axis weights where `None` means unit weights on that axis.
    pub fn axis_weights<W: AxisInput>(mut self, weights: &'a [Option<W>]) -> Self {
        self.weights = Some(
            weights
                .iter()
                .map(|w| w.as_ref().map(AxisInput::axis_view))
                .collect(),
        );
        self
    }

    pub fn smooth(mut self, smooth: impl Into<SmoothSpec>) -> Self {
        self.smooth = smooth.into();
        self
    }

    pub fn options(mut self, options: GridFitOptions) -> Self {
        self.options = options;
        self
    }

    /// Fits with the natural cubic [`CubicSmoother`] on every axis.
    pub fn fit(self) -> Result<NdGridSmoothingSpline, GridError> {
        self.fit_with(&CubicSmoother)
    }

    pub fn fit_with<S: UnivariateSmoother + ?Sized>(
        self,
        smoother: &S,
    ) -> Result<NdGridSmoothingSpline, GridError> {
        let options = self.options.clone();
        let PreparedGrid {
            xdata,
            ydata,
            weights,
            smooth,
        } = self.prepare()?;

        let ndim = xdata.len();
        let mut resolved = vec![0.0; ndim];
        let coeffs = separable_sweep(ydata, |axis, rows| {
            let fitted = smoother
                .fit(
                    xdata[axis].view(),
                    rows,
                    weights[axis].as_ref().map(|w| w.view()),
                    smooth[axis],
                )
                .map_err(|source| GridError::Solver { axis, source })?;
            if fitted.spline.rows() != rows.nrows() {
                return Err(GridError::InvalidForm(format!(
                    "smoother returned {} coefficient rows for {} data rows on axis {axis}",
                    fitted.spline.rows(),
                    rows.nrows()
                )));
            }
            if *fitted.spline.breaks() != xdata[axis] {
                return Err(GridError::InvalidForm(format!(
                    "smoother returned {} pieces on axis {axis}, expected breaks at its {} sites",
                    fitted.spline.pieces(),
                    xdata[axis].len()
                )));
            }
            log::debug!(
                "axis {axis}: fitted {} rows, {} pieces of order {}, smooth = {:.6e}",
                rows.nrows(),
                fitted.spline.pieces(),
                fitted.spline.order(),
                fitted.smooth
            );
            resolved[axis] = fitted.smooth;
            Ok(fitted.spline.into_coeffs())
        })?;

        Ok(NdGridSmoothingSpline {
            spline: GridPPForm::new(xdata, coeffs)?,
            smooth: resolved,
            options,
        })
    }

    fn prepare(self) -> Result<PreparedGrid, GridError> {
        let xdata = prepare_axes(&self.xdata, "xdata")?;
        let ndim = xdata.len();

        if self.ydata.ndim() != ndim {
            return Err(GridError::DimensionMismatch {
                expected: ndim,
                found: self.ydata.ndim(),
            });
        }
        let shape = grid_shape(&xdata);
        for (axis, (&found, &expected)) in self.ydata.shape().iter().zip(&shape).enumerate() {
            if found != expected {
                return Err(GridError::DataShapeMismatch {
                    axis,
                    expected,
                    found,
                });
            }
        }

        let weights = match self.weights {
            None => vec![None; ndim],
            Some(weights) => {
                if weights.len() != ndim {
                    return Err(GridError::AxisCountMismatch {
                        label: "weights",
                        expected: ndim,
                        found: weights.len(),
                    });
                }
                let mut prepared = Vec::with_capacity(ndim);
                for (axis, w) in weights.into_iter().enumerate() {
                    let Some(w) = w else {
                        prepared.push(None);
                        continue;
                    };
                    let w = prepare_axis(w, "weights", axis)?;
                    if w.len() != shape[axis] {
                        return Err(GridError::WeightsShapeMismatch {
                            axis,
                            expected: shape[axis],
                            found: w.len(),
                        });
                    }
                    prepared.push(Some(w));
                }
                prepared
            }
        };

        let smooth = self
            .smooth
            .resolve(ndim)
            .map_err(|found| GridError::SmoothCountMismatch {
                expected: ndim,
                found,
            })?;
        for (axis, value) in smooth.iter().enumerate() {
            if let Some(p) = value.fixed()
                && !(0.0..=1.0).contains(&p)
            {
                return Err(GridError::SmoothOutOfRange { axis, value: p });
            }
        }

        Ok(PreparedGrid {
            xdata,
            ydata: owned_standard(self.ydata),
            weights,
            smooth,
        })
    }
}

struct PreparedGrid {
    xdata: Vec<Array1<f64>>,
    ydata: ArrayD<f64>,
    weights: Vec<Option<Array1<f64>>>,
    smooth: Vec<SmoothingParameter>,
}

/// Fits a grid smoothing spline and evaluates it on `xi` in one call.
///
/// Returns the values on the `xi` grid and the smoothing parameter used on each axis.
pub fn smooth_grid<'a, X: AxisInput, Q: AxisInput, D: Dimension>(
    xdata: &'a [X],
    ydata: ArrayView<'a, f64, D>,
    xi: &[Q],
    smooth: impl Into<SmoothSpec>,
) -> Result<(ArrayD<f64>, Vec<f64>), GridError> {
    let fitted = NdGridSmoothingSpline::builder(xdata, ydata)
        .smooth(smooth)
        .fit()?;
    let values = fitted.evaluate(xi)?;
    let (_, smooth) = fitted.into_parts();
    Ok((values, smooth))
}
