//! Single-axis cubic smoothing splines.
//!
//! The grid engine only talks to this module through [`UnivariateSmoother`] and
//! [`PiecewisePolynomial`]. [`CubicSmoother`] is the default solver: it minimizes
//!
//! ```text
//! p * sum_i w_i (y_i - f(x_i))^2 + (1 - p) * integral f''(t)^2 dt
//! ```
//!
//! for every row of the value matrix at once, sharing the sites, weights and `p`.

use crate::linalg::faer_ndarray::FaerLinalgError;
use crate::linalg::sparse_exact::SymmetricBandMatrix;
use crate::types::{SmoothingParameter, default_parallel_row_threshold};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Zip, s};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CUBIC_ORDER: usize = 4;
const LINEAR_ORDER: usize = 2;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplineError {
    #[error("At least 2 data sites are required, but {found} were provided.")]
    TooFewSites { found: usize },

    #[error("Values must have {expected} columns to match the data sites, but have {found}.")]
    ValuesShapeMismatch { expected: usize, found: usize },

    #[error("Weights must have {expected} entries to match the data sites, but have {found}.")]
    WeightsShapeMismatch { expected: usize, found: usize },

    #[error("Data site {index} is not finite.")]
    NonFiniteSite { index: usize },

    #[error("Data sites must be strictly increasing, but site {index} is not above its predecessor.")]
    SitesNotIncreasing { index: usize },

    #[error("Weight {index} must be finite and positive, but was {value}.")]
    InvalidWeight { index: usize, value: f64 },

    #[error("Smoothing parameter must be in range [0, 1], but was {0}.")]
    SmoothOutOfRange(f64),

    #[error("Invalid piecewise polynomial: {0}")]
    InvalidForm(String),

    #[error("Linear system for the smoothing spline could not be solved: {0}")]
    Linalg(#[from] FaerLinalgError),
}

/// Piecewise polynomial in PP-form for a batch of curves sharing one set of breaks.
///
/// `coeffs` has one row per curve and `pieces * order` columns. Column `k * pieces + j`
/// holds the coefficient of `(x - breaks[j])^(order - 1 - k)` on piece `j`, highest power
/// first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewisePolynomial {
    breaks: Array1<f64>,
    coeffs: Array2<f64>,
    pieces: usize,
    order: usize,
}

impl PiecewisePolynomial {
    pub fn new(breaks: Array1<f64>, coeffs: Array2<f64>) -> Result<Self, SplineError> {
        if breaks.len() < 2 {
            return Err(SplineError::InvalidForm(format!(
                "need at least 2 breaks, got {}",
                breaks.len()
            )));
        }
        let pieces = breaks.len() - 1;
        let width = coeffs.ncols();
        if width == 0 || width % pieces != 0 {
            return Err(SplineError::InvalidForm(format!(
                "coefficient width {width} is not a positive multiple of {pieces} pieces"
            )));
        }
        Ok(Self {
            breaks,
            coeffs,
            pieces,
            order: width / pieces,
        })
    }

    pub fn breaks(&self) -> &Array1<f64> {
        &self.breaks
    }

    pub fn coeffs(&self) -> &Array2<f64> {
        &self.coeffs
    }

    pub fn pieces(&self) -> usize {
        self.pieces
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of curves stored in the form.
    pub fn rows(&self) -> usize {
        self.coeffs.nrows()
    }

    pub fn into_coeffs(self) -> Array2<f64> {
        self.coeffs
    }

    /// Evaluates every curve at `query`, returning a `rows x query.len()` matrix.
    pub fn evaluate(&self, query: ArrayView1<'_, f64>) -> Array2<f64> {
        evaluate_piecewise(
            self.breaks.view(),
            self.coeffs.view(),
            self.order,
            query,
            default_parallel_row_threshold(),
        )
    }
}

/// Index of the piece containing `x`: the number of interior breaks `<= x`.
///
/// Points outside the breaks fall into the first or last piece, so the end polynomials
/// extrapolate.
#[inline]
fn locate_piece(breaks: &[f64], x: f64) -> usize {
    let pieces = breaks.len() - 1;
    breaks[1..pieces].partition_point(|&b| b <= x)
}

/// Horner evaluation of PP-form rows at shared query points.
pub(crate) fn evaluate_piecewise(
    breaks: ArrayView1<'_, f64>,
    coeffs: ArrayView2<'_, f64>,
    order: usize,
    query: ArrayView1<'_, f64>,
    parallel_row_threshold: usize,
) -> Array2<f64> {
    let knots = breaks.to_vec();
    let pieces = knots.len() - 1;
    debug_assert_eq!(coeffs.ncols(), pieces * order);

    let located: Vec<(usize, f64)> = query
        .iter()
        .map(|&x| {
            let piece = locate_piece(&knots, x);
            (piece, x - knots[piece])
        })
        .collect();

    let eval_row = |mut out_row: ArrayViewMut1<'_, f64>, coeff_row: ArrayView1<'_, f64>| {
        for (value, &(piece, local)) in out_row.iter_mut().zip(&located) {
            let mut acc = coeff_row[piece];
            for k in 1..order {
                acc = acc * local + coeff_row[k * pieces + piece];
            }
            *value = acc;
        }
    };

    let mut out = Array2::<f64>::zeros((coeffs.nrows(), query.len()));
    let zip = Zip::from(out.rows_mut()).and(coeffs.rows());
    if coeffs.nrows() >= parallel_row_threshold {
        zip.par_for_each(|out_row, coeff_row| eval_row(out_row, coeff_row));
    } else {
        zip.for_each(|out_row, coeff_row| eval_row(out_row, coeff_row));
    }
    out
}

/// Result of a single-axis fit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnivariateFit {
    pub spline: PiecewisePolynomial,
    /// Smoothing parameter actually used.
    pub smooth: f64,
}

/// Fits one smoothing spline per row of `values`, all sharing `sites`.
///
/// Implementations must be free of hidden state: the grid engine calls `fit` once per axis
/// and relies on repeated calls with equal inputs giving equal outputs.
pub trait UnivariateSmoother {
    fn fit(
        &self,
        sites: ArrayView1<'_, f64>,
        values: ArrayView2<'_, f64>,
        weights: Option<ArrayView1<'_, f64>>,
        smooth: SmoothingParameter,
    ) -> Result<UnivariateFit, SplineError>;
}

/// Natural cubic smoothing spline (Reinsch form).
#[derive(Debug, Clone, Copy, Default)]
pub struct CubicSmoother;

impl UnivariateSmoother for CubicSmoother {
    fn fit(
        &self,
        sites: ArrayView1<'_, f64>,
        values: ArrayView2<'_, f64>,
        weights: Option<ArrayView1<'_, f64>>,
        smooth: SmoothingParameter,
    ) -> Result<UnivariateFit, SplineError> {
        let weights = validate_fit_inputs(sites, values, weights, smooth)?;
        let dx = diff(sites);

        if sites.len() == 2 {
            if let Some(p) = smooth.fixed()
                && p < 1.0
            {
                log::warn!(
                    "Two-point axis is always interpolated; requested smoothing {p} is replaced by 1.0"
                );
            }
            return Ok(UnivariateFit {
                spline: fit_line(sites, values, dx[0])?,
                smooth: 1.0,
            });
        }

        fit_cubic(sites, values, &weights, &dx, smooth)
    }
}

fn validate_fit_inputs(
    sites: ArrayView1<'_, f64>,
    values: ArrayView2<'_, f64>,
    weights: Option<ArrayView1<'_, f64>>,
    smooth: SmoothingParameter,
) -> Result<Array1<f64>, SplineError> {
    let n = sites.len();
    if n < 2 {
        return Err(SplineError::TooFewSites { found: n });
    }
    if values.ncols() != n {
        return Err(SplineError::ValuesShapeMismatch {
            expected: n,
            found: values.ncols(),
        });
    }
    if let Some(index) = sites.iter().position(|x| !x.is_finite()) {
        return Err(SplineError::NonFiniteSite { index });
    }
    if let Some(index) = (1..n).find(|&i| sites[i] <= sites[i - 1]) {
        return Err(SplineError::SitesNotIncreasing { index });
    }

    let weights = match weights {
        Some(w) if w.len() != n => {
            return Err(SplineError::WeightsShapeMismatch {
                expected: n,
                found: w.len(),
            });
        }
        Some(w) => w.to_owned(),
        None => Array1::ones(n),
    };
    if let Some((index, &value)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w <= 0.0)
    {
        return Err(SplineError::InvalidWeight { index, value });
    }

    if let Some(p) = smooth.fixed()
        && !(0.0..=1.0).contains(&p)
    {
        return Err(SplineError::SmoothOutOfRange(p));
    }
    Ok(weights)
}

fn diff(x: ArrayView1<'_, f64>) -> Array1<f64> {
    &x.slice(s![1..]) - &x.slice(s![..-1])
}

/// Differences between consecutive rows.
fn diff_rows(a: &Array2<f64>) -> Array2<f64> {
    &a.slice(s![1.., ..]) - &a.slice(s![..-1, ..])
}

/// Copy of `a` with a zero row above and below.
fn pad_rows(a: &Array2<f64>) -> Array2<f64> {
    let mut padded = Array2::<f64>::zeros((a.nrows() + 2, a.ncols()));
    padded.slice_mut(s![1..-1, ..]).assign(a);
    padded
}

fn fit_line(
    sites: ArrayView1<'_, f64>,
    values: ArrayView2<'_, f64>,
    dx: f64,
) -> Result<PiecewisePolynomial, SplineError> {
    let mut coeffs = Array2::<f64>::zeros((values.nrows(), LINEAR_ORDER));
    let slope = (&values.column(1) - &values.column(0)) / dx;
    coeffs.column_mut(0).assign(&slope);
    coeffs.column_mut(1).assign(&values.column(0));
    PiecewisePolynomial::new(sites.to_owned(), coeffs)
}

/// Entries of row `i` of `Q^T`, the second divided-difference operator, at columns
/// `i, i + 1, i + 2`.
#[inline]
fn qt_row(dx: &Array1<f64>, i: usize) -> [f64; 3] {
    let left = 1.0 / dx[i];
    let right = 1.0 / dx[i + 1];
    [left, -(left + right), right]
}

fn fit_cubic(
    sites: ArrayView1<'_, f64>,
    values: ArrayView2<'_, f64>,
    weights: &Array1<f64>,
    dx: &Array1<f64>,
    smooth: SmoothingParameter,
) -> Result<UnivariateFit, SplineError> {
    let n = sites.len();
    let inner = n - 2;
    let pieces = n - 1;
    let inv_w = weights.mapv(f64::recip);

    let mut r = SymmetricBandMatrix::zeros(inner, 2);
    let mut qtwq = SymmetricBandMatrix::zeros(inner, 2);
    for i in 0..inner {
        r.add(i, i, 2.0 * (dx[i] + dx[i + 1]));
        if i + 1 < inner {
            r.add(i, i + 1, dx[i + 1]);
        }
        let qi = qt_row(dx, i);
        for j in i..(i + 3).min(inner) {
            let qj = qt_row(dx, j);
            let mut acc = 0.0;
            for (a, &qa) in qi.iter().enumerate() {
                let col = i + a;
                if col >= j && col - j < 3 {
                    acc += qa * qj[col - j] * inv_w[col];
                }
            }
            qtwq.add(i, j, acc);
        }
    }

    let p = match smooth {
        SmoothingParameter::Fixed(p) => p,
        SmoothingParameter::Auto => {
            let p = 1.0 / (1.0 + r.trace() / (6.0 * qtwq.trace()));
            log::debug!("auto smoothing resolved to {p:.6e} for {n} sites");
            p
        }
    };

    let system = qtwq.combine(6.0 * (1.0 - p), &r, p);
    // values are rows x sites; the solver works column-wise, one column per curve.
    let y = values.t();
    let dydx = diff_rows(&y.to_owned()) / &dx.view().insert_axis(Axis(1));
    let second_diff = diff_rows(&dydx);
    let u = system.factorize()?.solve_multi(&second_diff)?;

    let dx_col = dx.view().insert_axis(Axis(1));
    let u_padded = pad_rows(&u);
    let d1 = diff_rows(&u_padded) / &dx_col;
    let d2 = diff_rows(&pad_rows(&d1));
    let yi = &y - &(d2 * &inv_w.view().insert_axis(Axis(1)) * (6.0 * (1.0 - p)));
    let c3 = u_padded * p;
    let c2 = diff_rows(&yi) / &dx_col
        - &(&dx_col * &(&c3.slice(s![..-1, ..]) * 2.0 + &c3.slice(s![1.., ..])));

    let blocks = [
        diff_rows(&c3) / &dx_col,
        &c3.slice(s![..-1, ..]) * 3.0,
        c2,
        yi.slice(s![..-1, ..]).to_owned(),
    ];
    let mut coeffs = Array2::<f64>::zeros((values.nrows(), CUBIC_ORDER * pieces));
    for (k, block) in blocks.iter().enumerate() {
        coeffs
            .slice_mut(s![.., k * pieces..(k + 1) * pieces])
            .assign(&block.t());
    }

    Ok(UnivariateFit {
        spline: PiecewisePolynomial::new(sites.to_owned(), coeffs)?,
        smooth: p,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array, array};

    fn fit(
        x: &Array1<f64>,
        y: &Array2<f64>,
        w: Option<&Array1<f64>>,
        smooth: SmoothingParameter,
    ) -> UnivariateFit {
        CubicSmoother
            .fit(x.view(), y.view(), w.map(|w| w.view()), smooth)
            .expect("fit should succeed")
    }

    #[test]
    fn interpolates_when_smooth_is_one() {
        let x = array![0.0, 0.7, 1.5, 2.0, 3.1, 4.0];
        let y = x.mapv(f64::sin).insert_axis(Axis(0));
        let result = fit(&x, &y, None, SmoothingParameter::Fixed(1.0));
        assert_eq!(result.smooth, 1.0);
        assert_eq!(result.spline.pieces(), 5);
        assert_eq!(result.spline.order(), 4);

        let values = result.spline.evaluate(x.view());
        for (got, want) in values.iter().zip(y.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-12);
        }
    }

    #[test]
    fn interpolant_has_natural_end_conditions() {
        let x = array![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = array![[0.0, 1.0, 0.0, 1.0, 0.0]];
        let spline = fit(&x, &y, None, SmoothingParameter::Fixed(1.0)).spline;
        let pieces = spline.pieces();
        // Quadratic coefficient on the first piece is f''(x_0) / 2.
        assert_abs_diff_eq!(spline.coeffs()[[0, pieces]], 0.0, epsilon = 1e-12);

        // f''(x_n) from the last piece: 6 a h + 2 b.
        let h = x[4] - x[3];
        let a = spline.coeffs()[[0, pieces - 1]];
        let b = spline.coeffs()[[0, 2 * pieces - 1]];
        assert_abs_diff_eq!(6.0 * a * h + 2.0 * b, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn zero_smooth_is_weighted_least_squares_line() {
        let x = array![0.0, 1.0, 2.5, 3.0, 4.5, 6.0];
        let y = array![[1.0, 2.5, 2.0, 4.5, 4.0, 7.0]];
        let w = array![1.0, 2.0, 0.5, 1.0, 3.0, 1.5];
        let spline = fit(&x, &y, Some(&w), SmoothingParameter::Fixed(0.0)).spline;

        let sw = w.sum();
        let mx = (&w * &x).sum() / sw;
        let my = (&w * &y.row(0)).sum() / sw;
        let sxy = (&w * &(&x - mx) * &(&y.row(0) - my)).sum();
        let sxx = (&w * &(&x - mx).mapv(|v| v * v)).sum();
        let slope = sxy / sxx;

        let query = Array::linspace(-1.0, 7.0, 9);
        let values = spline.evaluate(query.view());
        for (q, got) in query.iter().zip(values.row(0)) {
            assert_abs_diff_eq!(*got, my + slope * (q - mx), epsilon = 1e-9);
        }
    }

    #[test]
    fn auto_smooth_is_resolved_inside_unit_interval() {
        let x = Array::linspace(0.0, 1.0, 11);
        let y = x.mapv(|v: f64| (6.0 * v).cos()).insert_axis(Axis(0));
        let result = fit(&x, &y, None, SmoothingParameter::Auto);
        assert!(result.smooth > 0.0 && result.smooth < 1.0);

        let refit = fit(&x, &y, None, SmoothingParameter::Fixed(result.smooth));
        assert_eq!(result.spline, refit.spline);
    }

    #[test]
    fn two_sites_give_a_linear_piece() {
        let x = array![1.0, 3.0];
        let y = array![[2.0, 6.0], [1.0, -1.0]];
        let result = fit(&x, &y, None, SmoothingParameter::Fixed(0.4));
        assert_eq!(result.smooth, 1.0);
        assert_eq!(result.spline.order(), 2);
        assert_eq!(result.spline.coeffs(), &array![[2.0, 2.0], [-1.0, 1.0]]);

        let values = result.spline.evaluate(array![0.0, 2.0, 4.0].view());
        assert_eq!(values, array![[0.0, 4.0, 8.0], [2.0, 0.0, -2.0]]);
    }

    #[test]
    fn rows_are_fitted_independently() {
        let x = array![0.0, 1.0, 2.0, 4.0, 5.0];
        let y = array![[0.0, 2.0, 1.0, 3.0, 2.0], [5.0, 4.0, 4.5, 1.0, 0.0]];
        let both = fit(&x, &y, None, SmoothingParameter::Fixed(0.6)).spline;
        for row in 0..2 {
            let single = fit(
                &x,
                &y.row(row).to_owned().insert_axis(Axis(0)),
                None,
                SmoothingParameter::Fixed(0.6),
            )
            .spline;
            for (a, b) in both.coeffs().row(row).iter().zip(single.coeffs().row(0)) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn parallel_and_serial_evaluation_agree() {
        let x = Array::linspace(0.0, 2.0, 7);
        let y = Array2::from_shape_fn((40, 7), |(r, c)| ((r * 7 + c) as f64 * 0.37).sin());
        let spline = fit(&x, &y, None, SmoothingParameter::Fixed(0.8)).spline;
        let query = Array::linspace(-0.5, 2.5, 13);
        let serial = evaluate_piecewise(
            spline.breaks().view(),
            spline.coeffs().view(),
            spline.order(),
            query.view(),
            usize::MAX,
        );
        let parallel = evaluate_piecewise(
            spline.breaks().view(),
            spline.coeffs().view(),
            spline.order(),
            query.view(),
            1,
        );
        assert_eq!(serial, parallel);
    }

    #[test]
    fn rejects_non_increasing_sites() {
        let err = CubicSmoother
            .fit(
                array![0.0, 1.0, 1.0].view(),
                array![[1.0, 2.0, 3.0]].view(),
                None,
                SmoothingParameter::Auto,
            )
            .unwrap_err();
        assert_eq!(err, SplineError::SitesNotIncreasing { index: 2 });
    }

    #[test]
    fn rejects_bad_weights_and_smooth() {
        let x = array![0.0, 1.0, 2.0];
        let y = array![[1.0, 2.0, 3.0]];
        assert_eq!(
            CubicSmoother
                .fit(x.view(), y.view(), Some(array![1.0, 1.0].view()), SmoothingParameter::Auto)
                .unwrap_err(),
            SplineError::WeightsShapeMismatch {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(
            CubicSmoother
                .fit(
                    x.view(),
                    y.view(),
                    Some(array![1.0, 0.0, 1.0].view()),
                    SmoothingParameter::Auto
                )
                .unwrap_err(),
            SplineError::InvalidWeight {
                index: 1,
                value: 0.0
            }
        );
        assert_eq!(
            CubicSmoother
                .fit(x.view(), y.view(), None, SmoothingParameter::Fixed(1.5))
                .unwrap_err(),
            SplineError::SmoothOutOfRange(1.5)
        );
    }

    #[test]
    fn form_rejects_ragged_coefficients() {
        let err = PiecewisePolynomial::new(array![0.0, 1.0, 2.0], Array2::zeros((1, 5)));
        assert!(matches!(err, Err(SplineError::InvalidForm(_))));
    }
}
