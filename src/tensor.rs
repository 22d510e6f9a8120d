//! Mode transforms over dense grid tensors.
//!
//! A separable sweep visits the axes from last to first. The working tensor carries a
//! synthetic leading axis of length 1, so its shape is `(1, n_0, ..., n_{d-1})`. At every step
//! the trailing axis is the one being transformed and all other axes are folded, in order,
//! into a single row index. After the step the trailing axis is rotated to position 1, which
//! makes the next axis to visit trailing. After `d` steps every axis has been rotated once and
//! the input axis order is restored.

use ndarray::{Array2, ArrayD, ArrayView2, Axis, IxDyn, ShapeError};

/// Applies `transform` to every row obtained by flattening all axes but the trailing one.
///
/// `transform` receives a `rows x trailing` matrix and must return a matrix with the same
/// number of rows; its column count becomes the new trailing extent.
pub(crate) fn transform_trailing_axis<F, E>(
    tensor: ArrayD<f64>,
    transform: F,
) -> Result<ArrayD<f64>, E>
where
    F: FnOnce(ArrayView2<'_, f64>) -> Result<Array2<f64>, E>,
    E: From<ShapeError>,
{
    let shape = tensor.shape().to_vec();
    let Some((&trailing, leading)) = shape.split_last() else {
        return Ok(tensor);
    };
    let rows: usize = leading.iter().product();

    let standard = tensor.as_standard_layout();
    let matrix = standard.view().into_shape_with_order((rows, trailing))?;
    let transformed = into_standard(transform(matrix)?);

    let mut new_shape = leading.to_vec();
    new_shape.push(transformed.ncols());
    Ok(transformed.into_shape_with_order(IxDyn(&new_shape))?)
}

/// Moves the trailing axis to position 1 and shifts axes `1..ndim-1` one place right.
///
/// Only strides are permuted; the copy happens lazily when the next transform needs a
/// standard layout.
pub(crate) fn rotate_trailing_to_front(tensor: ArrayD<f64>) -> ArrayD<f64> {
    let ndim = tensor.ndim();
    if ndim < 3 {
        return tensor;
    }
    let mut axes = Vec::with_capacity(ndim);
    axes.push(0);
    axes.push(ndim - 1);
    axes.extend(1..ndim - 1);
    tensor.permuted_axes(axes)
}

/// Runs `step(axis, rows)` for every axis of `values`, last axis first.
///
/// The returned tensor has the same axis order as `values`, with each extent replaced by the
/// column count `step` produced for that axis.
pub(crate) fn separable_sweep<F, E>(values: ArrayD<f64>, mut step: F) -> Result<ArrayD<f64>, E>
where
    F: FnMut(usize, ArrayView2<'_, f64>) -> Result<Array2<f64>, E>,
    E: From<ShapeError>,
{
    let ndim = values.ndim();
    let mut work = values.insert_axis(Axis(0));
    for axis in (0..ndim).rev() {
        work = transform_trailing_axis(work, |rows| step(axis, rows))?;
        if ndim > 1 {
            work = rotate_trailing_to_front(work);
        }
    }
    Ok(into_standard(work.index_axis_move(Axis(0), 0)))
}

fn into_standard<D: ndarray::Dimension>(array: ndarray::Array<f64, D>) -> ndarray::Array<f64, D> {
    if array.is_standard_layout() {
        array
    } else {
        array.as_standard_layout().into_owned()
    }
}
