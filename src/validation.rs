//! Normalization of per-axis coordinate vectors.
//!
//! Site vectors, weight vectors and query grids all go through [`prepare_axes`] before any
//! numeric work starts, so every later stage can assume finite `f64` vectors with at least two
//! entries.

use ndarray::{Array1, ArrayBase, ArrayD, ArrayView1, ArrayViewD, Data, Ix1, IxDyn};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AxisError {
    #[error("'{label}' must be a non-empty sequence of vectors.")]
    NotASequence { label: &'static str },

    #[error("All '{label}' elements must be vectors, but element {axis} has {ndim} dimensions.")]
    NotAVector {
        label: &'static str,
        axis: usize,
        ndim: usize,
    },

    #[error("'{label}' must contain at least 2 data points, but element {axis} has {found}.")]
    TooFewPoints {
        label: &'static str,
        axis: usize,
        found: usize,
    },

    #[error("'{label}' element {axis} contains a non-finite value at index {index}.")]
    NonFinite {
        label: &'static str,
        axis: usize,
        index: usize,
    },
}

/// Anything that can be read as one axis vector.
///
/// The view is dynamic-dimensional so that matrices passed by mistake are rejected instead of
/// silently flattened.
pub trait AxisInput {
    fn axis_view(&self) -> ArrayViewD<'_, f64>;
}

impl<S: Data<Elem = f64>> AxisInput for ArrayBase<S, Ix1> {
    fn axis_view(&self) -> ArrayViewD<'_, f64> {
        self.view().into_dyn()
    }
}

impl<S: Data<Elem = f64>> AxisInput for ArrayBase<S, IxDyn> {
    fn axis_view(&self) -> ArrayViewD<'_, f64> {
        self.view()
    }
}

impl AxisInput for [f64] {
    fn axis_view(&self) -> ArrayViewD<'_, f64> {
        ArrayView1::from(self).into_dyn()
    }
}

impl AxisInput for Vec<f64> {
    fn axis_view(&self) -> ArrayViewD<'_, f64> {
        ArrayView1::from(self.as_slice()).into_dyn()
    }
}

impl<const N: usize> AxisInput for [f64; N] {
    fn axis_view(&self) -> ArrayViewD<'_, f64> {
        ArrayView1::from(&self[..]).into_dyn()
    }
}

impl<T: AxisInput + ?Sized> AxisInput for &T {
    fn axis_view(&self) -> ArrayViewD<'_, f64> {
        (**self).axis_view()
    }
}

/// Validates a sequence of axis vectors and returns owned copies.
pub fn prepare_axes<A: AxisInput>(
    data: &[A],
    label: &'static str,
) -> Result<Vec<Array1<f64>>, AxisError> {
    if data.is_empty() {
        return Err(AxisError::NotASequence { label });
    }
    data.iter()
        .enumerate()
        .map(|(axis, item)| prepare_axis(item.axis_view(), label, axis))
        .collect()
}

/// Validates one axis vector. A 0-d input counts as a single point.
pub(crate) fn prepare_axis(
    view: ArrayViewD<'_, f64>,
    label: &'static str,
    axis: usize,
) -> Result<Array1<f64>, AxisError> {
    if view.ndim() > 1 {
        return Err(AxisError::NotAVector {
            label,
            axis,
            ndim: view.ndim(),
        });
    }
    let values: Array1<f64> = view.iter().copied().collect();
    if values.len() < 2 {
        return Err(AxisError::TooFewPoints {
            label,
            axis,
            found: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(AxisError::NonFinite { label, axis, index });
    }
    Ok(values)
}

/// Shape of a grid described by its axes.
pub(crate) fn grid_shape(axes: &[Array1<f64>]) -> Vec<usize> {
    axes.iter().map(Array1::len).collect()
}

/// Owned copy of a value tensor in standard layout.
pub(crate) fn owned_standard(values: ArrayViewD<'_, f64>) -> ArrayD<f64> {
    values.as_standard_layout().into_owned()
}
