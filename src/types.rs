use serde::{Deserialize, Serialize};

/// Smoothing parameter requested for a single axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum SmoothingParameter {
    /// Let the 1-D solver pick the value from the axis geometry and weights.
    #[default]
    Auto,
    /// Fixed value in `[0, 1]`: 0 is the least-squares straight line, 1 the interpolant.
    Fixed(f64),
}

impl SmoothingParameter {
    pub fn fixed(&self) -> Option<f64> {
        match self {
            SmoothingParameter::Auto => None,
            SmoothingParameter::Fixed(p) => Some(*p),
        }
    }
}

impl From<f64> for SmoothingParameter {
    fn from(value: f64) -> Self {
        SmoothingParameter::Fixed(value)
    }
}

impl From<Option<f64>> for SmoothingParameter {
    fn from(value: Option<f64>) -> Self {
        value.map_or(SmoothingParameter::Auto, SmoothingParameter::Fixed)
    }
}

/// Smoothing request for a whole grid, before it is matched against the axis count.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SmoothSpec {
    /// Every axis auto-resolved.
    #[default]
    Auto,
    /// One value broadcast to every axis.
    Uniform(f64),
    /// Exactly one entry per axis.
    PerAxis(Vec<SmoothingParameter>),
}

impl SmoothSpec {
    /// Expands the request to one parameter per axis.
    ///
    /// Returns `Err(found)` with the number of supplied entries when a per-axis list does not
    /// match `ndim`.
    pub fn resolve(&self, ndim: usize) -> Result<Vec<SmoothingParameter>, usize> {
        match self {
            SmoothSpec::Auto => Ok(vec![SmoothingParameter::Auto; ndim]),
            SmoothSpec::Uniform(p) => Ok(vec![SmoothingParameter::Fixed(*p); ndim]),
            SmoothSpec::PerAxis(values) if values.len() == ndim => Ok(values.clone()),
            SmoothSpec::PerAxis(values) => Err(values.len()),
        }
    }
}

impl From<f64> for SmoothSpec {
    fn from(value: f64) -> Self {
        SmoothSpec::Uniform(value)
    }
}

impl From<Option<f64>> for SmoothSpec {
    fn from(value: Option<f64>) -> Self {
        value.map_or(SmoothSpec::Auto, SmoothSpec::Uniform)
    }
}

impl From<SmoothingParameter> for SmoothSpec {
    fn from(value: SmoothingParameter) -> Self {
        match value {
            SmoothingParameter::Auto => SmoothSpec::Auto,
            SmoothingParameter::Fixed(p) => SmoothSpec::Uniform(p),
        }
    }
}

impl From<Vec<f64>> for SmoothSpec {
    fn from(values: Vec<f64>) -> Self {
        SmoothSpec::PerAxis(values.into_iter().map(SmoothingParameter::Fixed).collect())
    }
}

impl From<&[f64]> for SmoothSpec {
    fn from(values: &[f64]) -> Self {
        SmoothSpec::from(values.to_vec())
    }
}

impl From<Vec<Option<f64>>> for SmoothSpec {
    fn from(values: Vec<Option<f64>>) -> Self {
        SmoothSpec::PerAxis(values.into_iter().map(SmoothingParameter::from).collect())
    }
}

impl From<Vec<SmoothingParameter>> for SmoothSpec {
    fn from(values: Vec<SmoothingParameter>) -> Self {
        SmoothSpec::PerAxis(values)
    }
}

pub fn default_parallel_row_threshold() -> usize {
    256
}

/// Engine configuration shared by fitting and evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridFitOptions {
    /// Row count from which a single axis step evaluates its rows on the rayon pool.
    #[serde(default = "default_parallel_row_threshold")]
    pub parallel_row_threshold: usize,
}

impl Default for GridFitOptions {
    fn default() -> Self {
        Self {
            parallel_row_threshold: default_parallel_row_threshold(),
        }
    }
}
