pub mod faer_ndarray;
pub mod sparse_exact;
