pub mod dmatrix_util;
pub mod tensor_util;
pub mod traits;

pub use nalgebra::{DMatrix, DVector};
