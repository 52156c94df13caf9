use candle_core::{DType, Device, Tensor};
use rand::Rng;

/// Reading off from and writing back to `Tensor`
///
/// All conversions go through `f64` on the host; the target tensor
/// gets the requested dtype and device afterwards.
pub trait ConvertMatOps {
    type Mat;
    type Scalar;

    /// Copy a tensor into a host matrix. A rank-1 tensor of length
    /// `n` becomes an `n x 1` column.
    fn from_tensor(_: &Tensor) -> anyhow::Result<Self::Mat>;

    /// Copy a host matrix into a tensor. Column vectors become rank-1
    /// tensors, everything else rank-2 `(nrows, ncols)`.
    fn to_tensor(&self, dev: &Device, dtype: DType) -> anyhow::Result<Tensor>;
}

/// Row-major flattening, the layout used for matrix-valued natural
/// parameters
pub trait FlattenOps {
    type Mat;
    type Scalar;

    fn flatten_row_major(&self) -> Vec<Self::Scalar>;

    fn from_row_major(nrow: usize, ncol: usize, data: &[Self::Scalar]) -> anyhow::Result<Self::Mat>;
}

/// Operations to sample random matrices with an explicit generator
/// so that callers can make the draws reproducible
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a normal distribution `N(0,1)`
    fn rnorm<R: Rng + ?Sized>(nrow: usize, ncol: usize, rng: &mut R) -> Self::Mat;
}

/// Symmetric positive definite operations
pub trait SpdOps {
    type Mat;
    type Scalar;

    /// `inv(X)` through the Cholesky factor
    fn spd_inverse(&self) -> anyhow::Result<Self::Mat>;

    /// `ln|X|` through the Cholesky factor
    fn spd_log_det(&self) -> anyhow::Result<Self::Scalar>;

    /// `(X + X') / 2`
    fn symmetrize(&self) -> Self::Mat;
}
