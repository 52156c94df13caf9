use candle_core::{DType, Tensor};
use matrix_util::traits::ConvertMatOps;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use vb_param::{Result, VbError};

/// Number of rows of `x`, checking that it is `(N x ncol)`
pub(crate) fn check_frames(x: &Tensor, ncol: usize, context: &str) -> Result<usize> {
    match *x.dims() {
        [n, d] if d == ncol => Ok(n),
        _ => Err(VbError::shape_mismatch(context, &[x.dims().first().copied().unwrap_or(0), ncol], x.dims())),
    }
}

/// Σ_n w_n stats_n, or the plain column sum without weights
pub(crate) fn weighted_column_sum(stats: &Tensor, weights: Option<&Tensor>) -> Result<Tensor> {
    match weights {
        None => Ok(stats.sum(0)?),
        Some(w) => {
            let n = stats.dims()[0];
            if w.dims() != [n] {
                return Err(VbError::shape_mismatch("per-frame weights", &[n], w.dims()));
            }
            let w = w.to_dtype(stats.dtype())?.to_device(stats.device())?;
            Ok(w.unsqueeze(0)?.matmul(stats)?.squeeze(0)?)
        }
    }
}

/// `(K x D)` matrix of Σ_n w_nk stats_n
pub(crate) fn weighted_column_sums(stats: &Tensor, weights: &Tensor, k: usize) -> Result<Tensor> {
    let n = stats.dims()[0];
    if weights.dims() != [n, k] {
        return Err(VbError::shape_mismatch("per-component weights", &[n, k], weights.dims()));
    }
    let w = weights.to_dtype(stats.dtype())?.to_device(stats.device())?;
    Ok(w.t()?.contiguous()?.matmul(stats)?)
}

/// Host copy of the weights as an `(N x K)` matrix, all ones if absent
pub(crate) fn host_weights(weights: Option<&Tensor>, n: usize, k: usize) -> Result<DMatrix<f64>> {
    match weights {
        None => Ok(DMatrix::from_element(n, k, 1.0)),
        Some(w) => {
            let expected: &[usize] = if k == 1 { &[n] } else { &[n, k] };
            if w.dims() != expected && w.dims() != [n, k] {
                return Err(VbError::shape_mismatch("weights", expected, w.dims()));
            }
            Ok(DMatrix::<f64>::from_row_slice(n, k, &matrix_util::tensor_util::host_vec(w)?))
        }
    }
}

/// Host matrix of a `(N x D)` tensor
pub(crate) fn host_matrix(x: &Tensor) -> Result<DMatrix<f64>> {
    Ok(DMatrix::<f64>::from_tensor(x)?)
}

/// Data tensor in the parameters' dtype and device
pub(crate) fn align(x: &Tensor, like: &Tensor) -> Result<Tensor> {
    Ok(x.to_dtype(like.dtype())?.to_device(like.device())?)
}

pub(crate) fn host_to_tensor(x: &DMatrix<f64>, like: &Tensor) -> Result<Tensor> {
    Ok(x.to_tensor(like.device(), like.dtype())?)
}

pub(crate) fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

pub(crate) fn check_dtype_float(x: &Tensor) -> Result<()> {
    match x.dtype() {
        DType::F16 | DType::BF16 | DType::F32 | DType::F64 => Ok(()),
        dtype => Err(VbError::InvalidArgument(format!(
            "expected floating point data, got {:?}",
            dtype
        ))),
    }
}

/// Host statistics as a rank-1 tensor in the parameter's dtype/device
pub(crate) fn param_stats_tensor(param: &vb_param::BayesianParameter, stats: Vec<f64>) -> Result<Tensor> {
    let len = stats.len();
    Ok(matrix_util::tensor_util::tensor_from_host(
        stats,
        len,
        &param.device(),
        param.dtype(),
    )?)
}
