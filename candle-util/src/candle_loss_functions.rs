use candle_core::{Result, Tensor};
use std::f64::consts::PI;

/// Diagonal Gaussian log-likelihood
///
/// llik(i) = -0.5 * sum_w [ ln(2 pi var(i,w)) + (x(i,w) - mean(i,w))^2 / var(i,w) ]
///
/// * `x_nd` - data tensor (observed data)
/// * `mean_nd` - mean tensor (reconstruction)
/// * `var_nd` - variance tensor (reconstruction)
///
pub fn gaussian_likelihood(x_nd: &Tensor, mean_nd: &Tensor, var_nd: &Tensor) -> Result<Tensor> {
    let sq_err = x_nd.sub(mean_nd)?.sqr()?.div(var_nd)?;
    let log_norm = (var_nd.log()? + (2. * PI).ln())?;
    (sq_err + log_norm)?.sum(x_nd.rank() - 1)? * (-0.5)
}

/// Numerically stable `log(sum(exp(x), dim))`, dropping `dim`
pub fn log_sum_exp(x: &Tensor, dim: usize) -> Result<Tensor> {
    let max_x = x.max_keepdim(dim)?.detach();
    let sum_exp = x.broadcast_sub(&max_x)?.exp()?.sum_keepdim(dim)?;
    (sum_exp.log()? + max_x)?.squeeze(dim)
}
