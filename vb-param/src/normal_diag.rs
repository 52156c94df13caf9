use crate::error::{Result, VbError};
use candle_core::Tensor;
use std::f64::consts::PI;

/// Diagonal Normal whose mean and variance come from a differentiable
/// transform (e.g. an encoder network). All operations are tensor
/// operations over the last dimension, so gradients flow back into
/// whatever produced `mean` and `var`.
///
/// Natural form over `d` dimensions has `3d + 1` entries
///
/// η = [-1/(2v), m/v, -m²/(2v), -½ Σ ln(2πv)]
///
/// paired with the statistics `T(x) = [x², x, 1, 1]`, so that
/// `ln N(x | m, v) = ⟨η, T(x)⟩` exactly.
#[derive(Clone, Debug)]
pub struct NormalDiagonalState {
    mean: Tensor,
    var: Tensor,
}

impl NormalDiagonalState {
    pub fn new(mean: Tensor, var: Tensor) -> Result<Self> {
        if mean.dims() != var.dims() {
            return Err(VbError::shape_mismatch(
                "Normal mean/variance",
                mean.dims(),
                var.dims(),
            ));
        }
        if mean.rank() == 0 {
            return Err(VbError::InvalidArgument(
                "Normal state needs at least one dimension".to_string(),
            ));
        }
        Ok(Self { mean, var })
    }

    /// `var = exp(log_var)`
    pub fn from_mean_log_var(mean: Tensor, log_var: &Tensor) -> Result<Self> {
        Self::new(mean, log_var.exp()?)
    }

    pub fn mean(&self) -> &Tensor {
        &self.mean
    }

    pub fn var(&self) -> &Tensor {
        &self.var
    }

    fn last_dim(&self) -> usize {
        self.mean.rank() - 1
    }

    pub fn dim(&self) -> usize {
        self.mean.dims()[self.last_dim()]
    }

    pub fn natural_parameters(&self) -> Result<Tensor> {
        let last = self.last_dim();
        let prec = self.var.recip()?;
        let eta1 = (&prec * -0.5)?;
        let eta2 = (&self.mean * &prec)?;
        let eta3 = ((self.mean.sqr()? * &prec)? * -0.5)?;
        let log_norm = ((self.var.log()? + (2.0 * PI).ln())?.sum_keepdim(last)? * -0.5)?;
        Ok(Tensor::cat(&[&eta1, &eta2, &eta3, &log_norm], last)?)
    }

    /// Inverse of [`Self::natural_parameters`]
    pub fn from_natural(eta: &Tensor) -> Result<Self> {
        let last = eta.rank().checked_sub(1).ok_or_else(|| {
            VbError::InvalidArgument("natural parameters must have a last dimension".to_string())
        })?;
        let n = eta.dims()[last];
        if n % 3 != 1 {
            return Err(VbError::shape_mismatch(
                "diagonal Normal natural parameters (3d + 1)",
                &[3 * (n / 3) + 1],
                &[n],
            ));
        }
        let d = n / 3;
        let eta1 = eta.narrow(last, 0, d)?;
        let eta2 = eta.narrow(last, d, d)?;
        let var = (eta1.recip()? * -0.5)?;
        let mean = (eta2 * &var)?;
        Self::new(mean, var)
    }

    /// `T(x) = [x², x, 1, 1]`
    pub fn sufficient_statistics(x: &Tensor) -> Result<Tensor> {
        let last = x.rank().checked_sub(1).ok_or_else(|| {
            VbError::InvalidArgument("observations must have a last dimension".to_string())
        })?;
        let ones = x.ones_like()?;
        let one = x.narrow(last, 0, 1)?.ones_like()?;
        Ok(Tensor::cat(&[&x.sqr()?, x, &ones, &one], last)?)
    }

    /// `E[T(x)] = [m² + v, m, 1, 1]`
    pub fn expected_sufficient_statistics(&self) -> Result<Tensor> {
        let last = self.last_dim();
        let second = (self.mean.sqr()? + &self.var)?;
        let ones = self.mean.ones_like()?;
        let one = self.mean.narrow(last, 0, 1)?.ones_like()?;
        Ok(Tensor::cat(&[&second, &self.mean, &ones, &one], last)?)
    }

    /// H = -⟨η, E[T]⟩, one value per leading index
    pub fn entropy(&self) -> Result<Tensor> {
        let eta = self.natural_parameters()?;
        let stats = self.expected_sufficient_statistics()?;
        Ok((eta * stats)?.sum(self.last_dim())?.neg()?)
    }

    /// `ln N(x | m, v)` summed over the last dimension
    pub fn log_likelihood(&self, x: &Tensor) -> Result<Tensor> {
        if x.dims() != self.mean.dims() {
            return Err(VbError::shape_mismatch(
                "Normal log-likelihood",
                self.mean.dims(),
                x.dims(),
            ));
        }
        let eta = self.natural_parameters()?;
        let stats = Self::sufficient_statistics(x)?;
        Ok((eta * stats)?.sum(self.last_dim())?)
    }

    /// Reparameterised draw `m + sqrt(v) ε`
    pub fn sample(&self) -> Result<Tensor> {
        let eps = self.mean.randn_like(0., 1.)?;
        Ok((&self.mean + (self.var.sqrt()? * eps)?)?)
    }
}
