use crate::candle_aux_layers::*;
use crate::candle_model_traits::*;
use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};

const MIN_LNVAR: f64 = -8.;
const MAX_LNVAR: f64 = 8.;

/// MLP trunk with two linear heads giving the mean and the log
/// variance of a diagonal Gaussian. Serves as an encoder (`x -> z`)
/// or a decoder (`z -> x`) depending on how it is built.
pub struct MlpNormalDiag {
    dim_in: usize,
    dim_out: usize,
    fc: MlpStack,
    mean: Linear,
    lnvar: Linear,
}

impl MlpNormalDiag {
    /// Will create a new module with these variables:
    ///
    /// * `fc.{}.weight` where {} is the layer index
    /// * `mean.weight`, `mean.bias`
    /// * `lnvar.weight`, `lnvar.bias`
    ///
    /// # Arguments
    /// * `dim_in` - input dimension
    /// * `dim_out` - dimension of the Gaussian output
    /// * `layers` - fully connected layers, each with the dim
    /// * `vs` - variable builder
    pub fn new(dim_in: usize, dim_out: usize, layers: &[usize], vs: VarBuilder) -> Result<Self> {
        let fc = mlp_stack(dim_in, layers, Activation::Tanh, vs.pp("fc"))?;
        let mean = candle_nn::linear(fc.dim_out(), dim_out, vs.pp("mean"))?;
        let lnvar = candle_nn::linear(fc.dim_out(), dim_out, vs.pp("lnvar"))?;
        Ok(Self {
            dim_in,
            dim_out,
            fc,
            mean,
            lnvar,
        })
    }

    /// `(mean, var)` of the output Gaussian
    pub fn gaussian_params(&self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let h = self.fc.forward(input)?;
        let mean = self.mean.forward(&h)?;
        let var = self.lnvar.forward(&h)?.clamp(MIN_LNVAR, MAX_LNVAR)?.exp()?;
        Ok((mean, var))
    }
}

impl NormalEncoderT for MlpNormalDiag {
    fn forward_t(&self, x_nd: &Tensor, _train: bool) -> Result<(Tensor, Tensor)> {
        self.gaussian_params(x_nd)
    }

    fn dim_obs(&self) -> usize {
        self.dim_in
    }

    fn dim_latent(&self) -> usize {
        self.dim_out
    }
}

impl NormalDecoderT for MlpNormalDiag {
    fn forward(&self, z_nk: &Tensor) -> Result<(Tensor, Tensor)> {
        self.gaussian_params(z_nk)
    }

    fn dim_obs(&self) -> usize {
        self.dim_out
    }

    fn dim_latent(&self) -> usize {
        self.dim_in
    }
}

/// Like [`MlpNormalDiag`] but with one log variance per sample shared
/// by every output dimension
pub struct MlpNormalIso {
    dim_in: usize,
    dim_out: usize,
    fc: MlpStack,
    mean: Linear,
    lnvar: Linear,
}

impl MlpNormalIso {
    /// Will create a new module with these variables:
    ///
    /// * `fc.{}.weight` where {} is the layer index
    /// * `mean.weight`, `mean.bias`
    /// * `lnvar.weight`, `lnvar.bias` (a single output)
    pub fn new(dim_in: usize, dim_out: usize, layers: &[usize], vs: VarBuilder) -> Result<Self> {
        let fc = mlp_stack(dim_in, layers, Activation::Tanh, vs.pp("fc"))?;
        let mean = candle_nn::linear(fc.dim_out(), dim_out, vs.pp("mean"))?;
        let lnvar = candle_nn::linear(fc.dim_out(), 1, vs.pp("lnvar"))?;
        Ok(Self {
            dim_in,
            dim_out,
            fc,
            mean,
            lnvar,
        })
    }

    pub fn gaussian_params(&self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let h = self.fc.forward(input)?;
        let mean = self.mean.forward(&h)?;
        let var = self
            .lnvar
            .forward(&h)?
            .clamp(MIN_LNVAR, MAX_LNVAR)?
            .exp()?
            .broadcast_as(mean.shape())?
            .contiguous()?;
        Ok((mean, var))
    }
}

impl NormalEncoderT for MlpNormalIso {
    fn forward_t(&self, x_nd: &Tensor, _train: bool) -> Result<(Tensor, Tensor)> {
        self.gaussian_params(x_nd)
    }

    fn dim_obs(&self) -> usize {
        self.dim_in
    }

    fn dim_latent(&self) -> usize {
        self.dim_out
    }
}

impl NormalDecoderT for MlpNormalIso {
    fn forward(&self, z_nk: &Tensor) -> Result<(Tensor, Tensor)> {
        self.gaussian_params(z_nk)
    }

    fn dim_obs(&self) -> usize {
        self.dim_out
    }

    fn dim_latent(&self) -> usize {
        self.dim_in
    }
}
