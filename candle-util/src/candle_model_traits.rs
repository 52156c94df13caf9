use candle_core::{Result, Tensor};

pub trait NormalEncoderT {
    /// An encoder that spits out the parameters of a diagonal Gaussian
    /// posterior over the latent space
    ///
    /// # Arguments
    /// * `x_nd` - input data (n x d)
    /// * `train` - whether to use dropout/batchnorm or not
    ///
    /// # Returns `(mean_nk, var_nk)`, both (n x k) with `var_nk > 0`
    fn forward_t(&self, x_nd: &Tensor, train: bool) -> Result<(Tensor, Tensor)>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait NormalDecoderT {
    /// A decoder that spits out the parameters of a diagonal Gaussian
    /// likelihood over the observations
    ///
    /// # Arguments
    /// * `z_nk` - latent states (n x k)
    ///
    /// # Returns `(mean_nd, var_nd)`, both (n x d) with `var_nd > 0`
    fn forward(&self, z_nk: &Tensor) -> Result<(Tensor, Tensor)>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
