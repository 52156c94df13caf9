use crate::acc_stats::AccStats;
use crate::traits::BayesianModel;

use candle_core::Tensor;
use candle_util::candle_loss_functions::gaussian_likelihood;
use candle_util::candle_model_traits::{NormalDecoderT, NormalEncoderT};
use log::debug;
use vb_param::*;

/// Variational auto-encoder whose latent prior is itself a Bayesian
/// model. The networks are trained by back-propagation through
/// [`BayesianModel::expected_log_likelihood`]; the latent model's
/// parameters get natural-gradient statistics from
/// [`BayesianModel::accumulate`].
///
/// Per frame
///
/// E_q[ln p(x | z)] + E_q[ln p(z | latent)] + H(q(z | x))
pub struct Vae {
    encoder: Box<dyn NormalEncoderT>,
    decoder: Box<dyn NormalDecoderT>,
    latent: Box<dyn BayesianModel>,
    nsamples: usize,
    parameters: BayesianParameterSet,
}

impl Vae {
    pub fn new(
        encoder: Box<dyn NormalEncoderT>,
        decoder: Box<dyn NormalDecoderT>,
        latent: Box<dyn BayesianModel>,
        nsamples: usize,
    ) -> Result<Self> {
        if encoder.dim_latent() != decoder.dim_latent() || encoder.dim_obs() != decoder.dim_obs() {
            return Err(VbError::shape_mismatch(
                "encoder/decoder (obs, latent)",
                &[encoder.dim_obs(), encoder.dim_latent()],
                &[decoder.dim_obs(), decoder.dim_latent()],
            ));
        }
        if nsamples == 0 {
            return Err(VbError::InvalidArgument(
                "at least one latent sample is needed".to_string(),
            ));
        }
        debug!(
            "VAE {} -> {} with a {} latent model",
            encoder.dim_obs(),
            encoder.dim_latent(),
            latent.type_name()
        );
        Ok(Self {
            encoder,
            decoder,
            latent,
            nsamples,
            parameters: BayesianParameterSet::default(),
        })
    }

    pub fn latent(&self) -> &dyn BayesianModel {
        self.latent.as_ref()
    }

    pub fn dim_latent(&self) -> usize {
        self.encoder.dim_latent()
    }

    /// Posterior over the latent space for each frame
    pub fn encode(&self, data: &Tensor, train: bool) -> Result<NormalDiagonalState> {
        let (mean, var) = self.encoder.forward_t(data, train)?;
        NormalDiagonalState::new(mean, var)
    }

    /// Monte-Carlo estimate of `E_q[ln p(x | z)]`, `(N,)`
    fn reconstruction(&self, data: &Tensor, q: &NormalDiagonalState) -> Result<Tensor> {
        let mut total: Option<Tensor> = None;
        for _ in 0..self.nsamples {
            let z = q.sample()?;
            let (mean, var) = self.decoder.forward(&z)?;
            let llik = gaussian_likelihood(data, &mean, &var)?;
            total = Some(match total {
                Some(t) => (t + llik)?,
                None => llik,
            });
        }
        let total = total.ok_or_else(|| VbError::InvalidArgument("no latent samples".to_string()))?;
        Ok((total / self.nsamples as f64)?)
    }

    fn latent_statistics(&self, q: &NormalDiagonalState) -> Result<Tensor> {
        self.latent.sufficient_statistics_from_mean_var(q.mean(), q.var())
    }
}

impl BayesianModel for Vae {
    fn type_name(&self) -> &'static str {
        "VAE"
    }

    /// The network weights are not Bayesian parameters
    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sub_models(&self) -> Vec<&dyn BayesianModel> {
        vec![self.latent.as_ref()]
    }

    /// The data itself; the encoder runs inside the likelihood
    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        match *data.dims() {
            [_, d] if d == self.encoder.dim_obs() => Ok(data.clone()),
            _ => Err(VbError::shape_mismatch(
                "VAE data",
                &[data.dims().first().copied().unwrap_or(0), self.encoder.dim_obs()],
                data.dims(),
            )),
        }
    }

    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        let q = self.encode(stats, true)?;
        let llik = self.reconstruction(stats, &q)?;

        let latent_llik = self.latent.expected_log_likelihood(&self.latent_statistics(&q)?)?;
        if latent_llik.rank() != 1 {
            return Err(VbError::TypeMismatch {
                expected: "a latent model with one value per frame".to_string(),
                found: self.latent.type_name().to_string(),
            });
        }
        let latent_llik = latent_llik.to_dtype(llik.dtype())?.to_device(llik.device())?;
        let entropy = q.entropy()?;
        Ok(((llik + latent_llik)? + entropy)?)
    }

    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        let q = self.encode(stats, false)?;
        let latent_stats = self.latent_statistics(&q)?.detach();
        self.latent.accumulate(&latent_stats, weights)
    }
}
