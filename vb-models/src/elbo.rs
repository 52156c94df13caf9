use crate::acc_stats::AccStats;
use crate::traits::BayesianModel;

use candle_core::Tensor;
use log::{debug, warn};
use vb_param::{BayesianParameterSet, Result, VbError};

/// Stochastic estimate of the evidence lower bound on one minibatch
pub struct Elbo {
    value: Tensor,
    expected_log_likelihood: f64,
    kl_div: f64,
    acc_stats: AccStats,
}

impl Elbo {
    /// Scalar tensor, still attached to the graph of any network
    /// inside the model
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    pub fn value_f64(&self) -> Result<f64> {
        Ok(self.value.to_dtype(candle_core::DType::F64)?.to_scalar::<f64>()?)
    }

    /// `datasize / N · Σ_n E[ln p(x_n)]`
    pub fn expected_log_likelihood(&self) -> f64 {
        self.expected_log_likelihood
    }

    /// Σ KL(posterior || prior) over the model's parameters
    pub fn kl_div(&self) -> f64 {
        self.kl_div
    }

    /// Statistics already scaled to the full data set
    pub fn acc_stats(&self) -> &AccStats {
        &self.acc_stats
    }

    /// Accumulate the natural gradients of every parameter
    pub fn natural_backward(&self) -> Result<()> {
        self.acc_stats.apply()
    }
}

/// ELBO of `model` on the minibatch `data (N x d)` drawn from a data
/// set of `datasize` frames
///
/// datasize / N · Σ_n E[ln p(x_n | θ)] - KL(q(θ) || p(θ))
pub fn evidence_lower_bound(model: &dyn BayesianModel, data: &Tensor, datasize: usize) -> Result<Elbo> {
    let stats = model.sufficient_statistics(data)?;
    let nframes = stats.dims()[0];
    if nframes == 0 {
        return Err(VbError::InvalidArgument("empty minibatch".to_string()));
    }
    let llh = model.expected_log_likelihood(&stats)?;
    if llh.rank() != 1 {
        return Err(VbError::InvalidArgument(format!(
            "{} gives per-component log-likelihoods {:?}; wrap it in a Mixture",
            model.type_name(),
            llh.dims()
        )));
    }
    let scale = datasize as f64 / nframes as f64;
    let llh_sum = (llh.sum(0)? * scale)?;
    let expected_log_likelihood = llh_sum.to_dtype(candle_core::DType::F64)?.to_scalar::<f64>()?;
    let kl_div = model.kl_div_posterior_prior()?;
    if !expected_log_likelihood.is_finite() {
        warn!("{}: expected log-likelihood is {}", model.type_name(), expected_log_likelihood);
    }
    let value = (llh_sum - kl_div)?;

    let acc_stats = model.accumulate(&stats, None)?.scale(scale)?;
    debug!(
        "{} ELBO on {} frames: {} (kl = {})",
        model.type_name(),
        nframes,
        expected_log_likelihood - kl_div,
        kl_div
    );
    Ok(Elbo {
        value,
        expected_log_likelihood,
        kl_div,
        acc_stats,
    })
}

/// Natural-gradient ascent on the conjugate parameters
pub struct VbOptimizer {
    parameters: BayesianParameterSet,
    lrate: f64,
}

impl VbOptimizer {
    pub fn new(parameters: BayesianParameterSet, lrate: f64) -> Result<Self> {
        check_lrate(lrate)?;
        Ok(Self { parameters, lrate })
    }

    pub fn lrate(&self) -> f64 {
        self.lrate
    }

    pub fn set_lrate(&mut self, lrate: f64) -> Result<()> {
        check_lrate(lrate)?;
        self.lrate = lrate;
        Ok(())
    }

    pub fn parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    /// Clear every accumulator before a new minibatch
    pub fn init_step(&self) -> Result<()> {
        self.parameters.zero_natural_grad()
    }

    pub fn step(&self) -> Result<()> {
        for parameter in self.parameters.iter() {
            parameter.natural_grad_update(self.lrate)?;
        }
        Ok(())
    }
}

fn check_lrate(lrate: f64) -> Result<()> {
    if lrate.is_finite() && lrate > 0.0 {
        Ok(())
    } else {
        Err(VbError::InvalidArgument(format!(
            "learning rate must be positive, got {}",
            lrate
        )))
    }
}
