use crate::acc_stats::AccStats;
use crate::model_util::*;
use crate::traits::BayesianModel;

use candle_core::{Device, Tensor};
use log::debug;
use matrix_util::traits::SampleOps;
use nalgebra::DMatrix;
use std::f64::consts::PI;
use vb_param::*;

/// `[x², x, 1, 1]` for every row of `x (N x d)`, `(N x 4d)`
pub fn normal_sufficient_statistics(x: &Tensor) -> Result<Tensor> {
    let ones = x.ones_like()?;
    Ok(Tensor::cat(&[&x.sqr()?, x, &ones, &ones], 1)?)
}

/// `[m² + v, m, 1, 1]`: expectation of the statistics when the input is
/// itself `N(m, diag(v))`
pub fn normal_sufficient_statistics_from_mean_var(mean: &Tensor, var: &Tensor) -> Result<Tensor> {
    let ones = mean.ones_like()?;
    Ok(Tensor::cat(&[&(mean.sqr()? + var)?, mean, &ones, &ones], 1)?)
}

/// Normal-Gamma prior centred at `mean`, scale `prior_strength` and
/// `E[λ] = 1 / variance`
pub(crate) fn normal_gamma_prior(
    mean: &[f64],
    variance: &[f64],
    prior_strength: f64,
    dev: &Device,
) -> Result<ExpFamilyDistribution> {
    if !(prior_strength > 0.0) {
        return Err(VbError::Config(format!(
            "prior_strength must be positive, got {}",
            prior_strength
        )));
    }
    if variance.iter().any(|&v| !(v > 0.0)) {
        return Err(VbError::InvalidArgument(
            "data variance must be positive".to_string(),
        ));
    }
    let d = mean.len();
    let rates: Vec<f64> = variance.iter().map(|v| prior_strength * v).collect();
    ExpFamilyDistribution::normal_gamma(
        mean,
        &vec![prior_strength; d],
        &vec![prior_strength; d],
        &rates,
        dev,
    )
}

/// Same as `prior` but with the mean moved by `noise_std · sqrt(variance) · ε`
pub(crate) fn jittered_normal_gamma(
    mean: &[f64],
    variance: &[f64],
    prior_strength: f64,
    noise_std: f64,
    rng: &mut rand::rngs::StdRng,
    dev: &Device,
) -> Result<ExpFamilyDistribution> {
    let d = mean.len();
    let eps = DMatrix::<f64>::rnorm(d, 1, rng);
    let moved: Vec<f64> = (0..d)
        .map(|i| mean[i] + noise_std * variance[i].sqrt() * eps[(i, 0)])
        .collect();
    normal_gamma_prior(&moved, variance, prior_strength, dev)
}

fn normal_gamma_dim(param: &BayesianParameter) -> Result<usize> {
    match param.family() {
        Family::NormalGamma { dim } => Ok(dim),
        other => Err(VbError::TypeMismatch {
            expected: "NormalGamma".to_string(),
            found: other.to_string(),
        }),
    }
}

/// Normal density with diagonal covariance whose mean and precision
/// carry a joint Normal-Gamma posterior
pub struct NormalDiagModel {
    mean_precision: BayesianParameter,
    parameters: BayesianParameterSet,
    dim: usize,
}

impl NormalDiagModel {
    pub fn new(mean_precision: BayesianParameter) -> Result<Self> {
        let dim = normal_gamma_dim(&mean_precision)?;
        Ok(Self {
            parameters: BayesianParameterSet::new(vec![mean_precision.clone()]),
            mean_precision,
            dim,
        })
    }

    /// Prior seeded from data statistics; the posterior starts at the
    /// prior, optionally with its mean jittered
    pub fn create(
        mean: &[f64],
        variance: &[f64],
        prior_strength: f64,
        noise_std: f64,
        seed: Option<u64>,
        dev: &Device,
    ) -> Result<Self> {
        if mean.len() != variance.len() {
            return Err(VbError::shape_mismatch("data mean/variance", &[mean.len()], &[variance.len()]));
        }
        let prior = normal_gamma_prior(mean, variance, prior_strength, dev)?;
        let posterior = if noise_std > 0.0 {
            let mut rng = rng_from_seed(seed);
            jittered_normal_gamma(mean, variance, prior_strength, noise_std, &mut rng, dev)?
        } else {
            prior.clone()
        };
        debug!("Normal model over {} dimensions", mean.len());
        Self::new(BayesianParameter::new(prior, posterior)?)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn mean_precision(&self) -> &BayesianParameter {
        &self.mean_precision
    }

    /// Posterior mean of the Normal's mean, `(d,)`
    pub fn mean(&self) -> Result<Tensor> {
        Ok(self.mean_precision.expected_value()?.narrow(0, 0, self.dim)?)
    }

    /// Posterior mean of the Normal's precision, `(d,)`
    pub fn precision(&self) -> Result<Tensor> {
        Ok(self.mean_precision.expected_value()?.narrow(0, self.dim, self.dim)?)
    }
}

impl BayesianModel for NormalDiagModel {
    fn type_name(&self) -> &'static str {
        "Normal"
    }

    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        check_dtype_float(data)?;
        check_frames(data, self.dim, "Normal data")?;
        let eta = self.mean_precision.posterior();
        normal_sufficient_statistics(&align(data, eta.natural_parameters())?)
    }

    fn sufficient_statistics_from_mean_var(&self, mean: &Tensor, var: &Tensor) -> Result<Tensor> {
        check_frames(mean, self.dim, "Normal input mean")?;
        check_frames(var, self.dim, "Normal input variance")?;
        let eta = self.mean_precision.posterior();
        let like = eta.natural_parameters();
        normal_sufficient_statistics_from_mean_var(&align(mean, like)?, &align(var, like)?)
    }

    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        check_frames(stats, 4 * self.dim, "Normal statistics")?;
        let expected = self.mean_precision.expected_natural_parameters()?;
        let stats = align(stats, &expected)?;
        let log_base = 0.5 * self.dim as f64 * (2.0 * PI).ln();
        Ok((stats.matmul(&expected.unsqueeze(1)?)?.squeeze(1)? - log_base)?)
    }

    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        check_frames(stats, 4 * self.dim, "Normal statistics")?;
        let mut acc = AccStats::new();
        acc.add(&self.mean_precision, weighted_column_sum(stats, weights)?)?;
        Ok(acc)
    }
}
