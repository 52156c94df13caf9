use crate::acc_stats::AccStats;
use crate::traits::BayesianModel;

use candle_core::{Device, Tensor};
use candle_util::candle_loss_functions::log_sum_exp;
use log::debug;
use vb_param::*;

/// Finite mixture: Dirichlet weights over a model set
///
/// ln p(x) ≥ ln Σ_k exp(E[ln π_k] + E[ln p(x | θ_k)])
pub struct MixtureModel {
    weights: BayesianParameter,
    parameters: BayesianParameterSet,
    components: Box<dyn BayesianModel>,
    size: usize,
}

impl MixtureModel {
    /// `components` must be a model set with as many components as the
    /// Dirichlet has dimensions
    pub fn new(weights: BayesianParameter, components: Box<dyn BayesianModel>) -> Result<Self> {
        let size = match weights.family() {
            Family::Dirichlet { dim } => dim,
            other => {
                return Err(VbError::TypeMismatch {
                    expected: "Dirichlet".to_string(),
                    found: other.to_string(),
                })
            }
        };
        let num_components = components
            .as_model_set()
            .map(|set| set.len())
            .ok_or_else(|| VbError::TypeMismatch {
                expected: "a model set".to_string(),
                found: components.type_name().to_string(),
            })?;
        if num_components != size {
            return Err(VbError::shape_mismatch(
                "mixture components",
                &[size],
                &[num_components],
            ));
        }
        Ok(Self {
            parameters: BayesianParameterSet::new(vec![weights.clone()]),
            weights,
            components,
            size,
        })
    }

    /// Symmetric Dirichlet prior `prior_strength · 1`; the posterior
    /// starts at the prior
    pub fn create(
        components: Box<dyn BayesianModel>,
        prior_strength: f64,
        dev: &Device,
    ) -> Result<Self> {
        if !(prior_strength > 0.0) {
            return Err(VbError::Config(format!(
                "prior_strength must be positive, got {}",
                prior_strength
            )));
        }
        let size = components
            .as_model_set()
            .map(|set| set.len())
            .ok_or_else(|| VbError::TypeMismatch {
                expected: "a model set".to_string(),
                found: components.type_name().to_string(),
            })?;
        let prior = ExpFamilyDistribution::dirichlet(&vec![prior_strength; size], dev)?;
        debug!("mixture of {} {} components", size, components.type_name());
        Self::new(BayesianParameter::from_prior(prior)?, components)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn weights(&self) -> &BayesianParameter {
        &self.weights
    }

    pub fn components(&self) -> &dyn BayesianModel {
        self.components.as_ref()
    }

    /// `E[ln π_k] + E[ln p(x_n | θ_k)]`, `(N x K)`
    fn log_weighted_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        let per_component = self.components.expected_log_likelihood(stats)?;
        let log_weights = self.weights.expected_natural_parameters()?;
        let log_weights = log_weights
            .to_dtype(per_component.dtype())?
            .to_device(per_component.device())?;
        Ok(per_component.broadcast_add(&log_weights.unsqueeze(0)?)?)
    }

    /// Per-frame responsibilities `(N x K)`, each row summing to one
    pub fn posteriors(&self, stats: &Tensor) -> Result<Tensor> {
        let per_component = self.log_weighted_likelihood(stats)?;
        Ok(candle_nn::ops::softmax(&per_component, 1)?)
    }
}

impl BayesianModel for MixtureModel {
    fn type_name(&self) -> &'static str {
        "Mixture"
    }

    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sub_models(&self) -> Vec<&dyn BayesianModel> {
        vec![self.components.as_ref()]
    }

    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        self.components.sufficient_statistics(data)
    }

    fn sufficient_statistics_from_mean_var(&self, mean: &Tensor, var: &Tensor) -> Result<Tensor> {
        self.components.sufficient_statistics_from_mean_var(mean, var)
    }

    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        log_sum_exp(&self.log_weighted_likelihood(stats)?, 1).map_err(VbError::from)
    }

    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        let mut resp = self.posteriors(stats)?.detach();
        if let Some(w) = weights {
            let n = resp.dims()[0];
            if w.dims() != [n] {
                return Err(VbError::shape_mismatch("per-frame weights", &[n], w.dims()));
            }
            let w = w.to_dtype(resp.dtype())?.to_device(resp.device())?;
            resp = resp.broadcast_mul(&w.unsqueeze(1)?)?;
        }
        let mut acc = AccStats::new();
        acc.add(&self.weights, resp.sum(0)?)?;
        acc.merge(self.components.accumulate(stats, Some(&resp))?)?;
        Ok(acc)
    }
}
