use crate::acc_stats::AccStats;
use candle_core::{DType, Device, Tensor};
use fnv::FnvHashSet;
use vb_param::{BayesianParameterSet, Result, VbError};

/// A conjugate model whose parameters are updated by natural
/// gradients computed from accumulated sufficient statistics.
///
/// One iteration on a minibatch `X (N x d)`:
/// 1. `stats = model.sufficient_statistics(X)`
/// 2. `llh = model.expected_log_likelihood(&stats)`
/// 3. `model.accumulate(&stats, None)?.apply()` then
///    `natural_grad_update` on every parameter.
pub trait BayesianModel {
    /// Registry tag of the model
    fn type_name(&self) -> &'static str;

    /// Parameters owned directly by this model
    fn bayesian_parameters(&self) -> &BayesianParameterSet;

    /// Nested models, in a fixed order
    fn sub_models(&self) -> Vec<&dyn BayesianModel> {
        vec![]
    }

    /// Per-frame statistics `(N x D)` of the data `(N x d)`
    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor>;

    /// Expected statistics of inputs that are themselves Gaussian with
    /// diagonal covariance, used when the input comes from an encoder
    fn sufficient_statistics_from_mean_var(&self, _mean: &Tensor, _var: &Tensor) -> Result<Tensor> {
        Err(VbError::NotImplemented(format!(
            "{}: statistics of Gaussian inputs",
            self.type_name()
        )))
    }

    /// `E_q[ln p(x_n | θ)]`, `(N,)` for a model and `(N, K)` for a
    /// model set
    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor>;

    /// Statistics to feed to the parameters. `weights` is `(N,)` for
    /// a model and `(N, K)` for a model set.
    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats>;

    fn as_model_set(&self) -> Option<&dyn BayesianModelSet> {
        None
    }

    /// Own parameters followed by those of the sub-models, each
    /// parameter listed once
    fn all_parameters(&self) -> BayesianParameterSet {
        let mut ret = self.bayesian_parameters().clone();
        for model in self.sub_models() {
            ret.extend(&model.all_parameters());
        }
        let mut seen = FnvHashSet::default();
        ret.iter().filter(|p| seen.insert(p.id())).cloned().collect()
    }

    /// Σ KL(posterior || prior) over every parameter
    fn kl_div_posterior_prior(&self) -> Result<f64> {
        self.all_parameters().kl_div()
    }

    /// Cast own parameters, then let each sub-model cast its own
    fn set_dtype(&self, dtype: DType) -> Result<()> {
        self.bayesian_parameters().set_dtype(dtype)?;
        for model in self.sub_models() {
            model.set_dtype(dtype)?;
        }
        Ok(())
    }

    fn set_device(&self, dev: &Device) -> Result<()> {
        self.bayesian_parameters().set_device(dev)?;
        for model in self.sub_models() {
            model.set_device(dev)?;
        }
        Ok(())
    }
}

/// `K` models evaluated jointly: the expected log-likelihood has one
/// column per component and `accumulate` takes per-component weights
pub trait BayesianModelSet: BayesianModel {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
