use crate::acc_stats::AccStats;
use crate::model_util::*;
use crate::normal::*;
use crate::traits::{BayesianModel, BayesianModelSet};

use candle_core::{DType, Device, Tensor};
use log::debug;
use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use vb_param::*;

/// `K` diagonal-covariance Normals with one Normal-Gamma parameter
/// each. The stacked `(K x 4d)` posterior expectations are cached and
/// dropped whenever one of the posteriors changes.
pub struct NormalSetModel {
    parameters: BayesianParameterSet,
    dim: usize,
    cache: Rc<RefCell<Option<Tensor>>>,
}

impl NormalSetModel {
    pub fn new(parameters: Vec<BayesianParameter>) -> Result<Self> {
        let first = parameters.first().ok_or_else(|| {
            VbError::InvalidArgument("a Normal set needs at least one component".to_string())
        })?;
        let family = first.family();
        let dim = match family {
            Family::NormalGamma { dim } => dim,
            other => {
                return Err(VbError::TypeMismatch {
                    expected: "NormalGamma".to_string(),
                    found: other.to_string(),
                })
            }
        };
        for p in parameters.iter() {
            family.check_same(&p.family())?;
        }

        let cache: Rc<RefCell<Option<Tensor>>> = Rc::new(RefCell::new(None));
        for p in parameters.iter() {
            let weak = Rc::downgrade(&cache);
            p.register_callback(Rc::new(move || {
                if let Some(cache) = weak.upgrade() {
                    cache.borrow_mut().take();
                }
            }));
        }

        Ok(Self {
            parameters: BayesianParameterSet::new(parameters),
            dim,
            cache,
        })
    }

    /// `size` components sharing the data-seeded prior; each posterior
    /// mean is jittered independently
    pub fn create(
        size: usize,
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
        let mut rng = rng_from_seed(seed);
        let parameters = (0..size)
            .map(|_| {
                let posterior =
                    jittered_normal_gamma(mean, variance, prior_strength, noise_std, &mut rng, dev)?;
                BayesianParameter::new(prior.clone(), posterior)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("Normal set of {} components over {} dimensions", size, mean.len());
        Self::new(parameters)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// `(K x 4d)` stacked `E[T]` of the posteriors
    pub fn expected_natural_parameters(&self) -> Result<Tensor> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let rows = self
            .parameters
            .iter()
            .map(|p| p.expected_natural_parameters())
            .collect::<Result<Vec<_>>>()?;
        let stacked = Tensor::stack(&rows, 0)?;
        *self.cache.borrow_mut() = Some(stacked.clone());
        Ok(stacked)
    }

    pub fn is_cached(&self) -> bool {
        self.cache.borrow().is_some()
    }
}

impl BayesianModel for NormalSetModel {
    fn type_name(&self) -> &'static str {
        "NormalSet"
    }

    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        check_dtype_float(data)?;
        check_frames(data, self.dim, "NormalSet data")?;
        let like = self.parameters[0].posterior();
        normal_sufficient_statistics(&align(data, like.natural_parameters())?)
    }

    fn sufficient_statistics_from_mean_var(&self, mean: &Tensor, var: &Tensor) -> Result<Tensor> {
        check_frames(mean, self.dim, "NormalSet input mean")?;
        check_frames(var, self.dim, "NormalSet input variance")?;
        let like = self.parameters[0].posterior();
        let like = like.natural_parameters();
        normal_sufficient_statistics_from_mean_var(&align(mean, like)?, &align(var, like)?)
    }

    /// `(N x K)`
    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        check_frames(stats, 4 * self.dim, "NormalSet statistics")?;
        let expected = self.expected_natural_parameters()?;
        let stats = align(stats, &expected)?;
        let log_base = 0.5 * self.dim as f64 * (2.0 * PI).ln();
        Ok((stats.matmul(&expected.t()?.contiguous()?)? - log_base)?)
    }

    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        check_frames(stats, 4 * self.dim, "NormalSet statistics")?;
        let weights = weights.ok_or_else(|| {
            VbError::InvalidArgument("NormalSet accumulation needs per-component weights".to_string())
        })?;
        let sums = weighted_column_sums(stats, weights, self.len())?;
        let mut acc = AccStats::new();
        for (k, p) in self.parameters.iter().enumerate() {
            acc.add(p, sums.get(k)?)?;
        }
        Ok(acc)
    }

    fn as_model_set(&self) -> Option<&dyn BayesianModelSet> {
        Some(self)
    }

    fn set_dtype(&self, dtype: DType) -> Result<()> {
        self.cache.borrow_mut().take();
        self.parameters.set_dtype(dtype)
    }

    fn set_device(&self, dev: &Device) -> Result<()> {
        self.cache.borrow_mut().take();
        self.parameters.set_device(dev)
    }
}

impl BayesianModelSet for NormalSetModel {
    fn len(&self) -> usize {
        self.parameters.len()
    }
}
