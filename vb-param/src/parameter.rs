use crate::distribution::ExpFamilyDistribution;
use crate::error::{Result, VbError};
use crate::family::Family;
use crate::traits::PosteriorObserver;

use candle_core::{DType, Device, Tensor};
use log::debug;
use std::cell::RefCell;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_PARAMETER_ID: AtomicUsize = AtomicUsize::new(0);

/// Process-unique identity of a [`BayesianParameter`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ParamState {
    prior: ExpFamilyDistribution,
    posterior: ExpFamilyDistribution,
    natural_grad: Tensor,
}

struct ParamInner {
    id: ParamId,
    state: RefCell<ParamState>,
    callbacks: RefCell<Vec<Rc<dyn PosteriorObserver>>>,
}

/// A parameter with a conjugate prior and a variational posterior of
/// the same exponential family.
///
/// The value is a cheap handle: clones refer to the same parameter,
/// and equality/hashing go by identity, so a parameter can key the
/// accumulated statistics of a model.
///
/// Update protocol for one step:
/// 1. `accumulate_natural_grad(acc)` one or more times
///    (`grad += prior.η + acc - posterior.η`, additive);
/// 2. `natural_grad_update(lrate)`
///    (`posterior.η += lrate * grad`, accumulator reset, observers fired).
#[derive(Clone)]
pub struct BayesianParameter {
    inner: Rc<ParamInner>,
}

impl BayesianParameter {
    pub fn new(prior: ExpFamilyDistribution, posterior: ExpFamilyDistribution) -> Result<Self> {
        prior.family().check_same(&posterior.family())?;
        let posterior = posterior
            .to_dtype(prior.dtype())?
            .to_device(prior.device())?;
        let natural_grad = prior.natural_parameters().zeros_like()?;

        let id = ParamId(NEXT_PARAMETER_ID.fetch_add(1, Ordering::Relaxed));
        debug!("parameter {} over {}", id, prior.family());

        Ok(Self {
            inner: Rc::new(ParamInner {
                id,
                state: RefCell::new(ParamState {
                    prior,
                    posterior,
                    natural_grad,
                }),
                callbacks: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Posterior initialised to the prior
    pub fn from_prior(prior: ExpFamilyDistribution) -> Result<Self> {
        Self::new(prior.clone(), prior)
    }

    pub fn id(&self) -> ParamId {
        self.inner.id
    }

    pub fn family(&self) -> Family {
        self.inner.state.borrow().prior.family()
    }

    pub fn prior(&self) -> ExpFamilyDistribution {
        self.inner.state.borrow().prior.clone()
    }

    pub fn posterior(&self) -> ExpFamilyDistribution {
        self.inner.state.borrow().posterior.clone()
    }

    pub fn natural_grad(&self) -> Tensor {
        self.inner.state.borrow().natural_grad.clone()
    }

    pub fn dtype(&self) -> DType {
        self.inner.state.borrow().prior.dtype()
    }

    pub fn device(&self) -> Device {
        self.inner.state.borrow().prior.device().clone()
    }

    /// Register an observer; registering the same handle twice is a
    /// no-op. Observers fire in registration order.
    pub fn register_callback(&self, callback: Rc<dyn PosteriorObserver>) {
        let mut callbacks = self.inner.callbacks.borrow_mut();
        let known = callbacks
            .iter()
            .any(|c| std::ptr::addr_eq(Rc::as_ptr(c), Rc::as_ptr(&callback)));
        if !known {
            callbacks.push(callback);
        }
    }

    pub fn num_callbacks(&self) -> usize {
        self.inner.callbacks.borrow().len()
    }

    /// E[θ] under the posterior
    pub fn expected_value(&self) -> Result<Tensor> {
        self.inner.state.borrow().posterior.expected_value()
    }

    /// E[T(θ)] under the posterior, the natural form of the parameter
    /// as seen by the likelihood
    pub fn expected_natural_parameters(&self) -> Result<Tensor> {
        self.inner
            .state
            .borrow()
            .posterior
            .expected_sufficient_statistics()
    }

    /// `grad += prior.η + acc_stats - posterior.η`, outside of any
    /// autodiff graph. Fails without touching the accumulator if
    /// `acc_stats` does not have the shape of the natural parameters.
    pub fn accumulate_natural_grad(&self, acc_stats: &Tensor) -> Result<()> {
        let new_grad = {
            let state = self.inner.state.borrow();
            let expected = state.prior.natural_parameters().dims();
            if acc_stats.dims() != expected {
                return Err(VbError::shape_mismatch(
                    format!("accumulated statistics of parameter {}", self.id()),
                    expected,
                    acc_stats.dims(),
                ));
            }
            let acc = acc_stats
                .detach()
                .to_dtype(state.natural_grad.dtype())?
                .to_device(state.natural_grad.device())?;
            let delta = ((state.prior.natural_parameters() + acc)?
                - state.posterior.natural_parameters())?;
            (&state.natural_grad + delta)?.detach()
        };
        self.inner.state.borrow_mut().natural_grad = new_grad;
        Ok(())
    }

    /// `posterior.η += lrate * grad`, then clear the accumulator and
    /// notify the observers. Nothing changes if the step would leave
    /// an improper posterior.
    pub fn natural_grad_update(&self, lrate: f64) -> Result<()> {
        if !(lrate.is_finite() && lrate > 0.0) {
            return Err(VbError::InvalidArgument(format!(
                "learning rate must be positive, got {}",
                lrate
            )));
        }
        {
            let mut state = self.inner.state.borrow_mut();
            let updated = (state.posterior.natural_parameters() + (&state.natural_grad * lrate)?)?;
            let posterior = state.posterior.with_natural_parameters(updated.detach())?;
            let cleared = state.natural_grad.zeros_like()?;
            state.posterior = posterior;
            state.natural_grad = cleared;
        }
        debug!("parameter {} updated (lrate = {})", self.id(), lrate);
        self.dispatch();
        Ok(())
    }

    fn dispatch(&self) {
        let callbacks = self.inner.callbacks.borrow().clone();
        for callback in callbacks {
            callback.on_posterior_changed();
        }
    }

    /// Start a new accumulation cycle
    pub fn zero_natural_grad(&self) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();
        state.natural_grad = state.natural_grad.zeros_like()?;
        Ok(())
    }

    /// KL(posterior || prior)
    pub fn kl_div(&self) -> Result<f64> {
        let state = self.inner.state.borrow();
        ExpFamilyDistribution::kl_div(&state.posterior, &state.prior)
    }

    /// Re-represent prior, posterior and accumulator in `dtype`
    pub fn set_dtype(&self, dtype: DType) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();
        let prior = state.prior.to_dtype(dtype)?;
        let posterior = state.posterior.to_dtype(dtype)?;
        let natural_grad = state.natural_grad.to_dtype(dtype)?;
        *state = ParamState {
            prior,
            posterior,
            natural_grad,
        };
        Ok(())
    }

    /// Move prior, posterior and accumulator to `dev`
    pub fn set_device(&self, dev: &Device) -> Result<()> {
        let mut state = self.inner.state.borrow_mut();
        let prior = state.prior.to_device(dev)?;
        let posterior = state.posterior.to_device(dev)?;
        let natural_grad = state.natural_grad.to_device(dev)?;
        *state = ParamState {
            prior,
            posterior,
            natural_grad,
        };
        Ok(())
    }
}

impl PartialEq for BayesianParameter {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for BayesianParameter {}

impl Hash for BayesianParameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl std::fmt::Debug for BayesianParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayesianParameter")
            .field("id", &self.id())
            .field("family", &self.family())
            .finish()
    }
}
