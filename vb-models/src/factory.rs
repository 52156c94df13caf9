use crate::config::*;
use crate::mixture::MixtureModel;
use crate::normal::NormalDiagModel;
use crate::normal_set::NormalSetModel;
use crate::plda::PldaSetModel;
use crate::ppca::PpcaModel;
use crate::traits::BayesianModel;

use candle_core::Tensor;
use fnv::FnvHashMap;
use log::info;
use matrix_util::tensor_util::host_vec;
use serde_json::Value;
use vb_param::{Result, VbError};

/// Builds nested models from their configuration
pub trait ModelResolver {
    fn resolve(&self, conf: &Value, mean: &Tensor, variance: &Tensor) -> Result<Box<dyn BayesianModel>>;
}

/// `(conf, mean, variance, resolver) -> model`
pub type ModelConstructor =
    fn(&Value, &Tensor, &Tensor, &dyn ModelResolver) -> Result<Box<dyn BayesianModel>>;

/// Registry from the configuration `type` tag to a constructor. Tags
/// registered without a constructor are known but cannot be built from
/// a configuration.
pub struct ModelFactory {
    registry: FnvHashMap<String, Option<ModelConstructor>>,
}

impl ModelFactory {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            registry: FnvHashMap::default(),
        }
    }

    pub fn register(&mut self, model_type: &str, constructor: ModelConstructor) {
        self.registry.insert(model_type.to_string(), Some(constructor));
    }

    pub fn register_placeholder(&mut self, model_type: &str) {
        self.registry.insert(model_type.to_string(), None);
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut ret: Vec<String> = self.registry.keys().cloned().collect();
        ret.sort();
        ret
    }

    pub fn create(&self, conf: &Value, mean: &Tensor, variance: &Tensor) -> Result<Box<dyn BayesianModel>> {
        let model_type = conf
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| VbError::Config(format!("configuration without a string `type`: {}", conf)))?;

        match self.registry.get(model_type) {
            None => Err(VbError::UnknownType(model_type.to_string())),
            Some(None) => Err(VbError::NotImplemented(model_type.to_string())),
            Some(Some(constructor)) => {
                info!("creating a {} model", model_type);
                constructor(conf, mean, variance, self)
            }
        }
    }
}

impl Default for ModelFactory {
    /// Registry with every model buildable from a configuration
    fn default() -> Self {
        let mut factory = Self::new();
        factory.register("Normal", create_normal);
        factory.register("NormalSet", create_normal_set);
        factory.register("Mixture", create_mixture);
        factory.register("PPCA", create_ppca);
        factory.register("PLDASet", create_plda_set);
        factory.register_placeholder("HMM");
        factory.register_placeholder("VAE");
        factory
    }
}

impl ModelResolver for ModelFactory {
    fn resolve(&self, conf: &Value, mean: &Tensor, variance: &Tensor) -> Result<Box<dyn BayesianModel>> {
        self.create(conf, mean, variance)
    }
}

/// Build a model with the standard registry
///
/// * `conf` - `{"type": ..., ...}`
/// * `mean` - per-dimension data mean `(d,)`
/// * `variance` - per-dimension data variance `(d,)`
pub fn create_model(conf: &Value, mean: &Tensor, variance: &Tensor) -> Result<Box<dyn BayesianModel>> {
    ModelFactory::default().create(conf, mean, variance)
}

fn data_statistics(mean: &Tensor, variance: &Tensor) -> Result<(Vec<f64>, Vec<f64>)> {
    if mean.rank() != 1 || mean.dims() != variance.dims() {
        return Err(VbError::shape_mismatch(
            "data mean/variance",
            mean.dims(),
            variance.dims(),
        ));
    }
    Ok((host_vec(mean)?, host_vec(variance)?))
}

fn create_normal(
    conf: &Value,
    mean: &Tensor,
    variance: &Tensor,
    _resolver: &dyn ModelResolver,
) -> Result<Box<dyn BayesianModel>> {
    let conf: NormalConfig = parse_config(conf, "Normal")?;
    let (m, v) = data_statistics(mean, variance)?;
    Ok(Box::new(NormalDiagModel::create(
        &m,
        &v,
        conf.prior_strength,
        conf.noise_std,
        conf.seed,
        mean.device(),
    )?))
}

fn create_normal_set(
    conf: &Value,
    mean: &Tensor,
    variance: &Tensor,
    _resolver: &dyn ModelResolver,
) -> Result<Box<dyn BayesianModel>> {
    let conf: NormalSetConfig = parse_config(conf, "NormalSet")?;
    let (m, v) = data_statistics(mean, variance)?;
    Ok(Box::new(NormalSetModel::create(
        conf.size,
        &m,
        &v,
        conf.prior_strength,
        conf.noise_std,
        conf.seed,
        mean.device(),
    )?))
}

fn create_mixture(
    conf: &Value,
    mean: &Tensor,
    variance: &Tensor,
    resolver: &dyn ModelResolver,
) -> Result<Box<dyn BayesianModel>> {
    let conf: MixtureConfig = parse_config(conf, "Mixture")?;
    let components = resolver.resolve(&conf.components, mean, variance)?;
    match components.as_model_set().map(|set| set.len()) {
        Some(len) if len == conf.size => {}
        Some(len) => {
            return Err(VbError::Config(format!(
                "Mixture of size {} over {} components",
                conf.size, len
            )))
        }
        None => {
            return Err(VbError::Config(format!(
                "Mixture components must form a model set, got {}",
                components.type_name()
            )))
        }
    }
    Ok(Box::new(MixtureModel::create(
        components,
        conf.prior_strength,
        mean.device(),
    )?))
}

fn create_ppca(
    conf: &Value,
    mean: &Tensor,
    variance: &Tensor,
    _resolver: &dyn ModelResolver,
) -> Result<Box<dyn BayesianModel>> {
    let conf: PpcaConfig = parse_config(conf, "PPCA")?;
    let (m, v) = data_statistics(mean, variance)?;
    Ok(Box::new(PpcaModel::create(
        &m,
        &v,
        conf.dim_subspace,
        conf.prior_strength,
        conf.noise_std,
        conf.seed,
        mean.device(),
    )?))
}

fn create_plda_set(
    conf: &Value,
    mean: &Tensor,
    variance: &Tensor,
    _resolver: &dyn ModelResolver,
) -> Result<Box<dyn BayesianModel>> {
    let conf: PldaSetConfig = parse_config(conf, "PLDASet")?;
    let (m, v) = data_statistics(mean, variance)?;
    Ok(Box::new(PldaSetModel::create(
        conf.size,
        &m,
        &v,
        conf.dim_noise_subspace,
        conf.dim_class_subspace,
        conf.prior_strength,
        conf.noise_std,
        conf.seed,
        mean.device(),
    )?))
}
