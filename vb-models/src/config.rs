use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use vb_param::{Result, VbError};

fn one() -> f64 {
    1.0
}

fn small_noise() -> f64 {
    0.1
}

/// `{"type": "Normal", ...}`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NormalConfig {
    #[serde(default = "one")]
    pub prior_strength: f64,
    #[serde(default)]
    pub noise_std: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `{"type": "NormalSet", "size": K, ...}`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct NormalSetConfig {
    pub size: usize,
    #[serde(default = "one")]
    pub prior_strength: f64,
    #[serde(default = "small_noise")]
    pub noise_std: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `{"type": "Mixture", "size": K, "components": {...}}`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MixtureConfig {
    pub size: usize,
    #[serde(default = "one")]
    pub prior_strength: f64,
    pub components: Value,
}

/// `{"type": "PPCA", "dim_subspace": q, ...}`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PpcaConfig {
    pub dim_subspace: usize,
    #[serde(default = "one")]
    pub prior_strength: f64,
    #[serde(default = "one")]
    pub noise_std: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// `{"type": "PLDASet", "size": K, "dim_noise_subspace": q, "dim_class_subspace": p, ...}`
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PldaSetConfig {
    pub size: usize,
    pub dim_noise_subspace: usize,
    pub dim_class_subspace: usize,
    #[serde(default = "one")]
    pub prior_strength: f64,
    #[serde(default = "one")]
    pub noise_std: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Typed view of a model configuration, unknown keys ignored
pub fn parse_config<T: DeserializeOwned>(conf: &Value, model_type: &str) -> Result<T> {
    serde_json::from_value(conf.clone())
        .map_err(|e| VbError::Config(format!("{}: {}", model_type, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_filled_in() -> Result<()> {
        let conf: NormalSetConfig = parse_config(&json!({"type": "NormalSet", "size": 4}), "NormalSet")?;
        assert_eq!(
            conf,
            NormalSetConfig {
                size: 4,
                prior_strength: 1.0,
                noise_std: 0.1,
                seed: None,
            }
        );
        let conf: NormalConfig = parse_config(&json!({"type": "Normal"}), "Normal")?;
        assert_eq!(conf.noise_std, 0.0);
        Ok(())
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        let ret: Result<PpcaConfig> = parse_config(&json!({"type": "PPCA"}), "PPCA");
        assert!(matches!(ret, Err(VbError::Config(_))));
    }
}
