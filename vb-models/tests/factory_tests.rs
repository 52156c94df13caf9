use candle_core::{Device, Tensor};
use serde_json::{json, Value};
use vb_models::factory::*;
use vb_models::traits::BayesianModel;
use vb_models::NormalDiagModel;
use vb_param::{Result, VbError};

fn data_statistics() -> Result<(Tensor, Tensor)> {
    let dev = Device::Cpu;
    Ok((
        Tensor::new(&[1.0f64, -1.0, 0.5], &dev)?,
        Tensor::new(&[2.0f64, 1.0, 0.25], &dev)?,
    ))
}

#[test]
fn normal_is_seeded_from_data_statistics() -> Result<()> {
    let (mean, var) = data_statistics()?;
    let model = create_model(&json!({"type": "Normal"}), &mean, &var)?;
    assert_eq!(model.type_name(), "Normal");
    assert!(!model.bayesian_parameters().is_empty());

    let param = &model.bayesian_parameters()[0];
    let prior_mean = param.prior().expected_value()?.narrow(0, 0, 3)?.to_vec1::<f64>()?;
    let prior_precision = param.prior().expected_value()?.narrow(0, 3, 3)?.to_vec1::<f64>()?;
    for i in 0..3 {
        approx::assert_abs_diff_eq!(prior_mean[i], [1.0, -1.0, 0.5][i], epsilon = 1e-10);
        approx::assert_abs_diff_eq!(prior_precision[i], 1.0 / [2.0, 1.0, 0.25][i], epsilon = 1e-10);
    }
    // no jitter by default
    assert_eq!(
        param.posterior().natural_parameters().to_vec1::<f64>()?,
        param.prior().natural_parameters().to_vec1::<f64>()?
    );
    Ok(())
}

#[test]
fn unknown_type_is_rejected() -> Result<()> {
    let (mean, var) = data_statistics()?;
    let ret = create_model(&json!({"type": "Bogus"}), &mean, &var);
    assert!(matches!(ret, Err(VbError::UnknownType(t)) if t == "Bogus"));
    Ok(())
}

#[test]
fn placeholders_are_not_implemented() -> Result<()> {
    let (mean, var) = data_statistics()?;
    for tag in ["HMM", "VAE"] {
        let ret = create_model(&json!({"type": tag}), &mean, &var);
        assert!(matches!(ret, Err(VbError::NotImplemented(_))));
    }
    Ok(())
}

#[test]
fn configuration_needs_a_type() -> Result<()> {
    let (mean, var) = data_statistics()?;
    assert!(matches!(
        create_model(&json!({"size": 2}), &mean, &var),
        Err(VbError::Config(_))
    ));
    assert!(matches!(
        create_model(&json!({"type": 3}), &mean, &var),
        Err(VbError::Config(_))
    ));
    assert!(matches!(
        create_model(&json!({"type": "NormalSet"}), &mean, &var),
        Err(VbError::Config(_))
    ));
    Ok(())
}

#[test]
fn nested_mixture_is_resolved() -> Result<()> {
    let (mean, var) = data_statistics()?;
    let conf = json!({
        "type": "Mixture",
        "size": 3,
        "components": {"type": "NormalSet", "size": 3, "seed": 1}
    });
    let model = create_model(&conf, &mean, &var)?;
    assert_eq!(model.type_name(), "Mixture");
    assert_eq!(model.sub_models().len(), 1);
    // Dirichlet weights + 3 Normal-Gamma components
    assert_eq!(model.all_parameters().len(), 4);

    let mismatch = json!({
        "type": "Mixture",
        "size": 2,
        "components": {"type": "NormalSet", "size": 3}
    });
    assert!(matches!(create_model(&mismatch, &mean, &var), Err(VbError::Config(_))));

    let not_a_set = json!({
        "type": "Mixture",
        "size": 1,
        "components": {"type": "Normal"}
    });
    assert!(matches!(create_model(&not_a_set, &mean, &var), Err(VbError::Config(_))));
    Ok(())
}

#[test]
fn subspace_models_are_built() -> Result<()> {
    let (mean, var) = data_statistics()?;
    let ppca = create_model(&json!({"type": "PPCA", "dim_subspace": 2, "seed": 3}), &mean, &var)?;
    assert_eq!(ppca.bayesian_parameters().len(), 3);

    let conf = json!({
        "type": "PLDASet",
        "size": 4,
        "dim_noise_subspace": 2,
        "dim_class_subspace": 1,
        "seed": 3
    });
    let plda = create_model(&conf, &mean, &var)?;
    assert_eq!(plda.as_model_set().map(|s| s.len()), Some(4));
    // mean, precision, two subspaces and one latent per class
    assert_eq!(plda.bayesian_parameters().len(), 8);
    Ok(())
}

fn create_fixed_normal(
    _conf: &Value,
    mean: &Tensor,
    _variance: &Tensor,
    _resolver: &dyn ModelResolver,
) -> Result<Box<dyn BayesianModel>> {
    let d = mean.dims()[0];
    Ok(Box::new(NormalDiagModel::create(
        &vec![0.0; d],
        &vec![1.0; d],
        1.0,
        0.0,
        None,
        mean.device(),
    )?))
}

#[test]
fn custom_registry() -> Result<()> {
    let (mean, var) = data_statistics()?;
    let mut factory = ModelFactory::new();
    assert!(factory.registered_types().is_empty());
    factory.register("Fixed", create_fixed_normal);
    factory.register_placeholder("Later");
    assert_eq!(factory.registered_types(), vec!["Fixed", "Later"]);

    assert!(factory.create(&json!({"type": "Fixed"}), &mean, &var).is_ok());
    assert!(matches!(
        factory.create(&json!({"type": "Later"}), &mean, &var),
        Err(VbError::NotImplemented(_))
    ));
    assert!(matches!(
        factory.create(&json!({"type": "Normal"}), &mean, &var),
        Err(VbError::UnknownType(_))
    ));

    let standard = ModelFactory::default().registered_types();
    assert_eq!(
        standard,
        vec!["HMM", "Mixture", "Normal", "NormalSet", "PLDASet", "PPCA", "VAE"]
    );
    Ok(())
}
