use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_normal_heads::MlpNormalDiag;
use vb_models::*;
use vb_param::{Result, VbError};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build_vae(varmap: &VarMap, dev: &Device) -> Result<Vae> {
    let vs = VarBuilder::from_varmap(varmap, DType::F64, dev);
    let encoder = MlpNormalDiag::new(3, 2, &[8], vs.pp("enc"))?;
    let decoder = MlpNormalDiag::new(2, 3, &[8], vs.pp("dec"))?;
    let latent = NormalDiagModel::create(&[0.0, 0.0], &[1.0, 1.0], 1.0, 0.0, None, dev)?;
    Vae::new(Box::new(encoder), Box::new(decoder), Box::new(latent), 2)
}

#[test]
fn elbo_reaches_encoder_weights() -> Result<()> {
    init_logger();
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let vae = build_vae(&varmap, &dev)?;
    let x = Tensor::new(
        &[[0.5f64, -1.0, 2.0], [0.0, 0.3, 1.0], [1.2, -0.4, 0.1], [-2.0, 0.0, 0.7]],
        &dev,
    )?;

    let elbo = evidence_lower_bound(&vae, &x, 20)?;
    assert!(elbo.value_f64()?.is_finite());

    let grads = elbo.value().neg()?.backward()?;
    let data = varmap.data().lock().map_err(|e| VbError::InvalidArgument(e.to_string()))?;
    let encoder_vars: Vec<_> = data
        .iter()
        .filter(|(name, _)| name.starts_with("enc"))
        .collect();
    assert!(!encoder_vars.is_empty());
    for (name, var) in encoder_vars {
        assert!(grads.get(var.as_tensor()).is_some(), "no gradient for {}", name);
    }
    Ok(())
}

#[test]
fn latent_model_is_trained_by_natural_gradients() -> Result<()> {
    init_logger();
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let vae = build_vae(&varmap, &dev)?;
    let x = Tensor::new(&[[0.5f64, -1.0, 2.0], [0.0, 0.3, 1.0]], &dev)?;

    // the network weights are not conjugate parameters
    assert!(vae.bayesian_parameters().is_empty());
    let parameters = vae.all_parameters();
    assert_eq!(parameters.len(), 1);

    let optimizer = VbOptimizer::new(parameters, 0.1)?;
    optimizer.init_step()?;
    let elbo = evidence_lower_bound(&vae, &x, 2)?;
    assert_eq!(elbo.acc_stats().len(), 1);
    elbo.natural_backward()?;
    optimizer.step()?;
    assert!(vae.kl_div_posterior_prior()? > 0.0);
    Ok(())
}

#[test]
fn mismatched_networks_are_rejected() -> Result<()> {
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F64, &dev);
    let encoder = MlpNormalDiag::new(3, 2, &[4], vs.pp("enc"))?;
    let decoder = MlpNormalDiag::new(4, 3, &[4], vs.pp("dec"))?;
    let latent = NormalDiagModel::create(&[0.0, 0.0], &[1.0, 1.0], 1.0, 0.0, None, &dev)?;
    assert!(matches!(
        Vae::new(Box::new(encoder), Box::new(decoder), Box::new(latent), 1),
        Err(VbError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn sequence_latent_passes_gradient_to_encoder() -> Result<()> {
    init_logger();
    let dev = Device::Cpu;
    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F64, &dev);
    let encoder = MlpNormalDiag::new(3, 2, &[8], vs.pp("enc"))?;
    let decoder = MlpNormalDiag::new(2, 3, &[8], vs.pp("dec"))?;
    let emissions = NormalSetModel::create(2, &[0.0, 0.0], &[1.0, 1.0], 1.0, 1.0, Some(9), &dev)?;
    let latent = HmmModel::create_ergodic(Box::new(emissions), 1.0, &dev)?;
    let vae = Vae::new(Box::new(encoder), Box::new(decoder), Box::new(latent), 1)?;

    let x = Tensor::new(&[[0.5f64, -1.0, 2.0], [0.0, 0.3, 1.0], [1.2, -0.4, 0.1]], &dev)?;

    // only the latent term: E_q[ln p(z)] through the HMM bound
    let q = vae.encode(&x, false)?;
    let latent_stats = vae.latent().sufficient_statistics_from_mean_var(q.mean(), q.var())?;
    let latent_bound = vae.latent().expected_log_likelihood(&latent_stats)?.sum_all()?;
    let grads = latent_bound.backward()?;

    let data = varmap.data().lock().map_err(|e| VbError::InvalidArgument(e.to_string()))?;
    let mean_head = data
        .get("enc.mean.weight")
        .ok_or_else(|| VbError::InvalidArgument("missing encoder mean head".to_string()))?;
    let grad = grads
        .get(mean_head.as_tensor())
        .ok_or_else(|| VbError::InvalidArgument("no gradient for the encoder".to_string()))?;
    let norm = grad.sqr()?.sum_all()?.to_scalar::<f64>()?;
    assert!(norm > 0.0);

    let elbo = evidence_lower_bound(&vae, &x, 3)?;
    assert!(elbo.value_f64()?.is_finite());
    Ok(())
}
