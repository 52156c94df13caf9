use approx::assert_abs_diff_eq;
use candle_core::{Device, Tensor};
use vb_models::*;
use vb_param::Result;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn three_state_hmm(dev: &Device) -> Result<HmmModel> {
    let emissions = NormalSetModel::create(3, &[0.0, 1.0], &[1.0, 2.0], 1.0, 1.0, Some(5), dev)?;
    let hmm = HmmModel::create_ergodic(Box::new(emissions), 1.0, dev)?;

    // move the transitions away from the symmetric prior
    let counts = [
        [4.0f64, 1.0, 0.0],
        [0.0, 2.0, 3.0],
        [1.0, 0.5, 6.0],
    ];
    for (row, c) in hmm.transitions().iter().zip(counts.iter()) {
        row.accumulate_natural_grad(&Tensor::new(c, dev)?)?;
        row.natural_grad_update(1.0)?;
    }
    Ok(hmm)
}

fn brute_force_log_evidence(log_init: &[f64], log_a: &[Vec<f64>], log_emission: &[Vec<f64>]) -> f64 {
    let k = log_init.len();
    let nframes = log_emission.len();
    let npaths = k.pow(nframes as u32);
    let mut terms = Vec::with_capacity(npaths);
    for code in 0..npaths {
        let path: Vec<usize> = (0..nframes).map(|t| (code / k.pow(t as u32)) % k).collect();
        let mut score = log_init[path[0]] + log_emission[0][path[0]];
        for t in 1..nframes {
            score += log_a[path[t - 1]][path[t]] + log_emission[t][path[t]];
        }
        terms.push(score);
    }
    let max = terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    max + terms.iter().map(|s| (s - max).exp()).sum::<f64>().ln()
}

#[test]
fn forward_pass_matches_path_enumeration() -> Result<()> {
    init_logger();
    let dev = Device::Cpu;
    let hmm = three_state_hmm(&dev)?;
    let x = Tensor::new(&[[0.1f64, 1.0], [1.5, -0.3], [-0.7, 2.2], [0.4, 0.4]], &dev)?;
    let stats = hmm.sufficient_statistics(&x)?;

    let log_emission = hmm.emissions().expected_log_likelihood(&stats)?.to_vec2::<f64>()?;
    let log_transition = hmm.log_transition_matrix()?;
    let log_a: Vec<Vec<f64>> = (0..3)
        .map(|i| (0..3).map(|j| log_transition[(i, j)]).collect())
        .collect();
    let expected = brute_force_log_evidence(&hmm.log_init(), &log_a, &log_emission);

    let per_frame = hmm.expected_log_likelihood(&stats)?.to_vec1::<f64>()?;
    assert_eq!(per_frame.len(), 4);
    assert_abs_diff_eq!(per_frame.iter().sum::<f64>(), expected, epsilon = 1e-9);
    Ok(())
}

#[test]
fn state_posteriors_are_normalised() -> Result<()> {
    let dev = Device::Cpu;
    let hmm = three_state_hmm(&dev)?;
    let x = Tensor::new(&[[0.1f64, 1.0], [1.5, -0.3], [-0.7, 2.2]], &dev)?;
    let stats = hmm.sufficient_statistics(&x)?;
    for row in hmm.state_posteriors(&stats)?.to_vec2::<f64>()? {
        assert_eq!(row.len(), 3);
        assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-10);
    }
    Ok(())
}

#[test]
fn training_step_updates_transitions_and_emissions() -> Result<()> {
    init_logger();
    let dev = Device::Cpu;
    let hmm = three_state_hmm(&dev)?;
    let x = Tensor::new(
        &[[0.1f64, 1.0], [0.2, 0.9], [3.0, -2.0], [3.1, -2.2], [0.0, 1.1]],
        &dev,
    )?;
    // three transition rows followed by three emission components
    let parameters = hmm.all_parameters();
    assert_eq!(parameters.len(), 6);

    let stats = hmm.sufficient_statistics(&x)?;
    let acc = hmm.accumulate(&stats, None)?;
    assert_eq!(acc.len(), 6);
    let transitions: f64 = hmm
        .transitions()
        .iter()
        .filter_map(|row| acc.get(row))
        .map(|t| t.sum_all().and_then(|s| s.to_scalar::<f64>()))
        .sum::<candle_core::Result<f64>>()?;
    assert_abs_diff_eq!(transitions, 4.0, epsilon = 1e-9);

    let optimizer = VbOptimizer::new(parameters, 1.0)?;
    optimizer.init_step()?;
    let elbo = evidence_lower_bound(&hmm, &x, 5)?;
    assert!(elbo.value_f64()?.is_finite());
    elbo.natural_backward()?;
    optimizer.step()?;
    assert!(hmm.kl_div_posterior_prior()?.is_finite());
    Ok(())
}

/// `Σ_t` of the per-frame bound for latent inputs `N(mean, var)`
fn latent_bound(hmm: &HmmModel, mean: &Tensor, var: &Tensor) -> Result<Tensor> {
    let stats = hmm.sufficient_statistics_from_mean_var(mean, var)?;
    Ok(hmm.expected_log_likelihood(&stats)?.sum_all()?)
}

#[test]
fn bound_is_differentiable_in_latent_inputs() -> Result<()> {
    let dev = Device::Cpu;
    let hmm = three_state_hmm(&dev)?;
    let mean = Tensor::new(&[[0.1f64, 1.0], [1.5, -0.3], [-0.7, 2.2]], &dev)?;
    let var = Tensor::new(&[[0.5f64, 0.2], [1.0, 0.3], [0.1, 0.4]], &dev)?;

    let mean_var = candle_core::Var::from_tensor(&mean)?;
    let grads = latent_bound(&hmm, mean_var.as_tensor(), &var)?.backward()?;
    let grad = grads
        .get(mean_var.as_tensor())
        .map(|g| g.to_vec2::<f64>())
        .transpose()?
        .unwrap_or_default();
    assert_eq!(grad.len(), 3);

    // central differences on every entry of the mean
    let h = 1e-5;
    let base = mean.to_vec2::<f64>()?;
    for n in 0..3 {
        for i in 0..2 {
            let shifted = |delta: f64| -> Result<f64> {
                let mut xx: Vec<f64> = base.iter().flatten().copied().collect();
                xx[2 * n + i] += delta;
                let xx = Tensor::from_vec(xx, (3, 2), &dev)?;
                Ok(latent_bound(&hmm, &xx, &var)?.to_scalar::<f64>()?)
            };
            let numeric = (shifted(h)? - shifted(-h)?) / (2.0 * h);
            assert_abs_diff_eq!(grad[n][i], numeric, epsilon = 1e-5);
        }
    }
    Ok(())
}
