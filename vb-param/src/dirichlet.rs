//! Dirichlet over the probability simplex
//!
//! η = α - 1, T(π) = ln π, A(η) = Σ lnΓ(α) - lnΓ(Σα)

use crate::error::{Result, VbError};
use special::Gamma;

pub fn natural_from_standard(alphas: &[f64]) -> Result<Vec<f64>> {
    check_alphas(alphas)?;
    Ok(alphas.iter().map(|a| a - 1.0).collect())
}

pub fn standard_from_natural(eta: &[f64]) -> Result<Vec<f64>> {
    let alphas: Vec<f64> = eta.iter().map(|x| x + 1.0).collect();
    check_alphas(&alphas)?;
    Ok(alphas)
}

fn check_alphas(alphas: &[f64]) -> Result<()> {
    if alphas.iter().any(|&a| !(a > 0.0)) {
        return Err(VbError::InvalidArgument(format!(
            "Dirichlet concentrations must be positive: {:?}",
            alphas
        )));
    }
    Ok(())
}

pub fn log_norm(eta: &[f64]) -> Result<f64> {
    let alphas = standard_from_natural(eta)?;
    let alpha_tot: f64 = alphas.iter().sum();
    Ok(alphas.iter().map(|a| a.ln_gamma().0).sum::<f64>() - alpha_tot.ln_gamma().0)
}

/// E[ln π_k] = ψ(α_k) - ψ(Σα)
pub fn expected_sufficient_statistics(eta: &[f64]) -> Result<Vec<f64>> {
    let alphas = standard_from_natural(eta)?;
    let digamma_tot = alphas.iter().sum::<f64>().digamma();
    Ok(alphas.iter().map(|a| a.digamma() - digamma_tot).collect())
}

pub fn expected_value(eta: &[f64]) -> Result<Vec<f64>> {
    let alphas = standard_from_natural(eta)?;
    let alpha_tot: f64 = alphas.iter().sum();
    Ok(alphas.iter().map(|a| a / alpha_tot).collect())
}

pub fn sufficient_statistics(pi: &[f64]) -> Result<Vec<f64>> {
    if pi.iter().any(|&p| !(p > 0.0)) {
        return Err(VbError::InvalidArgument(
            "Dirichlet support is the open simplex".to_string(),
        ));
    }
    Ok(pi.iter().map(|p| p.ln()).collect())
}
