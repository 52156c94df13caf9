//! Independent Gamma variables with shape `a` and rate `b`
//!
//! η = [-b, a - 1], T(λ) = [λ, ln λ], A(η) = Σ lnΓ(a) - a ln b

use crate::error::{Result, VbError};
use special::Gamma;

pub fn natural_from_standard(shapes: &[f64], rates: &[f64]) -> Result<Vec<f64>> {
    if shapes.len() != rates.len() {
        return Err(VbError::shape_mismatch(
            "Gamma shape/rate",
            &[shapes.len()],
            &[rates.len()],
        ));
    }
    check_positive(shapes, rates)?;
    Ok(rates
        .iter()
        .map(|b| -b)
        .chain(shapes.iter().map(|a| a - 1.0))
        .collect())
}

pub fn standard_from_natural(eta: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let dim = eta.len() / 2;
    let rates: Vec<f64> = eta[..dim].iter().map(|x| -x).collect();
    let shapes: Vec<f64> = eta[dim..].iter().map(|x| x + 1.0).collect();
    check_positive(&shapes, &rates)?;
    Ok((shapes, rates))
}

fn check_positive(shapes: &[f64], rates: &[f64]) -> Result<()> {
    if shapes.iter().chain(rates.iter()).any(|&x| !(x > 0.0)) {
        return Err(VbError::InvalidArgument(format!(
            "Gamma shape {:?} and rate {:?} must be positive",
            shapes, rates
        )));
    }
    Ok(())
}

pub fn log_norm(eta: &[f64]) -> Result<f64> {
    let (shapes, rates) = standard_from_natural(eta)?;
    Ok(shapes
        .iter()
        .zip(rates.iter())
        .map(|(a, b)| a.ln_gamma().0 - a * b.ln())
        .sum())
}

/// [E[λ], E[ln λ]] = [a/b, ψ(a) - ln b]
pub fn expected_sufficient_statistics(eta: &[f64]) -> Result<Vec<f64>> {
    let (shapes, rates) = standard_from_natural(eta)?;
    let mean = shapes.iter().zip(rates.iter()).map(|(a, b)| a / b);
    let log_mean = shapes
        .iter()
        .zip(rates.iter())
        .map(|(a, b)| a.digamma() - b.ln());
    Ok(mean.chain(log_mean).collect())
}

pub fn expected_value(eta: &[f64]) -> Result<Vec<f64>> {
    let (shapes, rates) = standard_from_natural(eta)?;
    Ok(shapes.iter().zip(rates.iter()).map(|(a, b)| a / b).collect())
}

pub fn sufficient_statistics(lambda: &[f64]) -> Result<Vec<f64>> {
    if lambda.iter().any(|&x| !(x > 0.0)) {
        return Err(VbError::InvalidArgument(
            "Gamma support is the positive half-line".to_string(),
        ));
    }
    Ok(lambda
        .iter()
        .cloned()
        .chain(lambda.iter().map(|x| x.ln()))
        .collect())
}
