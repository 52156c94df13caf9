//! Normal-Gamma prior over the mean and precision of a Normal with
//! diagonal covariance, one independent block per dimension:
//!
//! λ ~ Gamma(a, b), μ | λ ~ N(m, (κλ)⁻¹)
//!
//! η = [2b + κm², κm, κ, 2a - 1]
//! T(μ, λ) = [-λ/2, λμ, -λμ²/2, ½ ln λ]
//! A(η) = Σ lnΓ(a) - a ln b + ½ ln 2π - ½ ln κ
//!
//! The ordering of T lines up with the data statistics
//! `[x², x, 1, 1]` so that `⟨E[T], s(x)⟩` is the expected Normal
//! log-density up to `-½ ln 2π` per dimension.

use crate::error::{Result, VbError};
use special::Gamma;
use std::f64::consts::PI;

#[derive(Clone, Debug, PartialEq)]
pub struct NormalGammaStd {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub shape: Vec<f64>,
    pub rate: Vec<f64>,
}

impl NormalGammaStd {
    fn check(&self) -> Result<()> {
        let dim = self.mean.len();
        if self.scale.len() != dim || self.shape.len() != dim || self.rate.len() != dim {
            return Err(VbError::shape_mismatch(
                "Normal-Gamma mean/scale/shape/rate",
                &[dim, dim, dim, dim],
                &[dim, self.scale.len(), self.shape.len(), self.rate.len()],
            ));
        }
        let positive = self
            .scale
            .iter()
            .chain(self.shape.iter())
            .chain(self.rate.iter())
            .all(|&x| x > 0.0);
        if !positive {
            return Err(VbError::InvalidArgument(format!(
                "Normal-Gamma scale {:?}, shape {:?}, rate {:?} must be positive",
                self.scale, self.shape, self.rate
            )));
        }
        Ok(())
    }

    fn dim(&self) -> usize {
        self.mean.len()
    }
}

pub fn natural_from_standard(std: &NormalGammaStd) -> Result<Vec<f64>> {
    std.check()?;
    let d = std.dim();
    let mut eta = Vec::with_capacity(4 * d);
    eta.extend((0..d).map(|i| 2.0 * std.rate[i] + std.scale[i] * std.mean[i].powi(2)));
    eta.extend((0..d).map(|i| std.scale[i] * std.mean[i]));
    eta.extend(std.scale.iter().cloned());
    eta.extend(std.shape.iter().map(|a| 2.0 * a - 1.0));
    Ok(eta)
}

pub fn standard_from_natural(eta: &[f64]) -> Result<NormalGammaStd> {
    let d = eta.len() / 4;
    let (eta1, rest) = eta.split_at(d);
    let (eta2, rest) = rest.split_at(d);
    let (eta3, eta4) = rest.split_at(d);

    let scale = eta3.to_vec();
    let mean: Vec<f64> = eta2.iter().zip(eta3.iter()).map(|(x, k)| x / k).collect();
    let rate: Vec<f64> = (0..d)
        .map(|i| 0.5 * (eta1[i] - scale[i] * mean[i].powi(2)))
        .collect();
    let shape: Vec<f64> = eta4.iter().map(|x| 0.5 * (x + 1.0)).collect();

    let std = NormalGammaStd {
        mean,
        scale,
        shape,
        rate,
    };
    std.check()?;
    Ok(std)
}

pub fn log_norm(eta: &[f64]) -> Result<f64> {
    let std = standard_from_natural(eta)?;
    Ok((0..std.dim())
        .map(|i| {
            let (a, b, k) = (std.shape[i], std.rate[i], std.scale[i]);
            a.ln_gamma().0 - a * b.ln() + 0.5 * (2.0 * PI).ln() - 0.5 * k.ln()
        })
        .sum())
}

pub fn expected_sufficient_statistics(eta: &[f64]) -> Result<Vec<f64>> {
    let std = standard_from_natural(eta)?;
    let d = std.dim();
    let e_prec: Vec<f64> = (0..d).map(|i| std.shape[i] / std.rate[i]).collect();

    let mut stats = Vec::with_capacity(4 * d);
    stats.extend(e_prec.iter().map(|l| -0.5 * l));
    stats.extend((0..d).map(|i| e_prec[i] * std.mean[i]));
    stats.extend((0..d).map(|i| -0.5 * (1.0 / std.scale[i] + e_prec[i] * std.mean[i].powi(2))));
    stats.extend((0..d).map(|i| 0.5 * (std.shape[i].digamma() - std.rate[i].ln())));
    Ok(stats)
}

/// [E[μ], E[λ]]
pub fn expected_value(eta: &[f64]) -> Result<Vec<f64>> {
    let std = standard_from_natural(eta)?;
    let e_prec = std.shape.iter().zip(std.rate.iter()).map(|(a, b)| a / b);
    Ok(std.mean.iter().cloned().chain(e_prec).collect())
}

/// `value` is `[μ (d), λ (d)]`
pub fn sufficient_statistics(value: &[f64]) -> Result<Vec<f64>> {
    let d = value.len() / 2;
    let (mu, lambda) = value.split_at(d);
    if lambda.iter().any(|&l| !(l > 0.0)) {
        return Err(VbError::InvalidArgument(
            "Normal-Gamma precision must be positive".to_string(),
        ));
    }
    let mut stats = Vec::with_capacity(4 * d);
    stats.extend(lambda.iter().map(|l| -0.5 * l));
    stats.extend((0..d).map(|i| lambda[i] * mu[i]));
    stats.extend((0..d).map(|i| -0.5 * lambda[i] * mu[i].powi(2)));
    stats.extend(lambda.iter().map(|l| 0.5 * l.ln()));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn example() -> NormalGammaStd {
        NormalGammaStd {
            mean: vec![-1.0, 0.5, 3.0],
            scale: vec![2.0, 0.1, 1.0],
            shape: vec![1.5, 4.0, 0.7],
            rate: vec![0.3, 2.0, 1.1],
        }
    }

    #[test]
    fn standard_round_trip() -> Result<()> {
        let std = example();
        let back = standard_from_natural(&natural_from_standard(&std)?)?;
        for i in 0..3 {
            assert_abs_diff_eq!(back.mean[i], std.mean[i], epsilon = 1e-12);
            assert_abs_diff_eq!(back.scale[i], std.scale[i], epsilon = 1e-12);
            assert_abs_diff_eq!(back.shape[i], std.shape[i], epsilon = 1e-12);
            assert_abs_diff_eq!(back.rate[i], std.rate[i], epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn log_density_matches_closed_form() -> Result<()> {
        let std = NormalGammaStd {
            mean: vec![0.3],
            scale: vec![2.0],
            shape: vec![3.0],
            rate: vec![1.5],
        };
        let eta = natural_from_standard(&std)?;
        let (mu, lambda) = (0.1, 0.8);
        let t = sufficient_statistics(&[mu, lambda])?;
        let log_p: f64 = eta.iter().zip(t.iter()).map(|(e, t)| e * t).sum::<f64>() - log_norm(&eta)?;

        // Gamma(λ | a, b) N(μ | m, 1/(κλ))
        let (a, b, k, m) = (3.0f64, 1.5f64, 2.0f64, 0.3f64);
        let log_gamma = a * b.ln() - a.ln_gamma().0 + (a - 1.0) * lambda.ln() - b * lambda;
        let prec = k * lambda;
        let log_normal = 0.5 * (prec / (2.0 * PI)).ln() - 0.5 * prec * (mu - m).powi(2);
        assert_abs_diff_eq!(log_p, log_gamma + log_normal, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn expected_precision() -> Result<()> {
        let eta = natural_from_standard(&example())?;
        let value = expected_value(&eta)?;
        assert_abs_diff_eq!(value[3], 1.5 / 0.3, epsilon = 1e-10);
        assert_abs_diff_eq!(value[1], 0.5, epsilon = 1e-12);
        Ok(())
    }
}
