//! Matrix Normal with a shared row covariance: the columns of
//! `W (rows x cols)` are independent `N(M[:,j], Σ)`. A full-covariance
//! Normal over a vector is the single-column case.
//!
//! η = [ΛM, -½ vec Λ], T(W) = [W, vec WWᵀ]
//! A(η) = ½ tr(MᵀΛM) - (cols/2) ln|Λ| + (rows·cols/2) ln 2π
//!
//! Matrices are flattened row-major.

use crate::error::{Result, VbError};
use matrix_util::traits::{FlattenOps, SpdOps};
use nalgebra::DMatrix;
use std::f64::consts::PI;

pub fn natural_from_standard(mean: &DMatrix<f64>, cov: &DMatrix<f64>) -> Result<Vec<f64>> {
    let rows = mean.nrows();
    if cov.shape() != (rows, rows) {
        return Err(VbError::shape_mismatch(
            "matrix Normal covariance",
            &[rows, rows],
            &[cov.nrows(), cov.ncols()],
        ));
    }
    let prec = cov.spd_inverse()?;
    let mut eta = (&prec * mean).flatten_row_major();
    eta.extend((prec * -0.5).flatten_row_major());
    Ok(eta)
}

/// Returns `(M, Σ)`
pub fn standard_from_natural(
    eta: &[f64],
    rows: usize,
    cols: usize,
) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let (prec_mean, prec) = split(eta, rows, cols)?;
    let cov = prec.spd_inverse()?;
    let mean = &cov * prec_mean;
    Ok((mean, cov))
}

fn split(eta: &[f64], rows: usize, cols: usize) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
    let (eta1, eta2) = eta.split_at(rows * cols);
    let prec_mean = DMatrix::<f64>::from_row_major(rows, cols, eta1)?;
    let prec = (DMatrix::<f64>::from_row_major(rows, rows, eta2)? * -2.0).symmetrize();
    Ok((prec_mean, prec))
}

pub fn log_norm(eta: &[f64], rows: usize, cols: usize) -> Result<f64> {
    let (prec_mean, prec) = split(eta, rows, cols)?;
    let cov = prec.spd_inverse()?;
    let mean = &cov * &prec_mean;
    let quad = (mean.transpose() * prec_mean).trace();
    let log_det_prec = prec.spd_log_det()?;
    Ok(0.5 * quad - 0.5 * cols as f64 * log_det_prec
        + 0.5 * (rows * cols) as f64 * (2.0 * PI).ln())
}

/// [E[W], E[WWᵀ]] = [M, cols·Σ + MMᵀ]
pub fn expected_sufficient_statistics(eta: &[f64], rows: usize, cols: usize) -> Result<Vec<f64>> {
    let (mean, cov) = standard_from_natural(eta, rows, cols)?;
    let second = cov * cols as f64 + &mean * mean.transpose();
    let mut stats = mean.flatten_row_major();
    stats.extend(second.flatten_row_major());
    Ok(stats)
}

pub fn expected_value(eta: &[f64], rows: usize, cols: usize) -> Result<Vec<f64>> {
    let (mean, _) = standard_from_natural(eta, rows, cols)?;
    Ok(mean.flatten_row_major())
}

pub fn sufficient_statistics(value: &[f64], rows: usize, cols: usize) -> Result<Vec<f64>> {
    let ww = DMatrix::<f64>::from_row_major(rows, cols, value)?;
    let mut stats = value.to_vec();
    stats.extend((&ww * ww.transpose()).flatten_row_major());
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn standard_round_trip() -> Result<()> {
        let mean = DMatrix::from_row_slice(2, 3, &[1.0, -2.0, 0.5, 0.0, 3.0, -1.0]);
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 0.5]);
        let eta = natural_from_standard(&mean, &cov)?;
        assert_eq!(eta.len(), 2 * 3 + 2 * 2);

        let (mean_back, cov_back) = standard_from_natural(&eta, 2, 3)?;
        assert_abs_diff_eq!((mean_back - mean).abs().max(), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!((cov_back - cov).abs().max(), 0.0, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn univariate_log_density() -> Result<()> {
        let (m, v) = (0.4, 2.0);
        let eta = natural_from_standard(
            &DMatrix::from_element(1, 1, m),
            &DMatrix::from_element(1, 1, v),
        )?;
        let x = -1.2;
        let t = sufficient_statistics(&[x], 1, 1)?;
        let log_p = eta[0] * t[0] + eta[1] * t[1] - log_norm(&eta, 1, 1)?;
        let expected = -0.5 * (2.0 * PI * v).ln() - 0.5 * (x - m) * (x - m) / v;
        assert_abs_diff_eq!(log_p, expected, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn second_moment_scales_with_columns() -> Result<()> {
        let mean = DMatrix::zeros(2, 4);
        let cov = DMatrix::identity(2, 2);
        let eta = natural_from_standard(&mean, &cov)?;
        let stats = expected_sufficient_statistics(&eta, 2, 4)?;
        // E[WWᵀ] = 4 I
        assert_abs_diff_eq!(stats[8], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats[9], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(stats[11], 4.0, epsilon = 1e-12);
        Ok(())
    }
}
