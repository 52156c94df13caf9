//! Host-side moments shared by the linear-Gaussian models (PPCA and
//! PLDA). Everything here is `f64` `nalgebra` algebra on expectations
//! read off the posteriors.

use matrix_util::tensor_util::host_vec;
use matrix_util::traits::{FlattenOps, SpdOps};
use nalgebra::{DMatrix, DVector};
use vb_param::{BayesianParameter, Family, Result, VbError};

/// `E[x]`, `E[xxᵀ]` of a full-covariance Normal parameter
pub(crate) struct NormalMoments {
    pub mean: DVector<f64>,
    pub second: DMatrix<f64>,
}

impl NormalMoments {
    pub fn read(param: &BayesianParameter) -> Result<Self> {
        let dim = match param.family() {
            Family::NormalFull { dim } => dim,
            other => {
                return Err(VbError::TypeMismatch {
                    expected: "NormalFull".to_string(),
                    found: other.to_string(),
                })
            }
        };
        let stats = host_vec(&param.expected_natural_parameters()?)?;
        let (mean, second) = stats.split_at(dim);
        Ok(Self {
            mean: DVector::from_column_slice(mean),
            second: DMatrix::<f64>::from_row_major(dim, dim, second)?,
        })
    }

    /// `E[xᵀx] - E[x]ᵀE[x]`
    pub fn total_variance(&self) -> f64 {
        self.second.trace() - self.mean.norm_squared()
    }
}

/// `E[W]`, `E[WWᵀ]` of a `(q x d)` matrix Normal parameter
pub(crate) struct SubspaceMoments {
    pub mean: DMatrix<f64>,
    pub second: DMatrix<f64>,
}

impl SubspaceMoments {
    pub fn read(param: &BayesianParameter) -> Result<Self> {
        let (rows, cols) = match param.family() {
            Family::MatrixNormal { rows, cols } => (rows, cols),
            other => {
                return Err(VbError::TypeMismatch {
                    expected: "MatrixNormal".to_string(),
                    found: other.to_string(),
                })
            }
        };
        let stats = host_vec(&param.expected_natural_parameters()?)?;
        let (mean, second) = stats.split_at(rows * cols);
        Ok(Self {
            mean: DMatrix::<f64>::from_row_major(rows, cols, mean)?,
            second: DMatrix::<f64>::from_row_major(rows, rows, second)?,
        })
    }

    pub fn dim_latent(&self) -> usize {
        self.mean.nrows()
    }

    /// `E[‖Wᵀh‖²] - ‖E[W]ᵀ E[h]‖²` for a latent with moments `(μ, E[hhᵀ])`
    pub fn projection_variance(&self, mu: &DVector<f64>, second_h: &DMatrix<f64>) -> f64 {
        let projected = self.mean.transpose() * mu;
        (&self.second * second_h).trace() - projected.norm_squared()
    }
}

/// `E[λ]`, `E[ln λ]` of a scalar Gamma parameter
pub(crate) struct PrecisionMoments {
    pub mean: f64,
    pub log_mean: f64,
}

impl PrecisionMoments {
    pub fn read(param: &BayesianParameter) -> Result<Self> {
        if param.family() != (Family::Gamma { dim: 1 }) {
            return Err(VbError::TypeMismatch {
                expected: (Family::Gamma { dim: 1 }).to_string(),
                found: param.family().to_string(),
            });
        }
        let stats = host_vec(&param.expected_natural_parameters()?)?;
        Ok(Self {
            mean: stats[0],
            log_mean: stats[1],
        })
    }
}

/// Closed-form posterior of `h ~ N(0, I)` given `x ~ N(Wᵀh, λ⁻¹ I)`
/// for every row of `centered (N x d)`:
///
/// Σ = (I + E[λ] E[WWᵀ])⁻¹, μ_n = E[λ] Σ E[W] x_n
pub(crate) struct LatentPosterior {
    pub cov: DMatrix<f64>,
    pub means: DMatrix<f64>,
    log_det_cov: f64,
}

impl LatentPosterior {
    pub fn infer(
        precision: &PrecisionMoments,
        subspace: &SubspaceMoments,
        centered: &DMatrix<f64>,
    ) -> Result<Self> {
        let q = subspace.dim_latent();
        let prec = DMatrix::<f64>::identity(q, q) + &subspace.second * precision.mean;
        let cov = prec.spd_inverse()?;
        let log_det_cov = -prec.spd_log_det()?;
        let means = (centered * subspace.mean.transpose() * &cov) * precision.mean;
        Ok(Self {
            cov,
            means,
            log_det_cov,
        })
    }

    pub fn dim(&self) -> usize {
        self.cov.nrows()
    }

    pub fn mean(&self, n: usize) -> DVector<f64> {
        self.means.row(n).transpose()
    }

    /// `E[h_n h_nᵀ] = Σ + μ_n μ_nᵀ`
    pub fn second_moment(&self, n: usize) -> DMatrix<f64> {
        let mu = self.mean(n);
        &self.cov + &mu * mu.transpose()
    }

    /// KL(q(h_n) || N(0, I))
    pub fn kl_div(&self, n: usize) -> f64 {
        let mu = self.mean(n);
        0.5 * (self.cov.trace() + mu.norm_squared() - self.dim() as f64 - self.log_det_cov)
    }
}

/// Natural-gradient statistics of a full-covariance Normal parameter
/// entering the likelihood as `-λ/2 ‖r - x‖²`: `[λ Σ_n w_n r_n, vec(-½ λ W I)]`
/// with `W = Σ_n w_n`
pub(crate) fn normal_offset_stats(precision: f64, weighted_residual_sum: &DVector<f64>, total_weight: f64) -> Vec<f64> {
    let dim = weighted_residual_sum.len();
    let mut stats: Vec<f64> = (weighted_residual_sum * precision).iter().copied().collect();
    stats.extend((DMatrix::<f64>::identity(dim, dim) * (-0.5 * precision * total_weight)).flatten_row_major());
    stats
}

/// Natural-gradient statistics of a matrix Normal parameter `W`
/// entering the likelihood as `-λ/2 ‖r - Wᵀh‖²`:
/// `[λ Σ_n w_n E[h_n] r_nᵀ, vec(-½ λ Σ_n w_n E[h_n h_nᵀ])]`
pub(crate) fn subspace_stats(precision: f64, cross: &DMatrix<f64>, second: &DMatrix<f64>) -> Vec<f64> {
    let mut stats = (cross * precision).flatten_row_major();
    stats.extend((second * (-0.5 * precision)).flatten_row_major());
    stats
}
