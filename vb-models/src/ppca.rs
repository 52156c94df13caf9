use crate::acc_stats::AccStats;
use crate::linear_gaussian::*;
use crate::model_util::*;
use crate::traits::BayesianModel;

use candle_core::{Device, Tensor};
use log::debug;
use matrix_util::traits::SampleOps;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use std::f64::consts::PI;
use vb_param::*;

/// `[x, ‖x‖²]` for every row of `x (N x d)`, `(N x (d + 1))`
pub fn linear_gaussian_statistics(x: &Tensor) -> Result<Tensor> {
    let sq = x.sqr()?.sum_keepdim(1)?;
    Ok(Tensor::cat(&[x, &sq], 1)?)
}

pub(crate) fn check_prior_strength(prior_strength: f64) -> Result<()> {
    if !(prior_strength > 0.0) {
        return Err(VbError::Config(format!(
            "prior_strength must be positive, got {}",
            prior_strength
        )));
    }
    Ok(())
}

/// `m ~ N(mean, diag(variance) / prior_strength)`
pub(crate) fn mean_parameter(
    mean: &[f64],
    variance: &[f64],
    prior_strength: f64,
    dev: &Device,
) -> Result<BayesianParameter> {
    if mean.len() != variance.len() {
        return Err(VbError::shape_mismatch("data mean/variance", &[mean.len()], &[variance.len()]));
    }
    if variance.iter().any(|&v| !(v > 0.0)) {
        return Err(VbError::InvalidArgument("data variance must be positive".to_string()));
    }
    let cov = DMatrix::from_diagonal(&DVector::from_iterator(
        variance.len(),
        variance.iter().map(|v| v / prior_strength),
    ));
    let prior = ExpFamilyDistribution::normal_full(&DVector::from_column_slice(mean), &cov, dev)?;
    BayesianParameter::from_prior(prior)
}

/// `λ ~ Gamma(prior_strength, prior_strength · mean(variance))`, so that
/// `E[λ] = 1 / mean(variance)`
pub(crate) fn precision_parameter(
    variance: &[f64],
    prior_strength: f64,
    dev: &Device,
) -> Result<BayesianParameter> {
    let avg_var = variance.iter().sum::<f64>() / variance.len().max(1) as f64;
    let prior = ExpFamilyDistribution::gamma(&[prior_strength], &[prior_strength * avg_var], dev)?;
    BayesianParameter::from_prior(prior)
}

/// `(q x d)` subspace with prior columns `N(0, I / prior_strength)`;
/// the posterior mean starts at `noise_std · ε`
pub(crate) fn subspace_parameter(
    dim_latent: usize,
    dim: usize,
    prior_strength: f64,
    noise_std: f64,
    rng: &mut StdRng,
    dev: &Device,
) -> Result<BayesianParameter> {
    let cov = DMatrix::<f64>::identity(dim_latent, dim_latent) / prior_strength;
    let prior = ExpFamilyDistribution::matrix_normal(&DMatrix::zeros(dim_latent, dim), &cov, dev)?;
    let init = DMatrix::<f64>::rnorm(dim_latent, dim, rng) * noise_std;
    let posterior = ExpFamilyDistribution::matrix_normal(&init, &cov, dev)?;
    BayesianParameter::new(prior, posterior)
}

/// Probabilistic PCA
///
/// x = m + Wᵀh + ε, h ~ N(0, I_q), ε ~ N(0, λ⁻¹ I_d)
///
/// with posteriors over the mean `m` (full-covariance Normal), the
/// noise precision `λ` (Gamma) and the subspace `W` (matrix Normal,
/// `q x d`). The latent `h` is integrated per frame in closed form.
pub struct PpcaModel {
    mean: BayesianParameter,
    precision: BayesianParameter,
    subspace: BayesianParameter,
    parameters: BayesianParameterSet,
    dim: usize,
    dim_subspace: usize,
}

struct PpcaFrames {
    data: DMatrix<f64>,
    mean: NormalMoments,
    precision: PrecisionMoments,
    subspace: SubspaceMoments,
    latent: LatentPosterior,
    sq_resid: Vec<f64>,
}

impl PpcaModel {
    pub fn new(
        mean: BayesianParameter,
        precision: BayesianParameter,
        subspace: BayesianParameter,
    ) -> Result<Self> {
        let dim = match mean.family() {
            Family::NormalFull { dim } => dim,
            other => {
                return Err(VbError::TypeMismatch {
                    expected: "NormalFull".to_string(),
                    found: other.to_string(),
                })
            }
        };
        Family::Gamma { dim: 1 }.check_same(&precision.family())?;
        let dim_subspace = match subspace.family() {
            Family::MatrixNormal { rows, cols } if cols == dim => rows,
            other => {
                return Err(VbError::TypeMismatch {
                    expected: format!("MatrixNormal(q x {})", dim),
                    found: other.to_string(),
                })
            }
        };
        Ok(Self {
            parameters: BayesianParameterSet::new(vec![
                mean.clone(),
                precision.clone(),
                subspace.clone(),
            ]),
            mean,
            precision,
            subspace,
            dim,
            dim_subspace,
        })
    }

    pub fn create(
        mean: &[f64],
        variance: &[f64],
        dim_subspace: usize,
        prior_strength: f64,
        noise_std: f64,
        seed: Option<u64>,
        dev: &Device,
    ) -> Result<Self> {
        check_prior_strength(prior_strength)?;
        if dim_subspace == 0 {
            return Err(VbError::Config("dim_subspace must be positive".to_string()));
        }
        let mut rng = rng_from_seed(seed);
        let model = Self::new(
            mean_parameter(mean, variance, prior_strength, dev)?,
            precision_parameter(variance, prior_strength, dev)?,
            subspace_parameter(dim_subspace, mean.len(), prior_strength, noise_std, &mut rng, dev)?,
        )?;
        debug!("PPCA with a {}-dimensional subspace of {} dimensions", dim_subspace, mean.len());
        Ok(model)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn dim_subspace(&self) -> usize {
        self.dim_subspace
    }

    pub fn mean(&self) -> &BayesianParameter {
        &self.mean
    }

    pub fn precision(&self) -> &BayesianParameter {
        &self.precision
    }

    pub fn subspace(&self) -> &BayesianParameter {
        &self.subspace
    }

    /// Posterior means `(N x q)` of the per-frame latent variables
    pub fn latent_posterior_means(&self, stats: &Tensor) -> Result<Tensor> {
        let frames = self.frames(stats)?;
        let means = host_to_tensor(&frames.latent.means, &self.mean.natural_grad())?;
        if self.dim_subspace == 1 {
            Ok(means.unsqueeze(1)?)
        } else {
            Ok(means)
        }
    }

    fn frames(&self, stats: &Tensor) -> Result<PpcaFrames> {
        check_frames(stats, self.dim + 1, "PPCA statistics")?;
        let stats = host_matrix(stats)?;
        let d = self.dim;
        let data = stats.columns(0, d).into_owned();

        let mean = NormalMoments::read(&self.mean)?;
        let precision = PrecisionMoments::read(&self.precision)?;
        let subspace = SubspaceMoments::read(&self.subspace)?;

        let centered = DMatrix::from_fn(data.nrows(), d, |i, j| data[(i, j)] - mean.mean[j]);
        let latent = LatentPosterior::infer(&precision, &subspace, &centered)?;

        let sq_resid = (0..data.nrows())
            .map(|n| {
                let x = data.row(n).transpose();
                let mu = latent.mean(n);
                let offset = &mean.mean + subspace.mean.transpose() * &mu;
                stats[(n, d)] - 2.0 * x.dot(&offset)
                    + offset.norm_squared()
                    + mean.total_variance()
                    + subspace.projection_variance(&mu, &latent.second_moment(n))
            })
            .collect();

        Ok(PpcaFrames {
            data,
            mean,
            precision,
            subspace,
            latent,
            sq_resid,
        })
    }
}

impl BayesianModel for PpcaModel {
    fn type_name(&self) -> &'static str {
        "PPCA"
    }

    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        check_dtype_float(data)?;
        check_frames(data, self.dim, "PPCA data")?;
        linear_gaussian_statistics(&align(data, &self.mean.natural_grad())?)
    }

    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        let frames = self.frames(stats)?;
        let d = self.dim as f64;
        let lambda = &frames.precision;
        let llik: Vec<f64> = frames
            .sq_resid
            .iter()
            .enumerate()
            .map(|(n, sq)| {
                0.5 * d * (lambda.log_mean - (2.0 * PI).ln()) - 0.5 * lambda.mean * sq
                    - frames.latent.kl_div(n)
            })
            .collect();
        let n = llik.len();
        Ok(matrix_util::tensor_util::tensor_from_host(
            llik,
            n,
            &self.mean.device(),
            self.mean.dtype(),
        )?)
    }

    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        let frames = self.frames(stats)?;
        let nframes = frames.data.nrows();
        let w = host_weights(weights, nframes, 1)?;
        let lambda = frames.precision.mean;
        let total_weight = w.sum();
        let (d, q) = (self.dim, self.dim_subspace);

        let mut mean_resid = DVector::<f64>::zeros(d);
        let mut sq_resid = 0.0;
        let mut cross = DMatrix::<f64>::zeros(q, d);
        let mut second = DMatrix::<f64>::zeros(q, q);

        for n in 0..nframes {
            let w_n = w[(n, 0)];
            let x = frames.data.row(n).transpose();
            let mu = frames.latent.mean(n);
            mean_resid += (&x - frames.subspace.mean.transpose() * &mu) * w_n;
            sq_resid += w_n * frames.sq_resid[n];
            cross += &mu * (&x - &frames.mean.mean).transpose() * w_n;
            second += frames.latent.second_moment(n) * w_n;
        }

        let mut acc = AccStats::new();
        acc.add(
            &self.mean,
            param_stats_tensor(&self.mean, normal_offset_stats(lambda, &mean_resid, total_weight))?,
        )?;
        acc.add(
            &self.precision,
            param_stats_tensor(&self.precision, vec![-0.5 * sq_resid, 0.5 * d as f64 * total_weight])?,
        )?;
        acc.add(
            &self.subspace,
            param_stats_tensor(&self.subspace, subspace_stats(lambda, &cross, &second))?,
        )?;
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn statistics_layout() -> Result<()> {
        let x = Tensor::new(&[[1.0f64, 2.0], [0.0, -3.0]], &Device::Cpu)?;
        let stats = linear_gaussian_statistics(&x)?.to_vec2::<f64>()?;
        assert_eq!(stats[0], vec![1.0, 2.0, 5.0]);
        assert_eq!(stats[1], vec![0.0, -3.0, 9.0]);
        Ok(())
    }

    #[test]
    fn bound_is_below_marginal_for_point_posteriors() -> Result<()> {
        // with a (nearly) point-mass posterior on every parameter the
        // frame bound equals ln N(x | m, WᵀW + λ⁻¹ I)
        let dev = Device::Cpu;
        let (d, q) = (2, 1);
        let w = DMatrix::from_row_slice(q, d, &[1.0, 0.5]);
        let tiny = 1e-9;

        let mean = BayesianParameter::from_prior(ExpFamilyDistribution::normal_full(
            &DVector::from_column_slice(&[0.5, -0.5]),
            &(DMatrix::identity(d, d) * tiny),
            &dev,
        )?)?;
        let precision =
            BayesianParameter::from_prior(ExpFamilyDistribution::gamma(&[1e9], &[1e9 / 4.0], &dev)?)?;
        let subspace = BayesianParameter::from_prior(ExpFamilyDistribution::matrix_normal(
            &w,
            &(DMatrix::identity(q, q) * tiny),
            &dev,
        )?)?;
        let model = PpcaModel::new(mean, precision, subspace)?;

        let x = Tensor::new(&[[1.0f64, 0.0], [-1.0, 2.0]], &dev)?;
        let stats = model.sufficient_statistics(&x)?;
        let llik = model.expected_log_likelihood(&stats)?.to_vec1::<f64>()?;

        let cov = w.transpose() * &w + DMatrix::<f64>::identity(d, d) * 0.25;
        let cov_inv = cov.clone().try_inverse().unwrap_or_else(|| DMatrix::identity(d, d));
        let log_det = cov.determinant().ln();
        let rows = [[1.0, 0.0], [-1.0, 2.0]];
        for (n, row) in rows.iter().enumerate() {
            let r = DVector::from_column_slice(row) - DVector::from_column_slice(&[0.5, -0.5]);
            let marginal = -0.5 * (d as f64 * (2.0 * PI).ln() + log_det + (r.transpose() * &cov_inv * &r)[(0, 0)]);
            assert_abs_diff_eq!(llik[n], marginal, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn accumulated_statistics_have_parameter_shapes() -> Result<()> {
        let dev = Device::Cpu;
        let model = PpcaModel::create(&[0.0, 1.0, 2.0], &[1.0, 2.0, 3.0], 2, 1.0, 1.0, Some(11), &dev)?;
        let x = Tensor::new(&[[0.1f64, 1.2, 2.5], [-0.4, 0.8, 1.0], [0.0, 1.0, 2.0]], &dev)?;
        let stats = model.sufficient_statistics(&x)?;
        let acc = model.accumulate(&stats, None)?;
        for p in model.bayesian_parameters() {
            let s = acc.get(p).map(|t| t.dims().to_vec()).unwrap_or_default();
            assert_eq!(s, vec![p.family().natural_dim()]);
        }
        acc.apply()?;
        for p in model.bayesian_parameters() {
            p.natural_grad_update(1.0)?;
        }
        assert!(model.kl_div_posterior_prior()?.is_finite());
        Ok(())
    }

    #[test]
    fn latent_means_are_frames_by_subspace() -> Result<()> {
        let dev = Device::Cpu;
        let x = Tensor::new(&[[0.1f64, 1.2], [-0.4, 0.8], [0.0, 1.0]], &dev)?;
        for q in [1, 2] {
            let model = PpcaModel::create(&[0.0, 1.0], &[1.0, 2.0], q, 1.0, 1.0, Some(5), &dev)?;
            let stats = model.sufficient_statistics(&x)?;
            assert_eq!(model.latent_posterior_means(&stats)?.dims(), &[3, q]);
        }
        Ok(())
    }
}
