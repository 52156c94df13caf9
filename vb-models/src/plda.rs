use crate::acc_stats::AccStats;
use crate::linear_gaussian::*;
use crate::model_util::*;
use crate::ppca::*;
use crate::traits::{BayesianModel, BayesianModelSet};

use candle_core::{Device, Tensor};
use log::debug;
use matrix_util::traits::{FlattenOps, SampleOps};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;
use vb_param::*;

/// PLDA as a set of `K` classes
///
/// x = m + Uᵀh + Vᵀc_k + ε, h ~ N(0, I), ε ~ N(0, λ⁻¹ I)
///
/// `U (q_noise x d)` spans the within-class variability, `V (q_class x d)`
/// the between-class variability, and `c_k` is the latent position of
/// class `k` (full-covariance Normal). Component `k` of the set is the
/// likelihood of a frame given class `k`; `h` is integrated per frame
/// and class in closed form.
pub struct PldaSetModel {
    mean: BayesianParameter,
    precision: BayesianParameter,
    noise_subspace: BayesianParameter,
    class_subspace: BayesianParameter,
    class_means: Vec<BayesianParameter>,
    parameters: BayesianParameterSet,
    dim: usize,
}

struct ClassTerms {
    latent: LatentPosterior,
    class_mean: NormalMoments,
    sq_resid: Vec<f64>,
}

struct PldaFrames {
    data: DMatrix<f64>,
    mean: NormalMoments,
    precision: PrecisionMoments,
    noise: SubspaceMoments,
    class: SubspaceMoments,
    classes: Vec<ClassTerms>,
}

fn normal_full_dim(param: &BayesianParameter) -> Result<usize> {
    match param.family() {
        Family::NormalFull { dim } => Ok(dim),
        other => Err(VbError::TypeMismatch {
            expected: "NormalFull".to_string(),
            found: other.to_string(),
        }),
    }
}

fn subspace_rows(param: &BayesianParameter, dim: usize) -> Result<usize> {
    match param.family() {
        Family::MatrixNormal { rows, cols } if cols == dim => Ok(rows),
        other => Err(VbError::TypeMismatch {
            expected: format!("MatrixNormal(q x {})", dim),
            found: other.to_string(),
        }),
    }
}

impl PldaSetModel {
    pub fn new(
        mean: BayesianParameter,
        precision: BayesianParameter,
        noise_subspace: BayesianParameter,
        class_subspace: BayesianParameter,
        class_means: Vec<BayesianParameter>,
    ) -> Result<Self> {
        let dim = normal_full_dim(&mean)?;
        Family::Gamma { dim: 1 }.check_same(&precision.family())?;
        subspace_rows(&noise_subspace, dim)?;
        let dim_class = subspace_rows(&class_subspace, dim)?;
        if class_means.is_empty() {
            return Err(VbError::InvalidArgument("PLDA needs at least one class".to_string()));
        }
        for c in class_means.iter() {
            Family::NormalFull { dim: dim_class }.check_same(&c.family())?;
        }

        let mut parameters = vec![
            mean.clone(),
            precision.clone(),
            noise_subspace.clone(),
            class_subspace.clone(),
        ];
        parameters.extend(class_means.iter().cloned());

        Ok(Self {
            mean,
            precision,
            noise_subspace,
            class_subspace,
            class_means,
            parameters: BayesianParameterSet::new(parameters),
            dim,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        size: usize,
        mean: &[f64],
        variance: &[f64],
        dim_noise_subspace: usize,
        dim_class_subspace: usize,
        prior_strength: f64,
        noise_std: f64,
        seed: Option<u64>,
        dev: &Device,
    ) -> Result<Self> {
        check_prior_strength(prior_strength)?;
        if size == 0 || dim_noise_subspace == 0 || dim_class_subspace == 0 {
            return Err(VbError::Config(
                "PLDA size and subspace dimensions must be positive".to_string(),
            ));
        }
        let d = mean.len();
        let mut rng = rng_from_seed(seed);

        let noise_subspace =
            subspace_parameter(dim_noise_subspace, d, prior_strength, noise_std, &mut rng, dev)?;
        let class_subspace =
            subspace_parameter(dim_class_subspace, d, prior_strength, noise_std, &mut rng, dev)?;

        let q = dim_class_subspace;
        let class_prior = ExpFamilyDistribution::normal_full(
            &DVector::zeros(q),
            &DMatrix::identity(q, q),
            dev,
        )?;
        let class_means = (0..size)
            .map(|_| {
                let init: DVector<f64> = DMatrix::<f64>::rnorm(q, 1, &mut rng).column(0) * noise_std;
                let posterior =
                    ExpFamilyDistribution::normal_full(&init, &DMatrix::identity(q, q), dev)?;
                BayesianParameter::new(class_prior.clone(), posterior)
            })
            .collect::<Result<Vec<_>>>()?;

        let model = Self::new(
            mean_parameter(mean, variance, prior_strength, dev)?,
            precision_parameter(variance, prior_strength, dev)?,
            noise_subspace,
            class_subspace,
            class_means,
        )?;
        debug!(
            "PLDA set of {} classes, subspaces {} (noise) and {} (class) in {} dimensions",
            size, dim_noise_subspace, dim_class_subspace, d
        );
        Ok(model)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn class_means(&self) -> &[BayesianParameter] {
        &self.class_means
    }

    fn frames(&self, stats: &Tensor) -> Result<PldaFrames> {
        check_frames(stats, self.dim + 1, "PLDA statistics")?;
        let stats = host_matrix(stats)?;
        let d = self.dim;
        let data = stats.columns(0, d).into_owned();
        let nframes = data.nrows();

        let mean = NormalMoments::read(&self.mean)?;
        let precision = PrecisionMoments::read(&self.precision)?;
        let noise = SubspaceMoments::read(&self.noise_subspace)?;
        let class = SubspaceMoments::read(&self.class_subspace)?;

        let mut classes = Vec::with_capacity(self.class_means.len());
        for param in self.class_means.iter() {
            let class_mean = NormalMoments::read(param)?;
            let class_offset = class.mean.transpose() * &class_mean.mean;
            let offset = &mean.mean + &class_offset;
            let centered = DMatrix::from_fn(nframes, d, |i, j| data[(i, j)] - offset[j]);
            let latent = LatentPosterior::infer(&precision, &noise, &centered)?;
            let class_var = class.projection_variance(&class_mean.mean, &class_mean.second);

            let sq_resid = (0..nframes)
                .map(|n| {
                    let x = data.row(n).transpose();
                    let mu = latent.mean(n);
                    let full_offset = &offset + noise.mean.transpose() * &mu;
                    stats[(n, d)] - 2.0 * x.dot(&full_offset)
                        + full_offset.norm_squared()
                        + mean.total_variance()
                        + noise.projection_variance(&mu, &latent.second_moment(n))
                        + class_var
                })
                .collect();

            classes.push(ClassTerms {
                latent,
                class_mean,
                sq_resid,
            });
        }

        Ok(PldaFrames {
            data,
            mean,
            precision,
            noise,
            class,
            classes,
        })
    }
}

impl BayesianModel for PldaSetModel {
    fn type_name(&self) -> &'static str {
        "PLDASet"
    }

    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        check_dtype_float(data)?;
        check_frames(data, self.dim, "PLDA data")?;
        linear_gaussian_statistics(&align(data, &self.mean.natural_grad())?)
    }

    /// `(N x K)`
    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        let frames = self.frames(stats)?;
        let nframes = frames.data.nrows();
        let k = self.class_means.len();
        let d = self.dim as f64;
        let lambda = &frames.precision;
        let base = 0.5 * d * (lambda.log_mean - (2.0 * PI).ln());

        let llik = DMatrix::from_fn(nframes, k, |n, c| {
            let terms = &frames.classes[c];
            base - 0.5 * lambda.mean * terms.sq_resid[n] - terms.latent.kl_div(n)
        });
        host_to_tensor(&llik, &self.mean.natural_grad())
            .and_then(|t| if k == 1 { Ok(t.unsqueeze(1)?) } else { Ok(t) })
    }

    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        let weights = weights.ok_or_else(|| {
            VbError::InvalidArgument("PLDA accumulation needs per-class weights".to_string())
        })?;
        let frames = self.frames(stats)?;
        let nframes = frames.data.nrows();
        let k = self.class_means.len();
        let w = host_weights(Some(weights), nframes, k)?;
        let lambda = frames.precision.mean;
        let total_weight = w.sum();
        let d = self.dim;
        let q_noise = frames.noise.dim_latent();
        let q_class = frames.class.dim_latent();

        let mut mean_resid = DVector::<f64>::zeros(d);
        let mut sq_resid = 0.0;
        let mut noise_cross = DMatrix::<f64>::zeros(q_noise, d);
        let mut noise_second = DMatrix::<f64>::zeros(q_noise, q_noise);
        let mut class_cross = DMatrix::<f64>::zeros(q_class, d);
        let mut class_second = DMatrix::<f64>::zeros(q_class, q_class);
        let mut per_class = Vec::with_capacity(k);

        for (c, terms) in frames.classes.iter().enumerate() {
            let class_offset = frames.class.mean.transpose() * &terms.class_mean.mean;
            let mut class_resid = DVector::<f64>::zeros(d);
            let mut class_weight = 0.0;

            for n in 0..nframes {
                let w_nc = w[(n, c)];
                if w_nc == 0.0 {
                    continue;
                }
                let x = frames.data.row(n).transpose();
                let mu = terms.latent.mean(n);
                let noise_offset = frames.noise.mean.transpose() * &mu;

                mean_resid += (&x - &noise_offset - &class_offset) * w_nc;
                sq_resid += w_nc * terms.sq_resid[n];
                noise_cross += &mu * (&x - &frames.mean.mean - &class_offset).transpose() * w_nc;
                noise_second += terms.latent.second_moment(n) * w_nc;
                class_resid += (&x - &frames.mean.mean - &noise_offset) * w_nc;
                class_weight += w_nc;
            }

            class_cross += &terms.class_mean.mean * class_resid.transpose();
            class_second += &terms.class_mean.second * class_weight;

            // [λ E[V] r, vec(-½ λ W_k E[VVᵀ])]
            let mut stats_c: Vec<f64> = (&frames.class.mean * &class_resid * lambda).iter().copied().collect();
            stats_c.extend((&frames.class.second * (-0.5 * lambda * class_weight)).flatten_row_major());
            per_class.push(stats_c);
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
            &self.noise_subspace,
            param_stats_tensor(&self.noise_subspace, subspace_stats(lambda, &noise_cross, &noise_second))?,
        )?;
        acc.add(
            &self.class_subspace,
            param_stats_tensor(&self.class_subspace, subspace_stats(lambda, &class_cross, &class_second))?,
        )?;
        for (param, stats_c) in self.class_means.iter().zip(per_class) {
            acc.add(param, param_stats_tensor(param, stats_c)?)?;
        }
        Ok(acc)
    }

    fn as_model_set(&self) -> Option<&dyn BayesianModelSet> {
        Some(self)
    }
}

impl BayesianModelSet for PldaSetModel {
    fn len(&self) -> usize {
        self.class_means.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn example() -> Result<PldaSetModel> {
        PldaSetModel::create(3, &[0.0, 1.0, -1.0], &[1.0, 2.0, 0.5], 2, 1, 1.0, 1.0, Some(5), &Device::Cpu)
    }

    #[test]
    fn class_likelihood_shape() -> Result<()> {
        let model = example()?;
        assert_eq!(model.len(), 3);
        assert_eq!(model.bayesian_parameters().len(), 4 + 3);
        let x = Tensor::new(&[[0.0f64, 1.0, -1.0], [1.0, 2.0, 0.0]], &Device::Cpu)?;
        let stats = model.sufficient_statistics(&x)?;
        let llik = model.expected_log_likelihood(&stats)?;
        assert_eq!(llik.dims(), &[2, 3]);
        for row in llik.to_vec2::<f64>()? {
            assert!(row.iter().all(|v| v.is_finite()));
        }
        Ok(())
    }

    #[test]
    fn update_from_hard_assignments() -> Result<()> {
        let model = example()?;
        let x = Tensor::new(&[[0.0f64, 1.0, -1.0], [1.0, 2.0, 0.0], [0.5, 0.5, 0.5]], &Device::Cpu)?;
        let stats = model.sufficient_statistics(&x)?;
        let w = Tensor::new(&[[1.0f64, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]], &Device::Cpu)?;
        let acc = model.accumulate(&stats, Some(&w))?;
        assert_eq!(acc.len(), model.bayesian_parameters().len());

        // the third class saw no data: only the -½ λ · 0 · E[VVᵀ] term
        let idle = acc
            .get(&model.class_means()[2])
            .map(|t| t.to_vec1::<f64>())
            .transpose()?
            .unwrap_or_default();
        assert!(idle.iter().all(|&v| v.abs() < 1e-12));

        acc.apply()?;
        for p in model.bayesian_parameters() {
            p.natural_grad_update(1.0)?;
        }
        let kl = model.kl_div_posterior_prior()?;
        assert!(kl.is_finite());
        assert_abs_diff_eq!(kl.min(0.0), 0.0, epsilon = 1e-9);
        Ok(())
    }
}
