use crate::acc_stats::AccStats;
use crate::model_util::*;
use crate::traits::BayesianModel;

use candle_core::{Device, Tensor};
use log::{debug, warn};
use matrix_util::dmatrix_util::log_sum_exp;
use matrix_util::tensor_util::{host_vec, tensor_from_host};
use nalgebra::DMatrix;
use vb_param::*;

/// Hidden Markov model over a set of `K` emission models. Each row of
/// the transition matrix carries a Dirichlet posterior; the initial
/// state distribution is fixed.
///
/// Inference is forward-backward in log space with `E[ln A]` in place
/// of `ln A`. The per-frame expected log-likelihoods are the increments
/// of the forward normalizer, so they sum to the sequence bound.
pub struct HmmModel {
    init_probs: Vec<f64>,
    transitions: Vec<BayesianParameter>,
    parameters: BayesianParameterSet,
    emissions: Box<dyn BayesianModel>,
}

/// Outcome of one forward-backward pass
pub struct HmmPosteriors {
    /// `ln p(x_1..x_t) - ln p(x_1..x_{t-1})` for each frame
    pub frame_log_likelihood: Vec<f64>,
    /// `(N x K)` state occupancy probabilities
    pub state_posteriors: DMatrix<f64>,
    /// `(K x K)` expected transition counts
    pub transition_counts: DMatrix<f64>,
}

impl HmmModel {
    pub fn new(
        init_probs: Vec<f64>,
        transitions: Vec<BayesianParameter>,
        emissions: Box<dyn BayesianModel>,
    ) -> Result<Self> {
        let k = init_probs.len();
        let num_emissions = emissions
            .as_model_set()
            .map(|set| set.len())
            .ok_or_else(|| VbError::TypeMismatch {
                expected: "a model set".to_string(),
                found: emissions.type_name().to_string(),
            })?;
        if num_emissions != k || transitions.len() != k {
            return Err(VbError::shape_mismatch(
                "HMM states (initial, transitions, emissions)",
                &[k, k, k],
                &[k, transitions.len(), num_emissions],
            ));
        }
        for row in transitions.iter() {
            Family::Dirichlet { dim: k }.check_same(&row.family())?;
        }
        let total: f64 = init_probs.iter().sum();
        if init_probs.iter().any(|&p| p < 0.0) || (total - 1.0).abs() > 1e-6 {
            return Err(VbError::InvalidArgument(format!(
                "initial state probabilities must be a distribution: {:?}",
                init_probs
            )));
        }
        Ok(Self {
            init_probs,
            parameters: BayesianParameterSet::new(transitions.clone()),
            transitions,
            emissions,
        })
    }

    /// Fully connected topology: uniform initial states and symmetric
    /// Dirichlet(`prior_strength`) transition rows
    pub fn create_ergodic(
        emissions: Box<dyn BayesianModel>,
        prior_strength: f64,
        dev: &Device,
    ) -> Result<Self> {
        let k = emissions.as_model_set().map(|set| set.len()).unwrap_or(0);
        if k == 0 {
            return Err(VbError::TypeMismatch {
                expected: "a non-empty model set".to_string(),
                found: emissions.type_name().to_string(),
            });
        }
        let transitions = (0..k)
            .map(|_| {
                ExpFamilyDistribution::dirichlet(&vec![prior_strength; k], dev)
                    .and_then(BayesianParameter::from_prior)
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("ergodic HMM with {} states", k);
        Self::new(vec![1.0 / k as f64; k], transitions, emissions)
    }

    pub fn num_states(&self) -> usize {
        self.init_probs.len()
    }

    pub fn emissions(&self) -> &dyn BayesianModel {
        self.emissions.as_ref()
    }

    pub fn transitions(&self) -> &[BayesianParameter] {
        &self.transitions
    }

    /// `ln π_0`
    pub fn log_init(&self) -> Vec<f64> {
        self.init_probs.iter().map(|p| p.ln()).collect()
    }

    /// `(K x K)` matrix of `E[ln A_ij]`
    pub fn log_transition_matrix(&self) -> Result<DMatrix<f64>> {
        let k = self.num_states();
        let mut log_a = DMatrix::<f64>::zeros(k, k);
        for (i, row) in self.transitions.iter().enumerate() {
            let expected = host_vec(&row.expected_natural_parameters()?)?;
            for (j, v) in expected.into_iter().enumerate() {
                log_a[(i, j)] = v;
            }
        }
        Ok(log_a)
    }

    /// Forward-backward on the emission log-likelihoods `(N x K)`
    pub fn forward_backward(&self, log_emission: &DMatrix<f64>) -> Result<HmmPosteriors> {
        let k = self.num_states();
        let nframes = log_emission.nrows();
        if log_emission.ncols() != k {
            return Err(VbError::shape_mismatch(
                "HMM emission log-likelihoods",
                &[nframes, k],
                &[nframes, log_emission.ncols()],
            ));
        }
        let log_a = self.log_transition_matrix()?;
        let log_init = self.log_init();

        let mut log_alpha = DMatrix::<f64>::zeros(nframes, k);
        let mut log_beta = DMatrix::<f64>::zeros(nframes, k);
        let mut frame_log_likelihood = Vec::with_capacity(nframes);
        let mut prev_norm = 0.0;

        for t in 0..nframes {
            for j in 0..k {
                let incoming = if t == 0 {
                    log_init[j]
                } else {
                    let terms: Vec<f64> = (0..k)
                        .map(|i| log_alpha[(t - 1, i)] + log_a[(i, j)])
                        .collect();
                    log_sum_exp(&terms)
                };
                log_alpha[(t, j)] = incoming + log_emission[(t, j)];
            }
            let row: Vec<f64> = log_alpha.row(t).iter().copied().collect();
            let norm = log_sum_exp(&row);
            frame_log_likelihood.push(norm - prev_norm);
            prev_norm = norm;
        }

        for t in (0..nframes.saturating_sub(1)).rev() {
            for i in 0..k {
                let terms: Vec<f64> = (0..k)
                    .map(|j| log_a[(i, j)] + log_emission[(t + 1, j)] + log_beta[(t + 1, j)])
                    .collect();
                log_beta[(t, i)] = log_sum_exp(&terms);
            }
        }

        let log_evidence = prev_norm;
        if !log_evidence.is_finite() {
            warn!("HMM sequence bound is not finite: {}", log_evidence);
        }

        let state_posteriors = DMatrix::from_fn(nframes, k, |t, j| {
            (log_alpha[(t, j)] + log_beta[(t, j)] - log_evidence).exp()
        });

        let mut transition_counts = DMatrix::<f64>::zeros(k, k);
        for t in 0..nframes.saturating_sub(1) {
            for i in 0..k {
                for j in 0..k {
                    transition_counts[(i, j)] += (log_alpha[(t, i)]
                        + log_a[(i, j)]
                        + log_emission[(t + 1, j)]
                        + log_beta[(t + 1, j)]
                        - log_evidence)
                        .exp();
                }
            }
        }

        Ok(HmmPosteriors {
            frame_log_likelihood,
            state_posteriors,
            transition_counts,
        })
    }

    /// Emission log-likelihoods `(N x K)` and the forward-backward
    /// outcome on them
    fn posteriors_of(&self, stats: &Tensor) -> Result<(Tensor, HmmPosteriors)> {
        let log_emission = self.emissions.expected_log_likelihood(stats)?;
        let post = self.forward_backward(&host_matrix(&log_emission)?)?;
        Ok((log_emission, post))
    }

    fn occupancies(&self, post: &HmmPosteriors, like: &Tensor) -> Result<Tensor> {
        let ret = host_to_tensor(&post.state_posteriors, like)?;
        if self.num_states() == 1 {
            Ok(ret.unsqueeze(1)?)
        } else {
            Ok(ret)
        }
    }

    /// `(N x K)` state occupancy probabilities
    pub fn state_posteriors(&self, stats: &Tensor) -> Result<Tensor> {
        let (_, post) = self.posteriors_of(stats)?;
        self.occupancies(&post, &self.transitions[0].natural_grad())
    }
}

impl BayesianModel for HmmModel {
    fn type_name(&self) -> &'static str {
        "HMM"
    }

    fn bayesian_parameters(&self) -> &BayesianParameterSet {
        &self.parameters
    }

    fn sub_models(&self) -> Vec<&dyn BayesianModel> {
        vec![self.emissions.as_ref()]
    }

    fn sufficient_statistics(&self, data: &Tensor) -> Result<Tensor> {
        self.emissions.sufficient_statistics(data)
    }

    fn sufficient_statistics_from_mean_var(&self, mean: &Tensor, var: &Tensor) -> Result<Tensor> {
        self.emissions.sufficient_statistics_from_mean_var(mean, var)
    }

    /// Per-frame increments of the forward normalizer. The value is
    /// computed on the host; the graph of the emission log-likelihoods
    /// is kept through `Σ_k γ_tk (ℓ_tk - stop_grad(ℓ_tk))`, which is zero
    /// and has the gradient of `ln Z` with respect to `ℓ`.
    fn expected_log_likelihood(&self, stats: &Tensor) -> Result<Tensor> {
        let (log_emission, post) = self.posteriors_of(stats)?;
        let occupancy = self.occupancies(&post, &log_emission)?;
        let n = post.frame_log_likelihood.len();
        let increments = tensor_from_host(
            post.frame_log_likelihood,
            n,
            log_emission.device(),
            log_emission.dtype(),
        )?;
        let pass_through = ((&log_emission - log_emission.detach())? * occupancy)?.sum(1)?;
        Ok((increments + pass_through)?)
    }

    /// The frames form one sequence, so per-frame weights are not
    /// supported
    fn accumulate(&self, stats: &Tensor, weights: Option<&Tensor>) -> Result<AccStats> {
        if weights.is_some() {
            return Err(VbError::InvalidArgument(
                "HMM accumulation takes no per-frame weights".to_string(),
            ));
        }
        let (log_emission, post) = self.posteriors_of(stats)?;
        let resp = self.occupancies(&post, &log_emission)?;

        let mut acc = AccStats::new();
        for (i, row) in self.transitions.iter().enumerate() {
            let counts: Vec<f64> = post.transition_counts.row(i).iter().copied().collect();
            acc.add(row, param_stats_tensor(row, counts)?)?;
        }
        acc.merge(self.emissions.accumulate(stats, Some(&resp))?)?;
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normal_set::NormalSetModel;
    use approx::assert_abs_diff_eq;

    fn example() -> Result<HmmModel> {
        let dev = Device::Cpu;
        let emissions = NormalSetModel::create(2, &[0.0], &[1.0], 1.0, 1.0, Some(2), &dev)?;
        HmmModel::create_ergodic(Box::new(emissions), 1.0, &dev)
    }

    #[test]
    fn occupancies_and_counts_are_consistent() -> Result<()> {
        let model = example()?;
        let x = Tensor::new(&[[0.3f64], [-1.0], [2.0], [0.1]], &Device::Cpu)?;
        let stats = model.sufficient_statistics(&x)?;
        let log_emission = host_matrix(&model.emissions().expected_log_likelihood(&stats)?)?;
        let post = model.forward_backward(&log_emission)?;

        for t in 0..4 {
            assert_abs_diff_eq!(post.state_posteriors.row(t).sum(), 1.0, epsilon = 1e-10);
        }
        // N - 1 transitions in a sequence of N frames
        assert_abs_diff_eq!(post.transition_counts.sum(), 3.0, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn rejects_frame_weights() -> Result<()> {
        let model = example()?;
        let x = Tensor::new(&[[0.3f64], [-1.0]], &Device::Cpu)?;
        let stats = model.sufficient_statistics(&x)?;
        let w = Tensor::new(&[1.0f64, 1.0], &Device::Cpu)?;
        assert!(model.accumulate(&stats, Some(&w)).is_err());
        Ok(())
    }
}
