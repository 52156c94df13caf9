pub mod acc_stats;
pub mod config;
pub mod elbo;
pub mod factory;
pub mod hmm;
pub(crate) mod linear_gaussian;
pub mod mixture;
pub(crate) mod model_util;
pub mod normal;
pub mod normal_set;
pub mod plda;
pub mod ppca;
pub mod traits;
pub mod vae;

pub use acc_stats::AccStats;
pub use elbo::{evidence_lower_bound, Elbo, VbOptimizer};
pub use factory::{create_model, ModelConstructor, ModelFactory, ModelResolver};
pub use hmm::HmmModel;
pub use mixture::MixtureModel;
pub use normal::NormalDiagModel;
pub use normal_set::NormalSetModel;
pub use plda::PldaSetModel;
pub use ppca::PpcaModel;
pub use traits::{BayesianModel, BayesianModelSet};
pub use vae::Vae;
