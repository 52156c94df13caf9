pub mod dirichlet;
pub mod distribution;
pub mod error;
pub mod family;
pub mod gamma;
pub mod matrix_normal;
pub mod normal_diag;
pub mod normal_gamma;
pub mod parameter;
pub mod parameter_set;
pub mod traits;

pub use distribution::ExpFamilyDistribution;
pub use error::{Result, VbError};
pub use family::{Family, StandardParameters};
pub use normal_diag::NormalDiagonalState;
pub use parameter::{BayesianParameter, ParamId};
pub use parameter_set::BayesianParameterSet;
pub use traits::PosteriorObserver;
