use crate::error::{Result, VbError};
use crate::{dirichlet, gamma, matrix_normal, normal_gamma};

/// Exponential-family descriptor. Two distributions belong to the same
/// family iff their descriptors are equal: the variant fixes the
/// sufficient-statistics transform and the log-normalizer, the
/// dimensions fix the length of the natural-parameter vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    /// `π ~ Dir(α)` over the `dim`-simplex
    Dirichlet { dim: usize },
    /// `dim` independent `λ ~ Gamma(a, b)` (shape, rate)
    Gamma { dim: usize },
    /// `dim` independent `(μ, λ) ~ N(μ | m, (κλ)⁻¹) Gamma(λ | a, b)`
    NormalGamma { dim: usize },
    /// `x ~ N(m, Σ)` with full covariance
    NormalFull { dim: usize },
    /// `W (rows x cols)` with columns `W[:,j] ~ N(M[:,j], Σ)` sharing `Σ`
    MatrixNormal { rows: usize, cols: usize },
}

impl Family {
    /// Short name of the sufficient-statistics transform
    pub fn kind(&self) -> &'static str {
        match self {
            Family::Dirichlet { .. } => "Dirichlet",
            Family::Gamma { .. } => "Gamma",
            Family::NormalGamma { .. } => "NormalGamma",
            Family::NormalFull { .. } => "NormalFull",
            Family::MatrixNormal { .. } => "MatrixNormal",
        }
    }

    /// Length of the natural-parameter vector
    pub fn natural_dim(&self) -> usize {
        match *self {
            Family::Dirichlet { dim } => dim,
            Family::Gamma { dim } => 2 * dim,
            Family::NormalGamma { dim } => 4 * dim,
            Family::NormalFull { dim } => dim + dim * dim,
            Family::MatrixNormal { rows, cols } => rows * cols + rows * rows,
        }
    }

    /// Length of a random variable drawn from the family
    pub fn value_dim(&self) -> usize {
        match *self {
            Family::Dirichlet { dim } => dim,
            Family::Gamma { dim } => dim,
            Family::NormalGamma { dim } => 2 * dim,
            Family::NormalFull { dim } => dim,
            Family::MatrixNormal { rows, cols } => rows * cols,
        }
    }

    /// Fail unless `other` is the same family
    pub fn check_same(&self, other: &Family) -> Result<()> {
        if self.kind() != other.kind() {
            return Err(VbError::TypeMismatch {
                expected: self.to_string(),
                found: other.to_string(),
            });
        }
        if self != other {
            return Err(VbError::shape_mismatch(
                format!("{} natural parameters", self.kind()),
                &[self.natural_dim()],
                &[other.natural_dim()],
            ));
        }
        Ok(())
    }

    pub(crate) fn check_natural_len(&self, len: usize) -> Result<()> {
        if len != self.natural_dim() {
            return Err(VbError::shape_mismatch(
                format!("{} natural parameters", self),
                &[self.natural_dim()],
                &[len],
            ));
        }
        Ok(())
    }

    /// `T(θ)` for one value `θ` of the random variable (flattened)
    pub fn sufficient_statistics(&self, value: &[f64]) -> Result<Vec<f64>> {
        if value.len() != self.value_dim() {
            return Err(VbError::shape_mismatch(
                format!("{} value", self),
                &[self.value_dim()],
                &[value.len()],
            ));
        }
        match self {
            Family::Dirichlet { .. } => dirichlet::sufficient_statistics(value),
            Family::Gamma { .. } => gamma::sufficient_statistics(value),
            Family::NormalGamma { .. } => normal_gamma::sufficient_statistics(value),
            Family::NormalFull { dim } => matrix_normal::sufficient_statistics(value, *dim, 1),
            Family::MatrixNormal { rows, cols } => matrix_normal::sufficient_statistics(value, *rows, *cols),
        }
    }

    pub(crate) fn log_norm(&self, eta: &[f64]) -> Result<f64> {
        self.check_natural_len(eta.len())?;
        match self {
            Family::Dirichlet { .. } => dirichlet::log_norm(eta),
            Family::Gamma { .. } => gamma::log_norm(eta),
            Family::NormalGamma { .. } => normal_gamma::log_norm(eta),
            Family::NormalFull { dim } => matrix_normal::log_norm(eta, *dim, 1),
            Family::MatrixNormal { rows, cols } => matrix_normal::log_norm(eta, *rows, *cols),
        }
    }

    pub(crate) fn expected_sufficient_statistics(&self, eta: &[f64]) -> Result<Vec<f64>> {
        self.check_natural_len(eta.len())?;
        match self {
            Family::Dirichlet { .. } => dirichlet::expected_sufficient_statistics(eta),
            Family::Gamma { .. } => gamma::expected_sufficient_statistics(eta),
            Family::NormalGamma { .. } => normal_gamma::expected_sufficient_statistics(eta),
            Family::NormalFull { dim } => matrix_normal::expected_sufficient_statistics(eta, *dim, 1),
            Family::MatrixNormal { rows, cols } => matrix_normal::expected_sufficient_statistics(eta, *rows, *cols),
        }
    }

    pub(crate) fn expected_value(&self, eta: &[f64]) -> Result<Vec<f64>> {
        self.check_natural_len(eta.len())?;
        match self {
            Family::Dirichlet { .. } => dirichlet::expected_value(eta),
            Family::Gamma { .. } => gamma::expected_value(eta),
            Family::NormalGamma { .. } => normal_gamma::expected_value(eta),
            Family::NormalFull { dim } => matrix_normal::expected_value(eta, *dim, 1),
            Family::MatrixNormal { rows, cols } => matrix_normal::expected_value(eta, *rows, *cols),
        }
    }

    pub(crate) fn standard_parameters(&self, eta: &[f64]) -> Result<StandardParameters> {
        self.check_natural_len(eta.len())?;
        Ok(match self {
            Family::Dirichlet { .. } => StandardParameters::Dirichlet {
                alphas: dirichlet::standard_from_natural(eta)?,
            },
            Family::Gamma { .. } => {
                let (shapes, rates) = gamma::standard_from_natural(eta)?;
                StandardParameters::Gamma { shapes, rates }
            }
            Family::NormalGamma { .. } => {
                let std = normal_gamma::standard_from_natural(eta)?;
                StandardParameters::NormalGamma {
                    mean: std.mean,
                    scale: std.scale,
                    shape: std.shape,
                    rate: std.rate,
                }
            }
            Family::NormalFull { dim } => {
                let (mean, cov) = matrix_normal::standard_from_natural(eta, *dim, 1)?;
                StandardParameters::MatrixNormal { mean, cov }
            }
            Family::MatrixNormal { rows, cols } => {
                let (mean, cov) = matrix_normal::standard_from_natural(eta, *rows, *cols)?;
                StandardParameters::MatrixNormal { mean, cov }
            }
        })
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Dirichlet { dim }
            | Family::Gamma { dim }
            | Family::NormalGamma { dim }
            | Family::NormalFull { dim } => write!(f, "{}(dim={})", self.kind(), dim),
            Family::MatrixNormal { rows, cols } => {
                write!(f, "{}(rows={}, cols={})", self.kind(), rows, cols)
            }
        }
    }
}

/// Standard (non-canonical) parameters recovered from the natural form
#[derive(Clone, Debug, PartialEq)]
pub enum StandardParameters {
    Dirichlet {
        alphas: Vec<f64>,
    },
    Gamma {
        shapes: Vec<f64>,
        rates: Vec<f64>,
    },
    NormalGamma {
        mean: Vec<f64>,
        scale: Vec<f64>,
        shape: Vec<f64>,
        rate: Vec<f64>,
    },
    /// full-covariance Normal uses a single column
    MatrixNormal {
        mean: nalgebra::DMatrix<f64>,
        cov: nalgebra::DMatrix<f64>,
    },
}
