use crate::error::{Result, VbError};
use crate::family::{Family, StandardParameters};
use crate::normal_gamma::NormalGammaStd;
use crate::{dirichlet, gamma, matrix_normal, normal_gamma};

use candle_core::{DType, Device, Tensor};
use matrix_util::tensor_util::{host_vec, tensor_from_host};
use nalgebra::{DMatrix, DVector};

/// A prior or posterior in canonical form: a family descriptor and a
/// rank-1 tensor of natural parameters.
///
/// The natural parameters never carry autodiff history; every setter
/// detaches its input. Family computations run in `f64` on the host
/// and come back in the distribution's own dtype and device.
#[derive(Clone, Debug)]
pub struct ExpFamilyDistribution {
    family: Family,
    natural_parameters: Tensor,
}

impl ExpFamilyDistribution {
    /// Wrap natural parameters. The tensor must be rank-1 with the
    /// family's natural dimension and describe a proper distribution.
    pub fn new(family: Family, natural_parameters: Tensor) -> Result<Self> {
        if natural_parameters.rank() != 1 {
            return Err(VbError::shape_mismatch(
                format!("{} natural parameters", family),
                &[family.natural_dim()],
                natural_parameters.dims(),
            ));
        }
        family.check_natural_len(natural_parameters.elem_count())?;
        let ret = Self {
            family,
            natural_parameters: natural_parameters.detach(),
        };
        ret.standard_parameters()?;
        Ok(ret)
    }

    pub fn from_host(family: Family, eta: Vec<f64>, dev: &Device, dtype: DType) -> Result<Self> {
        let len = eta.len();
        family.check_natural_len(len)?;
        Self::new(family, tensor_from_host(eta, len, dev, dtype)?)
    }

    /// `Dir(α)`
    pub fn dirichlet(alphas: &[f64], dev: &Device) -> Result<Self> {
        let family = Family::Dirichlet { dim: alphas.len() };
        Self::from_host(family, dirichlet::natural_from_standard(alphas)?, dev, DType::F64)
    }

    /// Independent `Gamma(shape, rate)`
    pub fn gamma(shapes: &[f64], rates: &[f64], dev: &Device) -> Result<Self> {
        let family = Family::Gamma { dim: shapes.len() };
        Self::from_host(family, gamma::natural_from_standard(shapes, rates)?, dev, DType::F64)
    }

    /// Normal-Gamma over the mean and diagonal precision of a Normal
    pub fn normal_gamma(
        mean: &[f64],
        scale: &[f64],
        shape: &[f64],
        rate: &[f64],
        dev: &Device,
    ) -> Result<Self> {
        let std = NormalGammaStd {
            mean: mean.to_vec(),
            scale: scale.to_vec(),
            shape: shape.to_vec(),
            rate: rate.to_vec(),
        };
        let family = Family::NormalGamma { dim: mean.len() };
        Self::from_host(family, normal_gamma::natural_from_standard(&std)?, dev, DType::F64)
    }

    /// `N(mean, cov)` with full covariance
    pub fn normal_full(mean: &DVector<f64>, cov: &DMatrix<f64>, dev: &Device) -> Result<Self> {
        let family = Family::NormalFull { dim: mean.len() };
        let mean = DMatrix::from_column_slice(mean.len(), 1, mean.as_slice());
        Self::from_host(family, matrix_normal::natural_from_standard(&mean, cov)?, dev, DType::F64)
    }

    /// Columns of `W` iid `N(mean[:,j], cov)`
    pub fn matrix_normal(mean: &DMatrix<f64>, cov: &DMatrix<f64>, dev: &Device) -> Result<Self> {
        let family = Family::MatrixNormal {
            rows: mean.nrows(),
            cols: mean.ncols(),
        };
        Self::from_host(family, matrix_normal::natural_from_standard(mean, cov)?, dev, DType::F64)
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn natural_parameters(&self) -> &Tensor {
        &self.natural_parameters
    }

    /// Same family, new natural parameters
    pub fn with_natural_parameters(&self, natural_parameters: Tensor) -> Result<Self> {
        Self::new(self.family, natural_parameters)
    }

    pub fn dtype(&self) -> DType {
        self.natural_parameters.dtype()
    }

    pub fn device(&self) -> &Device {
        self.natural_parameters.device()
    }

    fn host_natural_parameters(&self) -> Result<Vec<f64>> {
        Ok(host_vec(&self.natural_parameters)?)
    }

    fn to_own_tensor(&self, data: Vec<f64>) -> Result<Tensor> {
        let len = data.len();
        Ok(tensor_from_host(data, len, self.device(), self.dtype())?)
    }

    /// E[T(θ)]; for a posterior this is the plug-in feature vector of
    /// downstream likelihood computations
    pub fn expected_sufficient_statistics(&self) -> Result<Tensor> {
        let eta = self.host_natural_parameters()?;
        self.to_own_tensor(self.family.expected_sufficient_statistics(&eta)?)
    }

    /// E[θ] in the flattened layout of `Family::value_dim`
    pub fn expected_value(&self) -> Result<Tensor> {
        let eta = self.host_natural_parameters()?;
        self.to_own_tensor(self.family.expected_value(&eta)?)
    }

    /// Log-normalizer A(η)
    pub fn log_norm(&self) -> Result<f64> {
        self.family.log_norm(&self.host_natural_parameters()?)
    }

    pub fn standard_parameters(&self) -> Result<StandardParameters> {
        self.family
            .standard_parameters(&self.host_natural_parameters()?)
    }

    /// KL(posterior || prior) = ⟨η_q - η_p, E_q[T]⟩ - (A(η_q) - A(η_p))
    pub fn kl_div(posterior: &Self, prior: &Self) -> Result<f64> {
        prior.family.check_same(&posterior.family)?;
        let eta_q = posterior.host_natural_parameters()?;
        let eta_p = prior.host_natural_parameters()?;
        if eta_q.len() != eta_p.len() {
            return Err(VbError::shape_mismatch(
                "KL divergence",
                &[eta_p.len()],
                &[eta_q.len()],
            ));
        }
        let stats = posterior.family.expected_sufficient_statistics(&eta_q)?;
        let cross: f64 = eta_q
            .iter()
            .zip(eta_p.iter())
            .zip(stats.iter())
            .map(|((q, p), t)| (q - p) * t)
            .sum();
        let log_norm_q = posterior.family.log_norm(&eta_q)?;
        let log_norm_p = prior.family.log_norm(&eta_p)?;
        Ok(cross - (log_norm_q - log_norm_p))
    }

    pub fn to_dtype(&self, dtype: DType) -> Result<Self> {
        Ok(Self {
            family: self.family,
            natural_parameters: self.natural_parameters.to_dtype(dtype)?,
        })
    }

    pub fn to_device(&self, dev: &Device) -> Result<Self> {
        Ok(Self {
            family: self.family,
            natural_parameters: self.natural_parameters.to_device(dev)?,
        })
    }

    pub fn float(&self) -> Result<Self> {
        self.to_dtype(DType::F32)
    }

    pub fn double(&self) -> Result<Self> {
        self.to_dtype(DType::F64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use special::Gamma;

    fn all_families() -> Result<Vec<ExpFamilyDistribution>> {
        let dev = Device::Cpu;
        Ok(vec![
            ExpFamilyDistribution::dirichlet(&[0.5, 2.0, 3.5], &dev)?,
            ExpFamilyDistribution::gamma(&[2.0, 0.7], &[1.0, 3.0], &dev)?,
            ExpFamilyDistribution::normal_gamma(&[1.0, -2.0], &[0.5, 2.0], &[3.0, 1.5], &[2.0, 0.4], &dev)?,
            ExpFamilyDistribution::normal_full(
                &DVector::from_vec(vec![0.3, -0.1]),
                &DMatrix::from_row_slice(2, 2, &[1.0, 0.2, 0.2, 2.0]),
                &dev,
            )?,
            ExpFamilyDistribution::matrix_normal(
                &DMatrix::from_row_slice(2, 3, &[1., 2., 3., 4., 5., 6.]),
                &DMatrix::from_row_slice(2, 2, &[0.5, 0.1, 0.1, 0.3]),
                &dev,
            )?,
        ])
    }

    #[test]
    fn self_divergence_is_zero() -> Result<()> {
        for dist in all_families()? {
            let kl = ExpFamilyDistribution::kl_div(&dist, &dist)?;
            assert_abs_diff_eq!(kl, 0.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn gamma_kl_closed_form() -> Result<()> {
        let dev = Device::Cpu;
        let (a1, b1, a2, b2) = (3.0f64, 2.0f64, 1.5f64, 0.5f64);
        let q = ExpFamilyDistribution::gamma(&[a1], &[b1], &dev)?;
        let p = ExpFamilyDistribution::gamma(&[a2], &[b2], &dev)?;
        let expected = (a1 - a2) * a1.digamma() - a1.ln_gamma().0 + a2.ln_gamma().0
            + a2 * (b1.ln() - b2.ln())
            + a1 * (b2 - b1) / b1;
        assert_abs_diff_eq!(ExpFamilyDistribution::kl_div(&q, &p)?, expected, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn gaussian_kl_closed_form() -> Result<()> {
        let dev = Device::Cpu;
        let (m1, v1, m2, v2) = (0.5f64, 2.0f64, -1.0f64, 0.5f64);
        let q = ExpFamilyDistribution::normal_full(
            &DVector::from_element(1, m1),
            &DMatrix::from_element(1, 1, v1),
            &dev,
        )?;
        let p = ExpFamilyDistribution::normal_full(
            &DVector::from_element(1, m2),
            &DMatrix::from_element(1, 1, v2),
            &dev,
        )?;
        let expected = 0.5 * ((v2 / v1).ln() + (v1 + (m1 - m2).powi(2)) / v2 - 1.0);
        assert_abs_diff_eq!(ExpFamilyDistribution::kl_div(&q, &p)?, expected, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn kl_family_guards() -> Result<()> {
        let dev = Device::Cpu;
        let dir = ExpFamilyDistribution::dirichlet(&[1.0, 1.0], &dev)?;
        let gam = ExpFamilyDistribution::gamma(&[1.0], &[1.0], &dev)?;
        let dir3 = ExpFamilyDistribution::dirichlet(&[1.0, 1.0, 1.0], &dev)?;

        assert!(matches!(
            ExpFamilyDistribution::kl_div(&dir, &gam),
            Err(VbError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ExpFamilyDistribution::kl_div(&dir, &dir3),
            Err(VbError::ShapeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn natural_length_is_checked() -> Result<()> {
        let eta = Tensor::new(&[0.0f64, 0.0, 0.0], &Device::Cpu)?;
        let res = ExpFamilyDistribution::new(Family::Gamma { dim: 1 }, eta);
        assert!(matches!(res, Err(VbError::ShapeMismatch { .. })));
        Ok(())
    }

    #[test]
    fn precision_conversion_keeps_values() -> Result<()> {
        let dist = ExpFamilyDistribution::gamma(&[2.0], &[4.0], &Device::Cpu)?;
        let single = dist.float()?;
        assert_eq!(single.dtype(), DType::F32);
        assert_eq!(single.family(), dist.family());
        let back = single.double()?;
        assert_abs_diff_eq!(back.log_norm()?, dist.log_norm()?, epsilon = 1e-5);
        Ok(())
    }
}
