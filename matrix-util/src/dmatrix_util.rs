use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
pub use rand::Rng;
pub use rand_distr::StandardNormal;

impl FlattenOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn flatten_row_major(&self) -> Vec<f64> {
        // column-major storage of the transpose is the row-major order
        self.transpose().as_slice().to_vec()
    }

    fn from_row_major(nrow: usize, ncol: usize, data: &[f64]) -> anyhow::Result<Self::Mat> {
        if data.len() != nrow * ncol {
            anyhow::bail!(
                "cannot reshape {} elements into {} x {}",
                data.len(),
                nrow,
                ncol
            );
        }
        Ok(DMatrix::from_row_slice(nrow, ncol, data))
    }
}

impl SampleOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn rnorm<R: Rng + ?Sized>(nrow: usize, ncol: usize, rng: &mut R) -> Self::Mat {
        DMatrix::from_fn(nrow, ncol, |_, _| rng.sample(StandardNormal))
    }
}

impl SpdOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn spd_inverse(&self) -> anyhow::Result<Self::Mat> {
        let chol = self
            .symmetrize()
            .cholesky()
            .ok_or_else(|| anyhow::anyhow!("matrix {:?} is not positive definite", self.shape()))?;
        Ok(chol.inverse().symmetrize())
    }

    fn spd_log_det(&self) -> anyhow::Result<f64> {
        let chol = self
            .symmetrize()
            .cholesky()
            .ok_or_else(|| anyhow::anyhow!("matrix {:?} is not positive definite", self.shape()))?;
        Ok(2.0 * chol.l().diagonal().iter().map(|x| x.ln()).sum::<f64>())
    }

    fn symmetrize(&self) -> Self::Mat {
        (self + self.transpose()) * 0.5
    }
}

/// log(sum(exp(x))) without overflow
pub fn log_sum_exp(xx: &[f64]) -> f64 {
    let max = xx.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + xx.iter().map(|x| (x - max).exp()).sum::<f64>().ln()
}
