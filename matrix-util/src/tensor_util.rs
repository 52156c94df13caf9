use crate::traits::*;
use candle_core::{DType, Device, Tensor};
use nalgebra::{DMatrix, DVector};

/// Copy any tensor into a flat `f64` vector on the host
pub fn host_vec(x: &Tensor) -> anyhow::Result<Vec<f64>> {
    Ok(x.to_dtype(DType::F64)?
        .to_device(&Device::Cpu)?
        .flatten_all()?
        .to_vec1::<f64>()?)
}

/// Build a tensor of `shape` from host values, then move it to the
/// requested dtype and device
pub fn tensor_from_host<S>(
    data: Vec<f64>,
    shape: S,
    dev: &Device,
    dtype: DType,
) -> anyhow::Result<Tensor>
where
    S: Into<candle_core::Shape>,
{
    Ok(Tensor::from_vec(data, shape, &Device::Cpu)?
        .to_dtype(dtype)?
        .to_device(dev)?)
}

impl ConvertMatOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn from_tensor(x: &Tensor) -> anyhow::Result<Self::Mat> {
        let (nrow, ncol) = match *x.dims() {
            [n] => (n, 1),
            [n, m] => (n, m),
            _ => anyhow::bail!("expected a rank-1 or rank-2 tensor, got {:?}", x.dims()),
        };
        let data = host_vec(x)?;
        Ok(DMatrix::from_row_slice(nrow, ncol, &data))
    }

    fn to_tensor(&self, dev: &Device, dtype: DType) -> anyhow::Result<Tensor> {
        let data = self.flatten_row_major();
        if self.ncols() == 1 {
            tensor_from_host(data, self.nrows(), dev, dtype)
        } else {
            tensor_from_host(data, (self.nrows(), self.ncols()), dev, dtype)
        }
    }
}

impl ConvertMatOps for DVector<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn from_tensor(x: &Tensor) -> anyhow::Result<Self::Mat> {
        if x.rank() != 1 {
            anyhow::bail!("expected a rank-1 tensor, got {:?}", x.dims());
        }
        Ok(DVector::from_vec(host_vec(x)?))
    }

    fn to_tensor(&self, dev: &Device, dtype: DType) -> anyhow::Result<Tensor> {
        tensor_from_host(self.as_slice().to_vec(), self.len(), dev, dtype)
    }
}
