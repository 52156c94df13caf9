use crate::error::Result;
use crate::parameter::BayesianParameter;
use candle_core::{DType, Device};

/// Ordered collection of parameter handles. Cloning the set clones
/// the handles, not the parameters.
#[derive(Clone, Debug, Default)]
pub struct BayesianParameterSet {
    parameters: Vec<BayesianParameter>,
}

impl BayesianParameterSet {
    pub fn new(parameters: Vec<BayesianParameter>) -> Self {
        Self { parameters }
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BayesianParameter> {
        self.parameters.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BayesianParameter> {
        self.parameters.iter()
    }

    pub fn push(&mut self, parameter: BayesianParameter) {
        self.parameters.push(parameter);
    }

    /// Append the handles of `other`, keeping their order
    pub fn extend(&mut self, other: &BayesianParameterSet) {
        self.parameters.extend(other.iter().cloned());
    }

    /// Σ KL(posterior || prior)
    pub fn kl_div(&self) -> Result<f64> {
        self.parameters.iter().map(|p| p.kl_div()).sum()
    }

    pub fn zero_natural_grad(&self) -> Result<()> {
        for p in self.parameters.iter() {
            p.zero_natural_grad()?;
        }
        Ok(())
    }

    pub fn set_dtype(&self, dtype: DType) -> Result<()> {
        for p in self.parameters.iter() {
            p.set_dtype(dtype)?;
        }
        Ok(())
    }

    pub fn set_device(&self, dev: &Device) -> Result<()> {
        for p in self.parameters.iter() {
            p.set_device(dev)?;
        }
        Ok(())
    }
}

impl std::ops::Index<usize> for BayesianParameterSet {
    type Output = BayesianParameter;

    fn index(&self, index: usize) -> &Self::Output {
        &self.parameters[index]
    }
}

impl FromIterator<BayesianParameter> for BayesianParameterSet {
    fn from_iter<I: IntoIterator<Item = BayesianParameter>>(iter: I) -> Self {
        Self {
            parameters: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a BayesianParameterSet {
    type Item = &'a BayesianParameter;
    type IntoIter = std::slice::Iter<'a, BayesianParameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}
