use candle_core::Tensor;
use fnv::FnvHashMap;
use vb_param::{BayesianParameter, Result};

/// Accumulated sufficient statistics of one minibatch, keyed by the
/// parameter they update
#[derive(Clone, Debug, Default)]
pub struct AccStats {
    stats: FnvHashMap<BayesianParameter, Tensor>,
}

impl AccStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn get(&self, parameter: &BayesianParameter) -> Option<&Tensor> {
        self.stats.get(parameter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BayesianParameter, &Tensor)> {
        self.stats.iter()
    }

    /// Add `stats` to whatever is already accumulated for `parameter`
    pub fn add(&mut self, parameter: &BayesianParameter, stats: Tensor) -> Result<()> {
        let stats = stats.detach();
        let merged = match self.stats.remove(parameter) {
            Some(prev) => (prev + stats)?,
            None => stats,
        };
        self.stats.insert(parameter.clone(), merged);
        Ok(())
    }

    pub fn merge(&mut self, other: AccStats) -> Result<()> {
        for (parameter, stats) in other.stats {
            self.add(&parameter, stats)?;
        }
        Ok(())
    }

    /// Multiply every entry by `factor`, e.g. `datasize / batch_size`
    pub fn scale(&self, factor: f64) -> Result<AccStats> {
        let mut stats = FnvHashMap::default();
        for (parameter, s) in self.stats.iter() {
            stats.insert(parameter.clone(), (s * factor)?);
        }
        Ok(AccStats { stats })
    }

    /// Feed every entry to its parameter's natural-gradient accumulator
    pub fn apply(&self) -> Result<()> {
        for (parameter, stats) in self.stats.iter() {
            parameter.accumulate_natural_grad(stats)?;
        }
        Ok(())
    }
}
