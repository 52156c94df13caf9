use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};

/// Fully connected trunk: `Linear -> activation` for every hidden
/// layer. The output dimension is the last entry of `layers` (or the
/// input dimension if there are no layers).
pub struct MlpStack {
    linear_layers: Vec<Linear>,
    activation: Activation,
    dim_out: usize,
}

impl Module for MlpStack {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for linear in self.linear_layers.iter() {
            x = self.activation.forward(&linear.forward(&x)?)?;
        }
        Ok(x)
    }
}

impl MlpStack {
    pub fn dim_out(&self) -> usize {
        self.dim_out
    }

    pub fn num_layers(&self) -> usize {
        self.linear_layers.len()
    }
}

/// Build an [`MlpStack`] with variables
///
/// * `{prefix}.{j}.weight`, `{prefix}.{j}.bias` for each layer `j`
///
/// # Arguments
/// * `dim_in` - input dimension
/// * `layers` - hidden layer dimensions
/// * `activation` - nonlinearity after each layer
/// * `vs` - variable builder
pub fn mlp_stack(
    dim_in: usize,
    layers: &[usize],
    activation: Activation,
    vs: VarBuilder,
) -> Result<MlpStack> {
    let mut linear_layers = Vec::with_capacity(layers.len());
    let mut prev_dim = dim_in;
    for (j, &next_dim) in layers.iter().enumerate() {
        linear_layers.push(candle_nn::linear(prev_dim, next_dim, vs.pp(j.to_string()))?);
        prev_dim = next_dim;
    }
    Ok(MlpStack {
        linear_layers,
        activation,
        dim_out: prev_dim,
    })
}
