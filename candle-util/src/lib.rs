pub mod candle_aux_layers;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_normal_heads;

pub use candle_core;
pub use candle_nn;
