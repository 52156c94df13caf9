use thiserror::Error;

/// Failure conditions of the inference core. None of them is
/// recovered internally.
#[derive(Error, Debug)]
pub enum VbError {
    #[error("unknown model type: {0}")]
    UnknownType(String),

    #[error("model type `{0}` is registered but not implemented")]
    NotImplemented(String),

    #[error("shape mismatch in {context}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Numeric(#[from] anyhow::Error),

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

impl VbError {
    pub fn shape_mismatch(context: impl Into<String>, expected: &[usize], found: &[usize]) -> Self {
        VbError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VbError>;
