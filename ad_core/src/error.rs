//! Errors raised by the graph engine.

use ad_tensor::{Device, KernelError, Shape};

pub type Result<T> = std::result::Result<T, TensorError>;

#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// Operand shapes violate the operation's shape rule, or a shape is
    /// malformed. No node is created.
    #[error("shape mismatch in {op}: {detail}")]
    ShapeMismatch { op: &'static str, detail: String },

    /// The call is not valid for the tensor's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// No backend is registered for the requested device.
    #[error("no backend available for the {0} device")]
    DeviceUnavailable(Device),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TensorError {
    pub(crate) fn operands(op: &'static str, lhs: &Shape, rhs: &Shape) -> Self {
        TensorError::ShapeMismatch {
            op,
            detail: format!("lhs {lhs} vs rhs {rhs}"),
        }
    }

    pub(crate) fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        TensorError::ShapeMismatch {
            op,
            detail: detail.into(),
        }
    }
}
