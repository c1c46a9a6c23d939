//! Errors raised by kernel backends and buffer managers.

use crate::device::Device;

pub type Result<T> = std::result::Result<T, KernelError>;

/// Failure inside a backend. The graph engine never retries these.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A buffer handed to a backend was allocated by a different backend.
    #[error("buffer on {found} passed to a {expected} backend")]
    ForeignBuffer { expected: Device, found: Device },

    /// Output and input buffer lengths disagree with the kernel's bounds.
    #[error("buffer length mismatch in {kernel}: expected {expected}, got {actual}")]
    LengthMismatch {
        kernel: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The backend cannot be brought up in this build or environment.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Device-side failure (allocation, transfer, launch).
    #[error("{backend} backend error: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl KernelError {
    pub fn backend(backend: &'static str, err: impl std::fmt::Display) -> Self {
        KernelError::Backend {
            backend,
            message: err.to_string(),
        }
    }
}
