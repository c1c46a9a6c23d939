//! CUDA accelerator backend for ad_tensor.
//!
//! The device kernels are compiled at runtime with NVRTC and launched through
//! `cudarc`. Everything that touches the driver sits behind the `cuda`
//! feature; without it [`open`] reports the backend as unavailable so callers
//! can fall back to host placement.

use std::sync::Arc;

use ad_tensor::{Backend, Result};

#[cfg(not(feature = "cuda"))]
use ad_tensor::KernelError;

#[cfg(feature = "cuda")]
mod cuda_impl;
pub mod source;

#[cfg(feature = "cuda")]
pub use cuda_impl::{CudaBackend, CudaBuffer};

pub use source::KERNEL_SOURCE;

/// Open the CUDA device with the given ordinal.
pub fn open(ordinal: usize) -> Result<Arc<dyn Backend>> {
    #[cfg(feature = "cuda")]
    {
        let backend = CudaBackend::new(ordinal)?;
        Ok(Arc::new(backend))
    }

    #[cfg(not(feature = "cuda"))]
    {
        Err(KernelError::Unavailable(format!(
            "cuda device {ordinal} requested but ad_backend_cuda was built without the `cuda` feature"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_open_without_feature_is_unavailable() {
        assert!(matches!(open(0), Err(KernelError::Unavailable(_))));
    }

    #[test]
    fn test_kernel_source_declares_every_kernel() {
        for name in source::KERNEL_NAMES {
            assert!(
                KERNEL_SOURCE.contains(&format!("void {name}(")),
                "missing kernel {name}"
            );
        }
    }
}
