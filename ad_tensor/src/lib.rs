//! # ad_tensor - Shapes, Devices and the Kernel Backend Interface
//!
//! This crate holds the pieces shared by the graph engine (`ad_core`) and the
//! kernel backends (`ad_backend_cpu`, `ad_backend_cuda`):
//! - [`Shape`] with the narrow broadcast, matmul and transpose resolution rules
//! - [`Device`] placement
//! - [`DeviceStorage`] / [`Buffer`] - raw `f64` buffers owned by a backend
//! - [`BufferManager`] and [`Backend`] - allocation, transfer and kernels

pub mod backend;
pub mod device;
pub mod error;
pub mod shape;
pub mod storage;

pub use backend::{Backend, BinaryKernel, BufferManager, UnaryKernel};
pub use device::Device;
pub use error::{KernelError, Result};
pub use shape::{Broadcast, MatmulDims, Shape, TransposeDims};
pub use storage::{Buffer, BufferMut, DeviceStorage};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::{Backend, BinaryKernel, BufferManager, UnaryKernel};
    pub use crate::device::Device;
    pub use crate::error::KernelError;
    pub use crate::shape::{Broadcast, MatmulDims, Shape, TransposeDims};
    pub use crate::storage::{Buffer, BufferMut, DeviceStorage};
}
