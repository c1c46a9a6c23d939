//! Device buffers.
//!
//! A buffer is written once by the kernel that produces it and then shared
//! read-only through [`Buffer`]. Backends downcast the trait objects they
//! receive back to their own concrete storage type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::device::Device;
use crate::error::{KernelError, Result};

/// Raw `f64` storage owned by one backend.
pub trait DeviceStorage: Any + Send + Sync + fmt::Debug {
    /// Number of `f64` elements.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device the memory lives on.
    fn device(&self) -> Device;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared, read-only materialized buffer. Memory is released when the last
/// reference is dropped.
pub type Buffer = Arc<dyn DeviceStorage>;

/// Freshly allocated buffer, exclusively owned until a kernel has filled it.
pub type BufferMut = Box<dyn DeviceStorage>;

/// Downcast a buffer to the storage type of the backend expecting it.
pub fn downcast_ref<T: DeviceStorage>(buf: &dyn DeviceStorage, expected: Device) -> Result<&T> {
    let found = buf.device();
    buf.as_any()
        .downcast_ref::<T>()
        .ok_or(KernelError::ForeignBuffer { expected, found })
}

/// Mutable counterpart of [`downcast_ref`].
pub fn downcast_mut<T: DeviceStorage>(
    buf: &mut dyn DeviceStorage,
    expected: Device,
) -> Result<&mut T> {
    let found = buf.device();
    buf.as_any_mut()
        .downcast_mut::<T>()
        .ok_or(KernelError::ForeignBuffer { expected, found })
}

/// Check a buffer has exactly `expected` elements.
pub fn expect_len(kernel: &'static str, buf: &dyn DeviceStorage, expected: usize) -> Result<()> {
    if buf.len() == expected {
        Ok(())
    } else {
        Err(KernelError::LengthMismatch {
            kernel,
            expected,
            actual: buf.len(),
        })
    }
}
