//! Backend traits - the kernel table and buffer manager for one device.
//!
//! The graph engine picks a backend at runtime from a node's device, so both
//! traits are object safe. Every kernel fills a caller-allocated output
//! buffer; host and accelerator implementations share the same contract.

use crate::device::Device;
use crate::error::Result;
use crate::shape::{Broadcast, MatmulDims, TransposeDims};
use crate::storage::{BufferMut, DeviceStorage};

/// Elementwise kernels with one tensor input and an optional scalar parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryKernel {
    /// `-x`
    Neg,
    /// `max(x, 0)`, with `relu(0) == 0`
    Relu,
    /// `1` where `x > 0`, else `0`
    Binarize,
    /// `x + n`
    AddScalar(f64),
    /// `x - n`
    SubScalar(f64),
    /// `n - x`
    ScalarSub(f64),
    /// `x * n`
    MulScalar(f64),
    /// `x / n`
    DivScalar(f64),
    /// `n / x`
    ScalarDiv(f64),
    /// `x ^ n`
    Pow(f64),
}

impl UnaryKernel {
    /// Apply the kernel to one element.
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryKernel::Neg => -x,
            UnaryKernel::Relu => {
                if x > 0.0 {
                    x
                } else {
                    0.0
                }
            }
            UnaryKernel::Binarize => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            UnaryKernel::AddScalar(n) => x + n,
            UnaryKernel::SubScalar(n) => x - n,
            UnaryKernel::ScalarSub(n) => n - x,
            UnaryKernel::MulScalar(n) => x * n,
            UnaryKernel::DivScalar(n) => x / n,
            UnaryKernel::ScalarDiv(n) => n / x,
            UnaryKernel::Pow(n) => x.powf(n),
        }
    }

    /// Short name used in logs and by accelerator kernel lookup.
    pub fn name(self) -> &'static str {
        match self {
            UnaryKernel::Neg => "neg",
            UnaryKernel::Relu => "relu",
            UnaryKernel::Binarize => "binarize",
            UnaryKernel::AddScalar(_) => "add_scalar",
            UnaryKernel::SubScalar(_) => "sub_scalar",
            UnaryKernel::ScalarSub(_) => "scalar_sub",
            UnaryKernel::MulScalar(_) => "mul_scalar",
            UnaryKernel::DivScalar(_) => "div_scalar",
            UnaryKernel::ScalarDiv(_) => "scalar_div",
            UnaryKernel::Pow(_) => "pow",
        }
    }

    /// The scalar parameter, or `0.0` for parameterless kernels.
    pub fn param(self) -> f64 {
        match self {
            UnaryKernel::Neg | UnaryKernel::Relu | UnaryKernel::Binarize => 0.0,
            UnaryKernel::AddScalar(n)
            | UnaryKernel::SubScalar(n)
            | UnaryKernel::ScalarSub(n)
            | UnaryKernel::MulScalar(n)
            | UnaryKernel::DivScalar(n)
            | UnaryKernel::ScalarDiv(n)
            | UnaryKernel::Pow(n) => n,
        }
    }
}

/// Elementwise kernels over two tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKernel {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryKernel {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryKernel::Add => a + b,
            BinaryKernel::Sub => a - b,
            BinaryKernel::Mul => a * b,
            BinaryKernel::Div => a / b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryKernel::Add => "add",
            BinaryKernel::Sub => "sub",
            BinaryKernel::Mul => "mul",
            BinaryKernel::Div => "div",
        }
    }
}

/// Allocation and host transfer for one device's memory.
pub trait BufferManager: Send + Sync {
    /// Device this manager allocates on.
    fn device(&self) -> Device;

    /// Allocate an uninitialised-by-contract buffer of `len` elements.
    fn allocate(&self, len: usize) -> Result<BufferMut>;

    /// Copy host values into a new buffer on this device.
    fn copy_host_to_device(&self, data: &[f64]) -> Result<BufferMut>;

    /// Copy a buffer owned by this device back to host memory.
    fn copy_device_to_host(&self, buf: &dyn DeviceStorage) -> Result<Vec<f64>>;
}

/// Kernel table for one device.
///
/// Output buffers are always allocated by the same backend; input buffers are
/// staged onto this backend's device by the caller.
pub trait Backend: BufferManager {
    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;

    /// `out[i] = value`
    fn fill(&self, out: &mut dyn DeviceStorage, value: f64) -> Result<()>;

    /// `out[i] = op(x[i])`
    fn unary(&self, op: UnaryKernel, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage)
        -> Result<()>;

    /// `out[i] = op(a[i], b[i])`, reading element 0 of the broadcast side.
    fn binary(
        &self,
        op: BinaryKernel,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        broadcast: Broadcast,
    ) -> Result<()>;

    /// `out[b, i, j] = sum_k a[b, i, k] * rhs[k, j]`
    fn matmul(
        &self,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        dims: MatmulDims,
    ) -> Result<()>;

    /// `out[b, j, i] = x[b, i, j]`
    fn transpose(
        &self,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
        dims: TransposeDims,
    ) -> Result<()>;

    /// `out[0] = sum_i x[i]`
    fn reduce_sum(&self, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()>;
}
