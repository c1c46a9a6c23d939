//! Multi-core host backend for ad_tensor.
//!
//! Kernels run as rayon parallel loops, either on the global rayon pool or on
//! a dedicated pool sized by the caller.

use std::any::Any;
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use ad_tensor::prelude::*;
use ad_tensor::storage::{downcast_mut, downcast_ref, expect_len};
use ad_tensor::Result;

pub mod kernels;

/// Host memory buffer.
#[derive(Clone, Debug, Default)]
pub struct HostBuffer {
    data: Vec<f64>,
}

impl HostBuffer {
    pub fn new(data: Vec<f64>) -> Self {
        HostBuffer { data }
    }

    pub fn zeros(len: usize) -> Self {
        HostBuffer { data: vec![0.0; len] }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl DeviceStorage for HostBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn device(&self) -> Device {
        Device::Host
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// CPU backend.
#[derive(Clone, Default)]
pub struct CpuBackend {
    pool: Option<Arc<ThreadPool>>,
}

impl std::fmt::Debug for CpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuBackend")
            .field("threads", &self.num_threads())
            .finish()
    }
}

impl CpuBackend {
    /// Backend running on the global rayon pool.
    pub fn new() -> Self {
        CpuBackend { pool: None }
    }

    /// Backend running on a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ad-cpu-{i}"))
            .build()
            .map_err(|e| KernelError::backend("cpu", e))?;
        debug!(threads, "built dedicated host kernel pool");
        Ok(CpuBackend {
            pool: Some(Arc::new(pool)),
        })
    }

    /// Worker count kernels will use.
    pub fn num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn run<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

fn host(buf: &dyn DeviceStorage) -> Result<&[f64]> {
    downcast_ref::<HostBuffer>(buf, Device::Host).map(HostBuffer::as_slice)
}

fn host_mut(buf: &mut dyn DeviceStorage) -> Result<&mut [f64]> {
    downcast_mut::<HostBuffer>(buf, Device::Host).map(HostBuffer::as_mut_slice)
}

impl BufferManager for CpuBackend {
    fn device(&self) -> Device {
        Device::Host
    }

    fn allocate(&self, len: usize) -> Result<BufferMut> {
        Ok(Box::new(HostBuffer::zeros(len)))
    }

    fn copy_host_to_device(&self, data: &[f64]) -> Result<BufferMut> {
        Ok(Box::new(HostBuffer::new(data.to_vec())))
    }

    fn copy_device_to_host(&self, buf: &dyn DeviceStorage) -> Result<Vec<f64>> {
        host(buf).map(<[f64]>::to_vec)
    }
}

impl Backend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn fill(&self, out: &mut dyn DeviceStorage, value: f64) -> Result<()> {
        let out = host_mut(out)?;
        self.run(|| kernels::fill(out, value));
        Ok(())
    }

    fn unary(
        &self,
        op: UnaryKernel,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
    ) -> Result<()> {
        expect_len(op.name(), x, out.len())?;
        let x = host(x)?;
        let out = host_mut(out)?;
        self.run(|| kernels::unary(op, out, x));
        Ok(())
    }

    fn binary(
        &self,
        op: BinaryKernel,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        broadcast: Broadcast,
    ) -> Result<()> {
        let n = out.len();
        expect_len(op.name(), a, if broadcast == Broadcast::Lhs { 1 } else { n })?;
        expect_len(op.name(), b, if broadcast == Broadcast::Rhs { 1 } else { n })?;
        let (a, b) = (host(a)?, host(b)?);
        let out = host_mut(out)?;
        self.run(|| kernels::binary(op, out, a, b, broadcast));
        Ok(())
    }

    fn matmul(
        &self,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        dims: MatmulDims,
    ) -> Result<()> {
        expect_len("matmul", a, dims.batch * dims.m * dims.k)?;
        expect_len("matmul", b, dims.k * dims.n)?;
        expect_len("matmul", out, dims.batch * dims.m * dims.n)?;
        let (a, b) = (host(a)?, host(b)?);
        let out = host_mut(out)?;
        self.run(|| kernels::matmul(out, a, b, dims));
        Ok(())
    }

    fn transpose(
        &self,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
        dims: TransposeDims,
    ) -> Result<()> {
        expect_len("transpose", x, dims.batch * dims.rows * dims.cols)?;
        expect_len("transpose", out, x.len())?;
        let x = host(x)?;
        let out = host_mut(out)?;
        self.run(|| kernels::transpose(out, x, dims));
        Ok(())
    }

    fn reduce_sum(&self, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()> {
        expect_len("reduce_sum", out, 1)?;
        let x = host(x)?;
        let total = self.run(|| kernels::reduce_sum(x));
        host_mut(out)?[0] = total;
        Ok(())
    }
}
