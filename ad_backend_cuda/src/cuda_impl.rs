//! cudarc-backed implementation.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaFunction, CudaSlice, DeviceSlice, LaunchAsync, LaunchConfig};
use cudarc::nvrtc::compile_ptx;
use tracing::debug;

use ad_tensor::prelude::*;
use ad_tensor::storage::{downcast_mut, downcast_ref, expect_len};
use ad_tensor::Result;

use crate::source::{KERNEL_NAMES, KERNEL_SOURCE, MODULE, REDUCE_THREADS};

/// Device memory holding `f64` elements.
pub struct CudaBuffer {
    slice: CudaSlice<f64>,
}

impl fmt::Debug for CudaBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaBuffer")
            .field("len", &self.slice.len())
            .finish()
    }
}

impl DeviceStorage for CudaBuffer {
    fn len(&self) -> usize {
        self.slice.len()
    }

    fn device(&self) -> Device {
        Device::Accelerator
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// CUDA backend bound to one device ordinal.
#[derive(Clone)]
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    ordinal: usize,
}

impl fmt::Debug for CudaBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CudaBackend")
            .field("ordinal", &self.ordinal)
            .finish()
    }
}

fn driver_err(err: impl fmt::Debug) -> KernelError {
    KernelError::backend("cuda", format!("{err:?}"))
}

fn slice(buf: &dyn DeviceStorage) -> Result<&CudaSlice<f64>> {
    downcast_ref::<CudaBuffer>(buf, Device::Accelerator).map(|b| &b.slice)
}

fn slice_mut(buf: &mut dyn DeviceStorage) -> Result<&mut CudaSlice<f64>> {
    downcast_mut::<CudaBuffer>(buf, Device::Accelerator).map(|b| &mut b.slice)
}

impl CudaBackend {
    /// Open device `ordinal` and compile the kernel module.
    pub fn new(ordinal: usize) -> Result<Self> {
        let device =
            CudaDevice::new(ordinal).map_err(|e| KernelError::Unavailable(format!("{e:?}")))?;
        let ptx = compile_ptx(KERNEL_SOURCE).map_err(driver_err)?;
        device
            .load_ptx(ptx, MODULE, KERNEL_NAMES)
            .map_err(driver_err)?;
        debug!(ordinal, kernels = KERNEL_NAMES.len(), "loaded cuda kernel module");
        Ok(CudaBackend { device, ordinal })
    }

    fn func(&self, name: &str) -> Result<CudaFunction> {
        let name = format!("{name}_f64");
        self.device
            .get_func(MODULE, &name)
            .ok_or_else(|| KernelError::backend("cuda", format!("kernel {name} not loaded")))
    }
}

impl BufferManager for CudaBackend {
    fn device(&self) -> Device {
        Device::Accelerator
    }

    fn allocate(&self, len: usize) -> Result<BufferMut> {
        let slice = self.device.alloc_zeros::<f64>(len).map_err(driver_err)?;
        Ok(Box::new(CudaBuffer { slice }))
    }

    fn copy_host_to_device(&self, data: &[f64]) -> Result<BufferMut> {
        let slice = self.device.htod_sync_copy(data).map_err(driver_err)?;
        Ok(Box::new(CudaBuffer { slice }))
    }

    fn copy_device_to_host(&self, buf: &dyn DeviceStorage) -> Result<Vec<f64>> {
        self.device.dtoh_sync_copy(slice(buf)?).map_err(driver_err)
    }
}

impl Backend for CudaBackend {
    fn name(&self) -> &'static str {
        "cuda"
    }

    fn fill(&self, out: &mut dyn DeviceStorage, value: f64) -> Result<()> {
        let n = out.len();
        let f = self.func("fill")?;
        let out = slice_mut(out)?;
        unsafe { f.launch(LaunchConfig::for_num_elems(n as u32), (out, value, n)) }
            .map_err(driver_err)
    }

    fn unary(
        &self,
        op: UnaryKernel,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
    ) -> Result<()> {
        let n = out.len();
        expect_len(op.name(), x, n)?;
        let f = self.func(op.name())?;
        let x = slice(x)?;
        let out = slice_mut(out)?;
        unsafe { f.launch(LaunchConfig::for_num_elems(n as u32), (out, x, op.param(), n)) }
            .map_err(driver_err)
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
        let a_step: usize = if broadcast == Broadcast::Lhs { 0 } else { 1 };
        let b_step: usize = if broadcast == Broadcast::Rhs { 0 } else { 1 };
        expect_len(op.name(), a, if a_step == 0 { 1 } else { n })?;
        expect_len(op.name(), b, if b_step == 0 { 1 } else { n })?;
        let f = self.func(op.name())?;
        let (a, b) = (slice(a)?, slice(b)?);
        let out = slice_mut(out)?;
        unsafe {
            f.launch(
                LaunchConfig::for_num_elems(n as u32),
                (out, a, b, a_step, b_step, n),
            )
        }
        .map_err(driver_err)
    }

    fn matmul(
        &self,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        dims: MatmulDims,
    ) -> Result<()> {
        let n = dims.batch * dims.m * dims.n;
        expect_len("matmul", a, dims.batch * dims.m * dims.k)?;
        expect_len("matmul", b, dims.k * dims.n)?;
        expect_len("matmul", out, n)?;
        let f = self.func("matmul")?;
        let (a, b) = (slice(a)?, slice(b)?);
        let out = slice_mut(out)?;
        unsafe {
            f.launch(
                LaunchConfig::for_num_elems(n as u32),
                (out, a, b, dims.m, dims.k, dims.n, n),
            )
        }
        .map_err(driver_err)
    }

    fn transpose(
        &self,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
        dims: TransposeDims,
    ) -> Result<()> {
        let n = dims.batch * dims.rows * dims.cols;
        expect_len("transpose", x, n)?;
        expect_len("transpose", out, n)?;
        let f = self.func("transpose")?;
        let x = slice(x)?;
        let out = slice_mut(out)?;
        unsafe {
            f.launch(
                LaunchConfig::for_num_elems(n as u32),
                (out, x, dims.rows, dims.cols, n),
            )
        }
        .map_err(driver_err)
    }

    fn reduce_sum(&self, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()> {
        expect_len("reduce_sum", out, 1)?;
        let n = x.len();
        let f = self.func("reduce_sum")?;
        let x = slice(x)?;
        let out = slice_mut(out)?;
        let cfg = LaunchConfig {
            grid_dim: (1, 1, 1),
            block_dim: (REDUCE_THREADS, 1, 1),
            shared_mem_bytes: 0,
        };
        unsafe { f.launch(cfg, (out, x, n)) }.map_err(driver_err)
    }
}
