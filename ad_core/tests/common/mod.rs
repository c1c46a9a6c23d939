//! Backends and helpers shared by the integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

use ad_backend_cpu::{kernels, CpuBackend};
use ad_tensor::prelude::*;
use ad_tensor::storage::{downcast_mut, downcast_ref, expect_len};
use ad_tensor::Result;

pub fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
    assert_eq!(actual.len(), expected.len(), "{actual:?} vs {expected:?}");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tol,
            "element {i}: {a} vs {e} (tol {tol})\n{actual:?}\n{expected:?}"
        );
    }
}

/// Host backend counting kernel launches. Transfers are not counted.
#[derive(Debug, Default)]
pub struct CountingBackend {
    inner: CpuBackend,
    launches: AtomicUsize,
}

impl CountingBackend {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.launches.fetch_add(1, Ordering::SeqCst);
    }
}

impl BufferManager for CountingBackend {
    fn device(&self) -> Device {
        Device::Host
    }

    fn allocate(&self, len: usize) -> Result<BufferMut> {
        self.inner.allocate(len)
    }

    fn copy_host_to_device(&self, data: &[f64]) -> Result<BufferMut> {
        self.inner.copy_host_to_device(data)
    }

    fn copy_device_to_host(&self, buf: &dyn DeviceStorage) -> Result<Vec<f64>> {
        self.inner.copy_device_to_host(buf)
    }
}

impl Backend for CountingBackend {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn fill(&self, out: &mut dyn DeviceStorage, value: f64) -> Result<()> {
        self.count();
        self.inner.fill(out, value)
    }

    fn unary(&self, op: UnaryKernel, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()> {
        self.count();
        self.inner.unary(op, out, x)
    }

    fn binary(
        &self,
        op: BinaryKernel,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        broadcast: Broadcast,
    ) -> Result<()> {
        self.count();
        self.inner.binary(op, out, a, b, broadcast)
    }

    fn matmul(
        &self,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        dims: MatmulDims,
    ) -> Result<()> {
        self.count();
        self.inner.matmul(out, a, b, dims)
    }

    fn transpose(
        &self,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
        dims: TransposeDims,
    ) -> Result<()> {
        self.count();
        self.inner.transpose(out, x, dims)
    }

    fn reduce_sum(&self, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()> {
        self.count();
        self.inner.reduce_sum(out, x)
    }
}

/// Memory that claims to live on the accelerator.
#[derive(Debug)]
pub struct EmulatedBuffer {
    data: Vec<f64>,
}

impl DeviceStorage for EmulatedBuffer {
    fn len(&self) -> usize {
        self.data.len()
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

/// Accelerator stand-in running the host kernels on its own buffer type, so
/// every host/accelerator boundary goes through a real transfer.
#[derive(Debug, Default)]
pub struct EmulatedAccelerator {
    launches: AtomicUsize,
}

impl EmulatedAccelerator {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.launches.fetch_add(1, Ordering::SeqCst);
    }
}

fn emu(buf: &dyn DeviceStorage) -> Result<&[f64]> {
    downcast_ref::<EmulatedBuffer>(buf, Device::Accelerator).map(|b| b.data.as_slice())
}

fn emu_mut(buf: &mut dyn DeviceStorage) -> Result<&mut [f64]> {
    downcast_mut::<EmulatedBuffer>(buf, Device::Accelerator).map(|b| b.data.as_mut_slice())
}

impl BufferManager for EmulatedAccelerator {
    fn device(&self) -> Device {
        Device::Accelerator
    }

    fn allocate(&self, len: usize) -> Result<BufferMut> {
        Ok(Box::new(EmulatedBuffer { data: vec![0.0; len] }))
    }

    fn copy_host_to_device(&self, data: &[f64]) -> Result<BufferMut> {
        Ok(Box::new(EmulatedBuffer { data: data.to_vec() }))
    }

    fn copy_device_to_host(&self, buf: &dyn DeviceStorage) -> Result<Vec<f64>> {
        emu(buf).map(<[f64]>::to_vec)
    }
}

impl Backend for EmulatedAccelerator {
    fn name(&self) -> &'static str {
        "emulated"
    }

    fn fill(&self, out: &mut dyn DeviceStorage, value: f64) -> Result<()> {
        self.count();
        kernels::fill(emu_mut(out)?, value);
        Ok(())
    }

    fn unary(&self, op: UnaryKernel, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()> {
        self.count();
        expect_len(op.name(), x, out.len())?;
        kernels::unary(op, emu_mut(out)?, emu(x)?);
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
        self.count();
        kernels::binary(op, emu_mut(out)?, emu(a)?, emu(b)?, broadcast);
        Ok(())
    }

    fn matmul(
        &self,
        out: &mut dyn DeviceStorage,
        a: &dyn DeviceStorage,
        b: &dyn DeviceStorage,
        dims: MatmulDims,
    ) -> Result<()> {
        self.count();
        kernels::matmul(emu_mut(out)?, emu(a)?, emu(b)?, dims);
        Ok(())
    }

    fn transpose(
        &self,
        out: &mut dyn DeviceStorage,
        x: &dyn DeviceStorage,
        dims: TransposeDims,
    ) -> Result<()> {
        self.count();
        kernels::transpose(emu_mut(out)?, emu(x)?, dims);
        Ok(())
    }

    fn reduce_sum(&self, out: &mut dyn DeviceStorage, x: &dyn DeviceStorage) -> Result<()> {
        self.count();
        expect_len("reduce_sum", out, 1)?;
        emu_mut(out)?[0] = kernels::reduce_sum(emu(x)?);
        Ok(())
    }
}
