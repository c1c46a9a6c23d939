//! Process-wide registry of kernel backends, one per device.
//!
//! Nodes record a [`Device`]; the evaluator looks up the backend for that
//! device here at evaluation time, so backends can be swapped without
//! rebuilding (tests install counting and emulated backends this way).

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, warn};

use ad_backend_cpu::CpuBackend;
use ad_tensor::{Backend, Device};

use crate::config::{AcceleratorPolicy, RuntimeConfig};
use crate::error::{Result, TensorError};

struct Runtime {
    host: Arc<dyn Backend>,
    accelerator: Option<Arc<dyn Backend>>,
    rng: Mutex<StdRng>,
}

impl Runtime {
    fn build(config: &RuntimeConfig) -> Runtime {
        let host: Arc<dyn Backend> = match config.host_threads {
            Some(threads) => match CpuBackend::with_threads(threads) {
                Ok(backend) => Arc::new(backend),
                Err(err) => {
                    warn!(threads, %err, "falling back to the global rayon pool");
                    Arc::new(CpuBackend::new())
                }
            },
            None => Arc::new(CpuBackend::new()),
        };

        let accelerator = match config.accelerator {
            AcceleratorPolicy::Disabled => None,
            AcceleratorPolicy::Auto => match ad_backend_cuda::open(config.cuda_device) {
                Ok(backend) => Some(backend),
                Err(err) => {
                    debug!(%err, "no accelerator backend");
                    None
                }
            },
        };

        debug!(
            host = host.name(),
            accelerator = accelerator.as_ref().map(|b| b.name()),
            seed = config.seed,
            "runtime initialized"
        );
        Runtime {
            host,
            accelerator,
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
        }
    }
}

static RUNTIME: Lazy<RwLock<Runtime>> =
    Lazy::new(|| RwLock::new(Runtime::build(&RuntimeConfig::default())));

/// Rebuild the runtime from `config`, replacing every installed backend and
/// reseeding the random generator.
///
/// An accelerator that cannot be opened under [`AcceleratorPolicy::Auto`]
/// leaves the runtime host-only.
pub fn init(config: &RuntimeConfig) {
    let runtime = Runtime::build(config);
    *RUNTIME.write() = runtime;
}

/// Register `backend` for `device`, replacing the current one.
pub fn install_backend(device: Device, backend: Arc<dyn Backend>) -> Result<()> {
    if backend.device() != device {
        return Err(TensorError::InvalidState(format!(
            "{} backend serves the {} device, not {device}",
            backend.name(),
            backend.device()
        )));
    }
    debug!(%device, backend = backend.name(), "installing backend");
    let mut runtime = RUNTIME.write();
    match device {
        Device::Host => runtime.host = backend,
        Device::Accelerator => runtime.accelerator = Some(backend),
    }
    Ok(())
}

/// Unregister the accelerator backend. Accelerator placements fail with
/// [`TensorError::DeviceUnavailable`] afterwards.
pub fn remove_accelerator() {
    if RUNTIME.write().accelerator.take().is_some() {
        debug!("accelerator backend removed");
    }
}

/// Backend serving `device`.
pub fn backend(device: Device) -> Result<Arc<dyn Backend>> {
    let runtime = RUNTIME.read();
    match device {
        Device::Host => Ok(runtime.host.clone()),
        Device::Accelerator => runtime
            .accelerator
            .clone()
            .ok_or(TensorError::DeviceUnavailable(Device::Accelerator)),
    }
}

pub fn is_available(device: Device) -> bool {
    backend(device).is_ok()
}

/// Draw `len` samples from a normal distribution using the runtime's seeded
/// generator.
pub(crate) fn sample_normal(len: usize, mean: f64, stddev: f64) -> Result<Vec<f64>> {
    let normal = Normal::new(mean, stddev).map_err(|e| {
        TensorError::InvalidState(format!("normal(mean={mean}, stddev={stddev}): {e}"))
    })?;
    let runtime = RUNTIME.read();
    let mut rng = runtime.rng.lock();
    Ok((0..len).map(|_| normal.sample(&mut *rng)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests in this module must not change the global runtime, other unit
    // tests rely on the default host backend.

    #[test]
    fn test_host_backend_always_present() {
        let host = backend(Device::Host).unwrap();
        assert_eq!(host.device(), Device::Host);
        assert!(is_available(Device::Host));
    }

    #[test]
    fn test_install_rejects_wrong_device() {
        let err = install_backend(Device::Accelerator, Arc::new(CpuBackend::new())).unwrap_err();
        assert!(matches!(err, TensorError::InvalidState(_)));
    }

    #[test]
    fn test_sample_normal() {
        let samples = sample_normal(1000, 2.0, 0.5).unwrap();
        assert_eq!(samples.len(), 1000);
        let mean = samples.iter().sum::<f64>() / 1000.0;
        assert!((mean - 2.0).abs() < 0.1, "mean {mean}");

        assert!(sample_normal(3, 0.0, -1.0).is_err());
    }
}
