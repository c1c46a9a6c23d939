//! Runtime configuration.
//!
//! Every field has a default and may be overridden from the environment:
//!
//! | Variable         | Field          | Values                 |
//! |------------------|----------------|------------------------|
//! | `AD_NUM_THREADS` | `host_threads` | positive integer       |
//! | `AD_ACCELERATOR` | `accelerator`  | `auto`, `off`          |
//! | `AD_CUDA_DEVICE` | `cuda_device`  | device ordinal         |
//! | `AD_SEED`        | `seed`         | unsigned integer       |

use std::env;
use std::str::FromStr;

use crate::error::{Result, TensorError};

pub const ENV_NUM_THREADS: &str = "AD_NUM_THREADS";
pub const ENV_ACCELERATOR: &str = "AD_ACCELERATOR";
pub const ENV_CUDA_DEVICE: &str = "AD_CUDA_DEVICE";
pub const ENV_SEED: &str = "AD_SEED";

/// Seed of the random generator behind `Tensor::fill_random`.
pub const DEFAULT_SEED: u64 = 7;

/// Whether the runtime tries to bring up an accelerator backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceleratorPolicy {
    /// Open the accelerator when the build and the machine support it.
    #[default]
    Auto,
    /// Host only.
    Disabled,
}

impl FromStr for AcceleratorPolicy {
    type Err = TensorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "on" => Ok(AcceleratorPolicy::Auto),
            "off" | "disabled" | "none" => Ok(AcceleratorPolicy::Disabled),
            other => Err(TensorError::Config(format!(
                "{ENV_ACCELERATOR}: expected `auto` or `off`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Size of a dedicated host kernel pool; `None` uses the global rayon pool.
    pub host_threads: Option<usize>,
    pub accelerator: AcceleratorPolicy,
    pub cuda_device: usize,
    pub seed: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            host_threads: None,
            accelerator: AcceleratorPolicy::Auto,
            cuda_device: 0,
            seed: DEFAULT_SEED,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by whichever `AD_*` variables are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`RuntimeConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::default();
        if let Some(v) = lookup(ENV_NUM_THREADS) {
            let threads: usize = parse(ENV_NUM_THREADS, &v)?;
            if threads == 0 {
                return Err(TensorError::Config(format!(
                    "{ENV_NUM_THREADS} must be positive"
                )));
            }
            config.host_threads = Some(threads);
        }
        if let Some(v) = lookup(ENV_ACCELERATOR) {
            config.accelerator = v.parse()?;
        }
        if let Some(v) = lookup(ENV_CUDA_DEVICE) {
            config.cuda_device = parse(ENV_CUDA_DEVICE, &v)?;
        }
        if let Some(v) = lookup(ENV_SEED) {
            config.seed = parse(ENV_SEED, &v)?;
        }
        Ok(config)
    }

    pub fn with_host_threads(mut self, threads: usize) -> Self {
        self.host_threads = Some(threads);
        self
    }

    pub fn with_accelerator(mut self, policy: AcceleratorPolicy) -> Self {
        self.accelerator = policy;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| TensorError::Config(format!("{key}=`{value}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.seed, 7);
        assert_eq!(config.accelerator, AcceleratorPolicy::Auto);
    }

    #[test]
    fn test_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            (ENV_NUM_THREADS, "4"),
            (ENV_ACCELERATOR, "OFF"),
            (ENV_CUDA_DEVICE, "1"),
            (ENV_SEED, "42"),
        ]))
        .unwrap();
        assert_eq!(config.host_threads, Some(4));
        assert_eq!(config.accelerator, AcceleratorPolicy::Disabled);
        assert_eq!(config.cuda_device, 1);
        assert_eq!(config.seed, 42);
    }

    #[test]
    fn test_malformed_values() {
        for vars in [
            [(ENV_NUM_THREADS, "many")],
            [(ENV_NUM_THREADS, "0")],
            [(ENV_ACCELERATOR, "sometimes")],
            [(ENV_SEED, "-1")],
        ] {
            let err = RuntimeConfig::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, TensorError::Config(_)), "{vars:?}: {err}");
        }
    }
}
