//! Device placement.

use std::fmt;

/// Where a tensor's buffer lives and which backend computes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory, computed by the multi-core host backend.
    #[default]
    Host,
    /// Accelerator memory, computed by the accelerator backend.
    Accelerator,
}

impl Device {
    /// Placement of a result computed from operands on `devices`:
    /// the accelerator if any operand lives there, otherwise the host.
    pub fn resolve<I: IntoIterator<Item = Device>>(devices: I) -> Device {
        if devices.into_iter().any(|d| d == Device::Accelerator) {
            Device::Accelerator
        } else {
            Device::Host
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Host => write!(f, "host"),
            Device::Accelerator => write!(f, "accelerator"),
        }
    }
}
