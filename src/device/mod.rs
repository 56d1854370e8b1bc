//! Device enumeration and round-robin placement
//!
//! Toyota Way Principles:
//! - Heijunka (Load Leveling): spread repetitions evenly across accelerators
//! - Jidoka: no accelerator is not an error, work falls back to the host
//!
//! Architecture:
//! - Probe the machine once when the allocator is built
//! - Map a batch-wide, never-reset repetition counter onto a slot
//! - Binding computation to the slot is the trainer's job

#[cfg(feature = "gpu")]
mod wgpu_probe;

#[cfg(feature = "gpu")]
pub use wgpu_probe::WgpuProbe;

use crate::config::DeviceConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Environment variable listing visible accelerator ordinals (comma separated).
pub const VISIBLE_DEVICES_ENV: &str = "CUDA_VISIBLE_DEVICES";

/// Information about a single accelerator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name (e.g., "NVIDIA RTX 4090", "gpu:0")
    pub name: String,
}

/// Source of the device list.
pub trait DeviceProbe {
    /// Enumerate the accelerators available to this process.
    fn probe(&self) -> Vec<DeviceInfo>;
}

/// Fixed number of anonymous devices (config override, tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedProbe(pub usize);

impl DeviceProbe for FixedProbe {
    fn probe(&self) -> Vec<DeviceInfo> {
        (0..self.0)
            .map(|i| DeviceInfo {
                name: format!("gpu:{i}"),
            })
            .collect()
    }
}

/// Reads `CUDA_VISIBLE_DEVICES`.
///
/// Unset, empty, or a leading negative ordinal means no accelerators.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisibleDevicesProbe;

impl VisibleDevicesProbe {
    /// Parse a visible-devices list into device infos.
    #[must_use]
    pub fn parse(value: &str) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();
        for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            // The CUDA runtime stops enumerating at the first invalid ordinal
            if entry.starts_with('-') {
                break;
            }
            devices.push(DeviceInfo {
                name: format!("gpu:{entry}"),
            });
        }
        devices
    }
}

impl DeviceProbe for VisibleDevicesProbe {
    fn probe(&self) -> Vec<DeviceInfo> {
        std::env::var(VISIBLE_DEVICES_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// Where a repetition runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceSlot {
    /// Accelerator ordinal, `0 <= i < device_count`
    Accelerator(usize),
    /// Host execution when no accelerator is available
    Fallback,
}

impl DeviceSlot {
    /// Accelerator ordinal, `None` for the fallback slot.
    #[must_use]
    pub const fn ordinal(self) -> Option<usize> {
        match self {
            Self::Accelerator(i) => Some(i),
            Self::Fallback => None,
        }
    }
}

impl fmt::Display for DeviceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accelerator(i) => write!(f, "/gpu:{i}"),
            Self::Fallback => f.write_str("/cpu:0"),
        }
    }
}

/// Round-robin device allocator.
///
/// The device list is captured once; devices are assumed not to come or go mid-batch.
#[derive(Debug, Clone)]
pub struct DeviceAllocator {
    devices: Vec<DeviceInfo>,
}

impl DeviceAllocator {
    /// Probe devices once and cache the result for the batch lifetime.
    pub fn detect(probe: &dyn DeviceProbe) -> Self {
        let devices = probe.probe();
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        info!(count = devices.len(), devices = ?names, "found {} accelerator(s)", devices.len());
        Self { devices }
    }

    /// Probe according to configuration.
    ///
    /// A configured count wins; otherwise wgpu adapters are enumerated when the
    /// `gpu` feature is enabled, and `CUDA_VISIBLE_DEVICES` is read when it is not.
    pub fn from_config(config: &DeviceConfig) -> Self {
        if let Some(count) = config.count {
            return Self::detect(&FixedProbe(count));
        }
        #[cfg(feature = "gpu")]
        let probe = WgpuProbe;
        #[cfg(not(feature = "gpu"))]
        let probe = VisibleDevicesProbe;
        Self::detect(&probe)
    }

    /// Allocator over an explicit device list.
    #[must_use]
    pub const fn from_devices(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }

    /// Number of accelerators (0 means everything runs on the fallback slot).
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Information about all devices
    #[must_use]
    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Slot for the repetition with the given batch-wide index.
    #[must_use]
    pub fn assign(&self, global_index: usize) -> DeviceSlot {
        match self.devices.len() {
            0 => DeviceSlot::Fallback,
            n => DeviceSlot::Accelerator(global_index % n),
        }
    }
}
