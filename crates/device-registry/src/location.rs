// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory spaces: device type, device id, and allocator kind.
//!
//! A [`MemoryLocation`] identifies where a value's buffer lives. The
//! planner compares locations for equality when matching free buffers and
//! orders them when bucketing reuse candidates, so the type derives the
//! full comparison set.

use std::fmt;

/// The class of device a provider executes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Host CPU.
    Cpu,
    /// Discrete or integrated GPU.
    Gpu,
    /// Neural accelerator.
    Npu,
}

impl DeviceType {
    /// Short lowercase label used in dumps and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Cpu => "cpu",
            DeviceType::Gpu => "gpu",
            DeviceType::Npu => "npu",
        }
    }
}

/// The allocator class backing a memory space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocatorKind {
    /// The device's default arena allocator.
    Device,
    /// Host-pinned staging memory used for device transfers.
    Pinned,
}

/// Kernel-declared memory-type preference for one argument.
///
/// Kernels on non-CPU providers may pin individual inputs or outputs to
/// host memory (shape tensors, small scalars fed to the launch config).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemType {
    /// The provider's default device memory.
    #[default]
    Default,
    /// Host memory written by the caller before kernel launch.
    HostInput,
    /// Host memory read by the caller after kernel completion.
    HostOutput,
}

/// A concrete memory space: device + allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct MemoryLocation {
    /// Device class.
    pub device: DeviceType,
    /// Device ordinal (always 0 for CPU).
    pub device_id: u16,
    /// Allocator class on that device.
    pub allocator: AllocatorKind,
}

impl MemoryLocation {
    /// The host CPU default location.
    pub fn cpu() -> Self {
        Self {
            device: DeviceType::Cpu,
            device_id: 0,
            allocator: AllocatorKind::Device,
        }
    }

    /// A device-default location.
    pub fn device(device: DeviceType, device_id: u16) -> Self {
        Self {
            device,
            device_id,
            allocator: AllocatorKind::Device,
        }
    }

    /// Host-pinned staging location for the given device.
    pub fn pinned() -> Self {
        Self {
            device: DeviceType::Cpu,
            device_id: 0,
            allocator: AllocatorKind::Pinned,
        }
    }

    /// Returns `true` if this location is host-visible memory.
    pub fn is_host(&self) -> bool {
        self.device == DeviceType::Cpu
    }
}

impl fmt::Display for MemoryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.allocator {
            AllocatorKind::Device => write!(f, "{}:{}", self.device.as_str(), self.device_id),
            AllocatorKind::Pinned => write!(f, "{}:{}(pinned)", self.device.as_str(), self.device_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_location() {
        let loc = MemoryLocation::cpu();
        assert!(loc.is_host());
        assert_eq!(loc.allocator, AllocatorKind::Device);
        assert_eq!(format!("{loc}"), "cpu:0");
    }

    #[test]
    fn test_pinned_is_host() {
        let loc = MemoryLocation::pinned();
        assert!(loc.is_host());
        assert_eq!(format!("{loc}"), "cpu:0(pinned)");
    }

    #[test]
    fn test_location_equality() {
        assert_eq!(
            MemoryLocation::device(DeviceType::Gpu, 0),
            MemoryLocation::device(DeviceType::Gpu, 0),
        );
        assert_ne!(
            MemoryLocation::device(DeviceType::Gpu, 0),
            MemoryLocation::device(DeviceType::Gpu, 1),
        );
        assert_ne!(MemoryLocation::cpu(), MemoryLocation::pinned());
    }

    #[test]
    fn test_location_ordering_is_total() {
        let mut locs = vec![
            MemoryLocation::device(DeviceType::Gpu, 1),
            MemoryLocation::cpu(),
            MemoryLocation::pinned(),
            MemoryLocation::device(DeviceType::Gpu, 0),
        ];
        locs.sort();
        locs.dedup();
        assert_eq!(locs.len(), 4);
    }
}
