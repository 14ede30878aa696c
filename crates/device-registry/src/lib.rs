// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # device-registry
//!
//! Execution providers, memory locations, and the device-stream
//! synchronization primitives shared by the planner and the executor.
//!
//! # Key Components
//!
//! - [`ExecutionProvider`] / [`ProviderRegistry`] — the device backends a
//!   graph has been partitioned onto, and the allocator each backend
//!   selects for a given [`MemType`].
//! - [`MemoryLocation`] — a concrete memory space: device type, device id,
//!   allocator kind. The planner keys every placement and reuse decision
//!   on this value.
//! - [`DeviceStream`] / [`NotificationState`] — a per-logical-stream device
//!   queue with a monotonic clock, and the one-shot cross-stream event
//!   that carries that clock between streams.
//! - [`StreamCommandHandleRegistry`] — wait handles keyed by
//!   (producer provider, consumer provider). When a pair has no handle,
//!   the planner omits the device-level wait (same-device case).

mod error;
mod location;
mod provider;
mod stream;

pub use error::RegistryError;
pub use location::{AllocatorKind, DeviceType, MemType, MemoryLocation};
pub use provider::{ExecutionProvider, ProviderRegistry};
pub use stream::{DeviceStream, NotificationState, StreamCommandHandleRegistry, WaitFn};

/// Canonical provider name for the host CPU backend.
pub const CPU_PROVIDER: &str = "CpuExecutionProvider";
