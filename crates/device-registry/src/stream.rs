// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Device streams, notifications, and the wait-handle registry.
//!
//! A [`DeviceStream`] is the device-level queue behind one logical stream.
//! It carries a monotonic clock used to order work across streams: when a
//! producer activates a [`NotificationState`], the notification is stamped
//! with the producer's clock; when a consumer waits on it, the consumer's
//! clock advances to at least that stamp.
//!
//! The [`StreamCommandHandleRegistry`] maps (producer provider, consumer
//! provider) pairs to a device wait operation. Pairs without an entry need
//! no device-level wait — the host-side barrier alone is sufficient.

use std::collections::HashMap;
use std::sync::Arc;

/// The device-level queue backing one logical stream.
#[derive(Debug, Clone)]
pub struct DeviceStream {
    /// Provider type this stream belongs to.
    pub provider: String,
    /// Monotonic logical clock, advanced on notification activation and
    /// synchronized on waits.
    pub clock: u64,
}

impl DeviceStream {
    /// Creates a stream for the given provider with a zeroed clock.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            clock: 0,
        }
    }

    /// Advances the clock by one tick and returns the new value.
    pub fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Advances the clock to at least `other`, keeping it monotonic.
    pub fn update_clock(&mut self, other: u64) {
        self.clock = self.clock.max(other);
    }
}

/// A one-shot cross-stream event.
///
/// Produced by exactly one node on its owning stream; consumed (through a
/// barrier) by every downstream node on a different stream.
#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    /// Set once the producing stream has activated the notification.
    pub ready: bool,
    /// The producing stream's clock at activation time.
    pub stream_clock: u64,
}

impl NotificationState {
    /// Marks the notification ready, stamping the producer's clock.
    pub fn activate(&mut self, stream_clock: u64) {
        self.ready = true;
        self.stream_clock = stream_clock;
    }
}

/// A device wait operation for one (producer, consumer) provider pair.
pub type WaitFn = Arc<dyn Fn(&mut DeviceStream, &NotificationState) + Send + Sync>;

/// Wait handles keyed by producer and consumer provider type.
#[derive(Default, Clone)]
pub struct StreamCommandHandleRegistry {
    handles: HashMap<(String, String), WaitFn>,
}

impl StreamCommandHandleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the wait operation for a (producer, consumer) pair,
    /// replacing any previous handle for that pair.
    pub fn register_wait_handle(
        &mut self,
        producer: impl Into<String>,
        consumer: impl Into<String>,
        handle: WaitFn,
    ) {
        self.handles
            .insert((producer.into(), consumer.into()), handle);
    }

    /// Looks up the wait operation for a (producer, consumer) pair.
    pub fn wait_handle(&self, producer: &str, consumer: &str) -> Option<WaitFn> {
        self.handles
            .get(&(producer.to_string(), consumer.to_string()))
            .cloned()
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl std::fmt::Debug for StreamCommandHandleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCommandHandleRegistry")
            .field("pairs", &self.handles.keys().collect::<Vec<_>>())
            .finish()
    }
}
