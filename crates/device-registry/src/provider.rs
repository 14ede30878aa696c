// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution providers and the provider registry.
//!
//! A provider is a device backend a node has been assigned to. The
//! registry is frozen before planning starts; the planner only reads it.

use crate::{AllocatorKind, DeviceType, MemType, MemoryLocation, RegistryError, CPU_PROVIDER};
use std::collections::HashMap;
use std::sync::Arc;

/// One device backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionProvider {
    /// Provider type name, e.g. `"CpuExecutionProvider"`.
    pub name: String,
    /// Device class this provider executes on.
    pub device: DeviceType,
    /// Device ordinal.
    pub device_id: u16,
}

impl ExecutionProvider {
    /// Creates a provider for the given device.
    pub fn new(name: impl Into<String>, device: DeviceType, device_id: u16) -> Self {
        Self {
            name: name.into(),
            device,
            device_id,
        }
    }

    /// The host CPU provider.
    pub fn cpu() -> Self {
        Self::new(CPU_PROVIDER, DeviceType::Cpu, 0)
    }

    /// Returns the memory location this provider allocates from for the
    /// given kernel-declared memory type.
    ///
    /// Host-pinned types resolve to CPU memory even for device providers;
    /// a CPU provider resolves everything to plain host memory.
    pub fn allocator_location(&self, mem_type: MemType) -> MemoryLocation {
        match (self.device, mem_type) {
            (DeviceType::Cpu, _) => MemoryLocation::cpu(),
            (_, MemType::Default) => MemoryLocation::device(self.device, self.device_id),
            (_, MemType::HostInput) | (_, MemType::HostOutput) => MemoryLocation {
                device: DeviceType::Cpu,
                device_id: 0,
                allocator: AllocatorKind::Pinned,
            },
        }
    }

    /// The provider's default memory location.
    pub fn default_location(&self) -> MemoryLocation {
        self.allocator_location(MemType::Default)
    }
}

/// The frozen set of providers available to a session.
#[derive(Debug, Default, Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<ExecutionProvider>>,
    by_name: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. Names must be unique.
    pub fn register(&mut self, provider: ExecutionProvider) -> Result<(), RegistryError> {
        if self.by_name.contains_key(&provider.name) {
            return Err(RegistryError::DuplicateProvider(provider.name));
        }
        tracing::debug!(
            "registered provider '{}' on {}:{}",
            provider.name,
            provider.device.as_str(),
            provider.device_id,
        );
        self.by_name
            .insert(provider.name.clone(), self.providers.len());
        self.providers.push(Arc::new(provider));
        Ok(())
    }

    /// Looks up a provider by type name.
    pub fn get(&self, name: &str) -> Option<&Arc<ExecutionProvider>> {
        self.by_name.get(name).map(|&i| &self.providers[i])
    }

    /// The CPU provider, which every session must register.
    pub fn cpu(&self) -> Result<&Arc<ExecutionProvider>, RegistryError> {
        self.get(CPU_PROVIDER)
            .ok_or(RegistryError::MissingCpuProvider)
    }

    /// Iterates providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ExecutionProvider>> {
        self.providers.iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no providers are registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
