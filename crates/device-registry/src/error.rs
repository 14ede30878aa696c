// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the provider registry.

/// Errors that can occur while building or querying the provider registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A provider with the same name was registered twice.
    #[error("execution provider '{0}' is already registered")]
    DuplicateProvider(String),

    /// A lookup referenced a provider that was never registered.
    #[error("unknown execution provider '{0}'")]
    UnknownProvider(String),

    /// No CPU provider is registered, but one is required.
    #[error("no CPU execution provider registered")]
    MissingCpuProvider,
}
