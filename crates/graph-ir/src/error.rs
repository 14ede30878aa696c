// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the graph model.

/// Errors that can occur while building or querying a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph failed structural validation.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// A specific node failed validation.
    #[error("invalid node '{node}': {detail}")]
    InvalidNode { node: String, detail: String },

    /// Two values (or value registrations) share a name.
    #[error("duplicate value name '{0}'")]
    DuplicateValue(String),

    /// A lookup referenced a value name with no table entry.
    #[error("unknown value '{0}'")]
    UnknownValue(String),

    /// A lookup referenced a node index outside the graph.
    #[error("unknown node index {0}")]
    UnknownNode(usize),

    /// Manifest file I/O failed.
    #[error("manifest I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest JSON was malformed.
    #[error("manifest parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A provider referenced by the manifest is not declared in it.
    #[error(transparent)]
    Registry(#[from] device_registry::RegistryError),
}
