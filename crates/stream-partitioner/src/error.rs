// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for stream partitioning.

/// Errors that can occur while reading a partition configuration or
/// assigning nodes to streams.
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// The configuration file violates the documented line format.
    #[error("invalid partition configuration: {0}")]
    InvalidConfig(String),

    /// The configuration names a partitioner this build does not provide.
    #[error("invalid node partitioner name '{0}'")]
    UnknownPartitioner(String),

    /// The configuration file could not be read or written.
    #[error("partition configuration I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Graph lookups failed while assigning nodes.
    #[error(transparent)]
    Graph(#[from] graph_ir::GraphError),
}
