// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # stream-partitioner
//!
//! Assigns every graph node to exactly one logical execution stream.
//!
//! Two modes, selected by whether a configuration file with stream
//! assignments exists at the given path:
//!
//! - **Configured** — a line-based text file (see [`PartitionConfig`])
//!   pins every node to a stream. Malformed files abort planning with a
//!   single-line error before any plan state is created.
//! - **Default** — one stream per distinct execution provider, nodes
//!   appended in topological order. When a writable path is given but the
//!   file is missing or holds no stream lines, the derived partition is
//!   persisted back in the configured format.
//!
//! Unnamed nodes are addressed as `<op_type><k>`, `k` being the zero-based
//! occurrence index of that op type in topological order.

mod config;
mod error;
mod partitioner;

pub use config::PartitionConfig;
pub use error::PartitionError;
pub use partitioner::{create_partitioner, NodePartitioner, ProviderStreamPartitioner};

use graph_ir::NodeIndex;

/// The partitioner's output: per-stream node lists, each in topological
/// order consistent with the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPartition {
    /// Node indices per logical stream.
    pub streams: Vec<Vec<NodeIndex>>,
}

impl StreamPartition {
    /// Number of logical streams.
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Builds the node → stream map for a graph with `num_nodes` nodes.
    pub fn node_stream_map(&self, num_nodes: usize) -> Vec<usize> {
        let mut map = vec![0usize; num_nodes];
        for (stream_idx, nodes) in self.streams.iter().enumerate() {
            for &node in nodes {
                map[node] = stream_idx;
            }
        }
        map
    }
}
