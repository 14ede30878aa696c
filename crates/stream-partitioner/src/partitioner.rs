// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Node partitioner implementations.
//!
//! [`create_partitioner`] selects the partitioner named on the first line
//! of the configuration file; with no file (or a name-only file) it falls
//! back to [`ProviderStreamPartitioner`] in default mode and arranges for
//! the derived partition to be written back.

use crate::{PartitionConfig, PartitionError, StreamPartition};
use graph_ir::Graph;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Registered name of the provider-stream partitioner.
const PROVIDER_STREAM_PARTITIONER: &str = "DummyPartition";

/// A strategy assigning each node to exactly one logical stream.
///
/// The initial node ordering within each stream must preserve the graph's
/// topological order.
pub trait NodePartitioner {
    /// Name recorded on the first line of the configuration file.
    fn name(&self) -> &str;

    /// Partitions the graph's nodes into streams.
    fn partition(&mut self, graph: &Graph) -> Result<StreamPartition, PartitionError>;
}

/// The default partitioner.
///
/// In configured mode it replays the stream assignment pinned in the
/// configuration file. In default mode it groups nodes per execution
/// provider — one stream each, providers in lexicographic order — and
/// persists the result when a writable path was supplied.
pub struct ProviderStreamPartitioner {
    config: PartitionConfig,
    config_path: Option<PathBuf>,
    needs_write_back: bool,
}

impl ProviderStreamPartitioner {
    fn new(config: PartitionConfig, config_path: Option<PathBuf>, needs_write_back: bool) -> Self {
        Self {
            config,
            config_path,
            needs_write_back,
        }
    }

    /// Derives the default partition: one stream per provider, nodes in
    /// topological order, providers sorted by name.
    fn derive_default(&mut self, graph: &Graph) {
        let mut providers: Vec<&str> = Vec::new();
        for node in graph.nodes_in_topological_order() {
            if !providers.contains(&node.provider.as_str()) {
                providers.push(&node.provider);
            }
        }
        providers.sort_unstable();

        let stream_of: HashMap<&str, usize> = providers
            .iter()
            .enumerate()
            .map(|(i, &p)| (p, i))
            .collect();

        let mut stream_node_names: Vec<Vec<String>> = vec![Vec::new(); providers.len()];
        let mut op_type_counter: HashMap<&str, usize> = HashMap::new();
        for node in graph.nodes_in_topological_order() {
            let display = display_name(&node.name, &node.op_type, &mut op_type_counter);
            stream_node_names[stream_of[node.provider.as_str()]].push(display);
        }

        self.config.provider_streams = providers
            .iter()
            .map(|&p| (p.to_string(), 1usize))
            .collect();
        self.config.stream_node_names = stream_node_names;

        if self.needs_write_back {
            if let Some(path) = &self.config_path {
                match self.config.write_file(path) {
                    Ok(()) => tracing::info!(
                        "persisted derived partition ({} streams) to '{}'",
                        self.config.num_streams(),
                        path.display(),
                    ),
                    Err(e) => tracing::warn!(
                        "failed to persist partition to '{}': {e}",
                        path.display(),
                    ),
                }
            }
        }
    }
}

impl NodePartitioner for ProviderStreamPartitioner {
    fn name(&self) -> &str {
        PROVIDER_STREAM_PARTITIONER
    }

    fn partition(&mut self, graph: &Graph) -> Result<StreamPartition, PartitionError> {
        if self.config.is_empty() {
            self.derive_default(graph);
        }

        let mut node_stream: HashMap<&str, usize> = HashMap::new();
        for (stream_idx, names) in self.config.stream_node_names.iter().enumerate() {
            for name in names {
                node_stream.insert(name.as_str(), stream_idx);
            }
        }

        let mut streams: Vec<Vec<usize>> = vec![Vec::new(); self.config.stream_node_names.len()];
        let mut op_type_counter: HashMap<&str, usize> = HashMap::new();
        for node in graph.nodes_in_topological_order() {
            let display = display_name(&node.name, &node.op_type, &mut op_type_counter);
            let Some(&stream_idx) = node_stream.get(display.as_str()) else {
                return Err(PartitionError::InvalidConfig(format!(
                    "node '{display}' is not assigned to any stream",
                )));
            };
            streams[stream_idx].push(node.index);
        }

        Ok(StreamPartition { streams })
    }
}

/// The externally visible name of a node: its own name, or
/// `<op_type><k>` for unnamed nodes, with `k` the zero-based occurrence
/// index of the op type in topological order.
fn display_name<'a>(
    name: &str,
    op_type: &'a str,
    op_type_counter: &mut HashMap<&'a str, usize>,
) -> String {
    if !name.is_empty() {
        return name.to_string();
    }
    let counter = op_type_counter.entry(op_type).or_insert(0);
    let display = format!("{op_type}{counter}");
    *counter += 1;
    display
}

/// Creates the partitioner selected by the configuration file.
///
/// - No path: default mode, nothing is persisted.
/// - Path to a readable file: the first line selects the partitioner; a
///   name-only file triggers default mode with write-back.
/// - Path to a missing file: the file is created with the default
///   partitioner's name line, and the derived partition is written back
///   after partitioning.
pub fn create_partitioner(
    config_path: Option<&Path>,
) -> Result<Box<dyn NodePartitioner>, PartitionError> {
    let Some(path) = config_path else {
        return Ok(Box::new(ProviderStreamPartitioner::new(
            PartitionConfig::name_only(PROVIDER_STREAM_PARTITIONER),
            None,
            false,
        )));
    };

    if path.exists() {
        let config = PartitionConfig::from_file(path)?;
        if config.partitioner_name != PROVIDER_STREAM_PARTITIONER {
            return Err(PartitionError::UnknownPartitioner(config.partitioner_name));
        }
        let write_back = config.is_empty();
        Ok(Box::new(ProviderStreamPartitioner::new(
            config,
            Some(path.to_path_buf()),
            write_back,
        )))
    } else {
        // Create the marker file now so an unwritable path fails before
        // planning rather than after.
        let config = PartitionConfig::name_only(PROVIDER_STREAM_PARTITIONER);
        config.write_file(path)?;
        Ok(Box::new(ProviderStreamPartitioner::new(
            config,
            Some(path.to_path_buf()),
            true,
        )))
    }
}
