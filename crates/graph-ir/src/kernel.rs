// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kernel-declared planning metadata.
//!
//! The planner never executes kernels; it only reads the contracts a
//! kernel publishes about its arguments. All pairs are
//! `(input_index, output_index)`.

use crate::NodeIndex;
use device_registry::MemType;
use std::collections::HashMap;
use std::sync::Arc;

/// Planning metadata for one kernel.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct KernelDef {
    /// Mandatory aliases: the output *must* share the input's storage
    /// (e.g. Reshape).
    #[serde(default)]
    pub alias: Vec<(usize, usize)>,
    /// Variadic alias offsets `(input_offset, output_offset)`: output at
    /// relative offset maps to input at relative offset (e.g. AllReduce).
    #[serde(default)]
    pub variadic_alias: Option<(usize, usize)>,
    /// Optional in-place pairs; require last-use and equal byte size.
    #[serde(default)]
    pub may_inplace: Vec<(usize, usize)>,
    /// Input positions that accept strided (non-contiguous) tensors.
    #[serde(default)]
    pub may_strided_input: Vec<usize>,
    /// Outputs that may become strided views over an input.
    #[serde(default)]
    pub may_strided_output: Vec<(usize, usize)>,
    /// Per-input memory-type overrides; unlisted inputs use [`MemType::Default`].
    #[serde(default)]
    pub input_mem_types: HashMap<usize, MemType>,
    /// Per-output memory-type overrides; unlisted outputs use [`MemType::Default`].
    #[serde(default)]
    pub output_mem_types: HashMap<usize, MemType>,
    /// Outputs are owned by the embedding caller and must never be reused.
    #[serde(default)]
    pub has_external_outputs: bool,
    /// Inputs must be laid out contiguously in one allocation.
    #[serde(default)]
    pub allocate_inputs_contiguously: bool,
}

impl KernelDef {
    /// A kernel with no special contracts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mandatory alias pair.
    pub fn with_alias(mut self, input: usize, output: usize) -> Self {
        self.alias.push((input, output));
        self
    }

    /// Sets the variadic alias offsets.
    pub fn with_variadic_alias(mut self, input_offset: usize, output_offset: usize) -> Self {
        self.variadic_alias = Some((input_offset, output_offset));
        self
    }

    /// Adds an optional in-place pair.
    pub fn with_may_inplace(mut self, input: usize, output: usize) -> Self {
        self.may_inplace.push((input, output));
        self
    }

    /// Marks an input position as accepting strided tensors.
    pub fn with_may_strided_input(mut self, input: usize) -> Self {
        self.may_strided_input.push(input);
        self
    }

    /// Adds a strided-view output candidate.
    pub fn with_may_strided_output(mut self, input: usize, output: usize) -> Self {
        self.may_strided_output.push((input, output));
        self
    }

    /// Overrides the memory type of one input.
    pub fn with_input_mem_type(mut self, input: usize, mem_type: MemType) -> Self {
        self.input_mem_types.insert(input, mem_type);
        self
    }

    /// Overrides the memory type of one output.
    pub fn with_output_mem_type(mut self, output: usize, mem_type: MemType) -> Self {
        self.output_mem_types.insert(output, mem_type);
        self
    }

    /// Marks outputs as externally owned.
    pub fn with_external_outputs(mut self) -> Self {
        self.has_external_outputs = true;
        self
    }

    /// Requires contiguous input allocation.
    pub fn with_contiguous_inputs(mut self) -> Self {
        self.allocate_inputs_contiguously = true;
        self
    }

    /// Memory type of input `i`.
    pub fn input_memory_type(&self, i: usize) -> MemType {
        self.input_mem_types.get(&i).copied().unwrap_or_default()
    }

    /// Memory type of output `i`.
    pub fn output_memory_type(&self, i: usize) -> MemType {
        self.output_mem_types.get(&i).copied().unwrap_or_default()
    }

    /// Returns `true` if input `i` accepts strided tensors.
    pub fn accepts_strided_input(&self, i: usize) -> bool {
        self.may_strided_input.contains(&i)
    }
}

/// Kernel metadata per node of one graph level.
pub type KernelInfoMap = HashMap<NodeIndex, Arc<KernelDef>>;

/// Kernel metadata maps for nested subgraphs, keyed by
/// [`compose_nested_key`].
pub type SubgraphKernelInfoMaps = HashMap<String, KernelInfoMap>;

/// Composes the unique key identifying a nested subgraph relative to a
/// graph level: base key + graph depth + parent node index + attribute
/// name carrying the subgraph.
pub fn compose_nested_key(
    base: &str,
    graph_depth: usize,
    node_index: NodeIndex,
    attr_name: &str,
) -> String {
    format!("{base}{graph_depth}{node_index}{attr_name}")
}
