// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Location resolution: the memory space of every value.
//!
//! Node outputs land on the allocator their kernel and provider select.
//! Graph inputs and outer-scope values take the location of their first
//! explicit consumer (the copy-insertion pass already guarantees all
//! explicit consumers agree). Values consumed only implicitly inherit the
//! outer-scope location inside subgraphs; in the top graph the first
//! consuming provider sets the location, and a second distinct provider
//! degrades it to host memory for good. Initializers take the location of
//! their first use across this graph and all nested subgraphs.

use crate::{AllocKind, PlanError, PlannerImpl};
use device_registry::{MemType, MemoryLocation};
use graph_ir::{arg_exists, compose_nested_key, Graph, KernelInfoMap, Node, ValueIndex};
use std::collections::{HashMap, HashSet};

impl<'a> PlannerImpl<'a> {
    /// Registers every value and resolves the location of graph inputs,
    /// outer-scope args, implicit inputs, and node outputs.
    pub(crate) fn compute_value_location(&mut self) -> Result<(), PlanError> {
        let graph = self.graph;
        let outer_scope_args = self.outer_scope_args;

        let graph_inputs: HashSet<&str> = graph
            .inputs_including_initializers()
            .map(String::as_str)
            .collect();

        for name in graph.inputs() {
            let index = self.index(name)?;
            let def = graph.value_def(name).ok_or_else(|| {
                PlanError::InternalInconsistency(format!("input '{name}' has no definition"))
            })?;
            self.process_def(index, def)?;
        }
        for def in outer_scope_args {
            let index = self.index(&def.name)?;
            self.process_def(index, def)?;
        }
        for name in graph.initializers() {
            let index = self.index(name)?;
            let def = graph.value_def(name).ok_or_else(|| {
                PlanError::InternalInconsistency(format!("initializer '{name}' has no definition"))
            })?;
            self.process_def(index, def)?;
        }

        let is_subgraph = self.parent_node.is_some();
        let mut has_explicit_consumer: HashSet<ValueIndex> = HashSet::new();
        let mut implicit_consumer_provider: HashMap<ValueIndex, String> = HashMap::new();
        let mut heterogeneous: HashSet<ValueIndex> = HashSet::new();

        let stream_nodes = self.stream_nodes.clone();
        for stream in &stream_nodes {
            for &node_index in stream {
                let node = graph.node(node_index)?;
                let kernel = self.kernel(node_index)?.clone();
                let provider = self.provider_of(node)?.clone();

                for (is_implicit, args) in
                    [(false, &node.inputs), (true, &node.implicit_inputs)]
                {
                    for (arg_idx, name) in args.iter().enumerate() {
                        if !arg_exists(name) {
                            continue;
                        }
                        let is_graph_input = graph_inputs.contains(name.as_str());
                        let is_outer_scope = outer_scope_args.iter().any(|d| &d.name == name);
                        if !is_graph_input && !is_outer_scope {
                            continue;
                        }
                        let index = self.index(name)?;

                        if !is_implicit {
                            let mem_type = kernel.input_memory_type(arg_idx);
                            let location = provider.allocator_location(mem_type);
                            self.plan.set_location(index, location)?;
                            has_explicit_consumer.insert(index);
                        } else if !has_explicit_consumer.contains(&index) {
                            if is_subgraph {
                                // Pass-through subgraph input: inherit the
                                // outer-scope location and defer any copy
                                // decision to an explicit consumer in a
                                // nested subgraph.
                                match self.outer_scope_locations.get(name) {
                                    Some(&location) => {
                                        self.plan.set_location(index, location)?;
                                    }
                                    None if !is_graph_input => {
                                        return Err(PlanError::InternalInconsistency(format!(
                                            "no outer-scope location recorded for implicit input '{name}'",
                                        )));
                                    }
                                    None => {}
                                }
                            } else if !heterogeneous.contains(&index) {
                                // Top graph: first provider wins; a second
                                // distinct provider pins the value to host
                                // memory permanently.
                                match implicit_consumer_provider.get(&index) {
                                    None => {
                                        self.plan
                                            .set_location(index, provider.default_location())?;
                                        implicit_consumer_provider
                                            .insert(index, provider.name.clone());
                                    }
                                    Some(seen) if *seen == provider.name => {
                                        self.plan
                                            .set_location(index, provider.default_location())?;
                                    }
                                    Some(_) => {
                                        let cpu = self.providers.cpu()?.default_location();
                                        self.plan.set_location(index, cpu)?;
                                        heterogeneous.insert(index);
                                        tracing::debug!(
                                            "implicit input '{name}' has heterogeneous consumers, pinned to host memory",
                                        );
                                    }
                                }
                            }
                        }
                    }
                }

                for (arg_idx, name) in node.outputs.iter().enumerate() {
                    if !arg_exists(name) {
                        continue;
                    }
                    let index = self.index(name)?;
                    let def = graph.value_def(name).ok_or_else(|| {
                        PlanError::InternalInconsistency(format!(
                            "output '{name}' has no definition",
                        ))
                    })?;
                    self.process_def(index, def)?;
                    let location =
                        provider.allocator_location(kernel.output_memory_type(arg_idx));
                    self.plan.set_location(index, location)?;
                }
            }
        }
        Ok(())
    }

    /// Marks graph inputs and outer-scope values caller-owned, then plans
    /// initializer locations.
    pub(crate) fn compute_plan_for_inputs_and_weights(&mut self) -> Result<(), PlanError> {
        let graph = self.graph;
        let outer_scope_args = self.outer_scope_args;

        // Graph inputs are owned by the caller of the run; outer-scope
        // values are owned by the enclosing graph. Neither is ever reused.
        for name in graph.inputs() {
            self.setup_preexisting(name)?;
        }
        for def in outer_scope_args {
            self.setup_preexisting(&def.name)?;
        }

        self.generate_plan_for_weights()
    }

    fn setup_preexisting(&mut self, name: &str) -> Result<(), PlanError> {
        let index = self.index(name)?;
        let value_type = self.lookup_def(name).and_then(|d| d.ty);
        let entry = &mut self.plan.allocation_plan[index];
        entry.alloc_kind = AllocKind::PreExisting;
        entry.value_type = value_type;
        Ok(())
    }

    /// Plans every initializer: statically allocated at the location of
    /// its first consumption across this graph and all nested subgraphs.
    fn generate_plan_for_weights(&mut self) -> Result<(), PlanError> {
        // Only the first recorded location matters: within one graph level
        // the copy-insertion pass duplicates initializers consumed on
        // multiple devices, and across levels the input-copy machinery
        // moves them before subgraph execution.
        let weights: HashSet<&str> = self
            .graph
            .initializers()
            .iter()
            .map(String::as_str)
            .collect();
        let mut locations: Vec<Vec<MemoryLocation>> =
            vec![Vec::new(); self.plan.allocation_plan.len()];

        self.weights_locations_helper(
            self.graph,
            None,
            &weights,
            self.kernel_info,
            "",
            0,
            &mut locations,
        )?;

        for (index, locs) in locations.iter().enumerate() {
            let Some(&first) = locs.first() else { continue };
            let value_type = self
                .table
                .name(index)
                .and_then(|n| self.lookup_def(n))
                .and_then(|d| d.ty);
            let entry = &mut self.plan.allocation_plan[index];
            entry.alloc_kind = AllocKind::AllocateStatically;
            entry.location = Some(first);
            if entry.value_type.is_none() {
                entry.value_type = value_type;
            }
        }
        Ok(())
    }

    /// Depth-first traversal recording, per initializer, the location of
    /// each consumption site in encounter order.
    #[allow(clippy::too_many_arguments)]
    fn weights_locations_helper(
        &self,
        graph: &Graph,
        parent_node: Option<&Node>,
        weights: &HashSet<&str>,
        kernel_info: &KernelInfoMap,
        key_base: &str,
        graph_depth: usize,
        locations: &mut Vec<Vec<MemoryLocation>>,
    ) -> Result<(), PlanError> {
        for node in graph.nodes_in_topological_order() {
            for (arg_idx, name) in node.inputs.iter().enumerate() {
                if !arg_exists(name) || !weights.contains(name.as_str()) {
                    continue;
                }
                // A name matching a top-level initializer inside a
                // subgraph is only that initializer when it flows in as an
                // implicit input; otherwise it is a shadowing local value.
                if graph_depth > 0 {
                    let shadowed = parent_node
                        .map(|p| !p.implicit_inputs.iter().any(|i| i == name))
                        .unwrap_or(true);
                    if shadowed {
                        continue;
                    }
                }
                let index = self.index(name)?;
                locations[index]
                    .push(self.location_for_node_input(arg_idx, node, kernel_info)?);
            }
        }

        for node in graph.nodes_in_topological_order() {
            if !node.contains_subgraph() {
                continue;
            }
            for (attr, subgraph) in &node.subgraphs {
                let key = compose_nested_key(key_base, graph_depth, node.index, attr);
                let subgraph_kernels = self.subgraph_kernel_info.get(&key).ok_or_else(|| {
                    PlanError::InvalidInput(format!(
                        "no kernel create info map saved for subgraph key '{key}'",
                    ))
                })?;
                self.weights_locations_helper(
                    subgraph,
                    Some(node),
                    weights,
                    subgraph_kernels,
                    &key,
                    graph_depth + 1,
                    locations,
                )?;
            }
        }
        Ok(())
    }

    /// The location a node wants one of its inputs in: host memory when
    /// the kernel pins the argument there, the provider's default
    /// allocator otherwise.
    fn location_for_node_input(
        &self,
        arg_idx: usize,
        node: &Node,
        kernel_info: &KernelInfoMap,
    ) -> Result<MemoryLocation, PlanError> {
        let provider = self.provider_of(node)?;
        let kernel = kernel_info.get(&node.index).ok_or_else(|| {
            PlanError::InvalidInput(format!(
                "no kernel create info saved for node {}",
                node.index,
            ))
        })?;
        if kernel.input_memory_type(arg_idx) != MemType::Default {
            // Initializers are not produced by any node, so host memory is
            // always a valid home for a host-pinned weight argument.
            return Ok(self.providers.cpu()?.default_location());
        }
        Ok(provider.default_location())
    }
}
