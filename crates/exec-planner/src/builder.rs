// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution-plan building: per-stream command lists and cross-stream
//! synchronization.
//!
//! One notification per node with at least one cross-stream consumer; one
//! barrier per cross-stream edge on the consumer's stream, followed by a
//! device-level wait when the provider pair has a registered handle. Every
//! barrier starts at count 2: the producer's trigger and the consumer
//! stream's arrival each decrement it, and the consumer proceeds at zero.

use crate::{ExecutionStep, LogicStream, PlanError, PlannerImpl};
use graph_ir::{arg_exists, NodeIndex};
use std::collections::HashMap;

impl PlannerImpl<'_> {
    /// Builds the per-stream step lists, the notification tables, and the
    /// combined dependence graph.
    pub(crate) fn build_execution_plan(&mut self) -> Result<(), PlanError> {
        let graph = self.graph;
        let num_streams = self.stream_nodes.len();
        let stream_nodes = self.stream_nodes.clone();

        // Bind each stream to its provider; mixed-provider streams mean
        // the partition disagrees with the graph's bindings.
        let mut stream_providers: Vec<Option<String>> = vec![None; num_streams];
        for (i, nodes) in stream_nodes.iter().enumerate() {
            for &node_index in nodes {
                let node = graph.node(node_index)?;
                self.provider_of(node)?;
                match &stream_providers[i] {
                    None => stream_providers[i] = Some(node.provider.clone()),
                    Some(bound) if *bound == node.provider => {}
                    Some(bound) => {
                        return Err(PlanError::InvalidInput(format!(
                            "stream {i} mixes providers '{bound}' and '{}'",
                            node.provider,
                        )));
                    }
                }
            }
        }

        // A node gets a notification iff some consumer lives on another
        // stream.
        let mut node_to_notification: HashMap<NodeIndex, usize> = HashMap::new();
        let mut num_notifications = 0usize;
        for (i, nodes) in stream_nodes.iter().enumerate() {
            for &node_index in nodes {
                if graph
                    .successors(node_index)
                    .iter()
                    .any(|&succ| self.node_stream_map[succ] != i)
                {
                    node_to_notification.insert(node_index, num_notifications);
                    num_notifications += 1;
                }
            }
        }

        // Notification ownership: the stream of the producing node.
        self.plan.notification_owners = vec![0; num_notifications];
        for node in graph.nodes_in_topological_order() {
            if let Some(&notification) = node_to_notification.get(&node.index) {
                self.plan.notification_owners[notification] = self.node_stream_map[node.index];
            }
        }

        // Emit the command list of each stream.
        let mut streams: Vec<LogicStream> = Vec::with_capacity(num_streams);
        for (i, nodes) in stream_nodes.iter().enumerate() {
            let mut steps: Vec<ExecutionStep> = Vec::new();
            for (j, &node_index) in nodes.iter().enumerate() {
                if j > 0 {
                    // Intra-stream order is a dependence edge too.
                    self.dependence_graph
                        .entry(node_index)
                        .or_default()
                        .insert(nodes[j - 1]);
                }

                let node = graph.node(node_index)?;
                for &producer in graph.predecessors(node_index) {
                    if self.node_stream_map[producer] == i {
                        continue;
                    }
                    let &notification =
                        node_to_notification.get(&producer).ok_or_else(|| {
                            PlanError::InternalInconsistency(format!(
                                "cross-stream producer {producer} has no notification",
                            ))
                        })?;

                    let barrier_id = self.plan.num_barriers;
                    self.plan.num_barriers += 1;
                    self.plan
                        .downstream_map
                        .entry(notification)
                        .or_default()
                        .push((i, steps.len()));
                    steps.push(ExecutionStep::Barrier { barrier_id });

                    // Device-level wait only where the provider pair
                    // registered one; same-device consumers rely on the
                    // barrier alone.
                    let owner_stream = self.plan.notification_owners[notification];
                    let producer_provider = stream_providers[owner_stream]
                        .as_deref()
                        .unwrap_or_default();
                    if let Some(handle) = self
                        .handle_registry
                        .wait_handle(producer_provider, &node.provider)
                    {
                        steps.push(ExecutionStep::WaitOnDevice {
                            handle,
                            notification,
                        });
                    }
                }

                for &consumer in graph.successors(node_index) {
                    self.dependence_graph
                        .entry(consumer)
                        .or_default()
                        .insert(node_index);
                }

                steps.push(ExecutionStep::LaunchKernel { node: node_index });

                if let Some(&notification) = node_to_notification.get(&node_index) {
                    steps.push(ExecutionStep::ActivateNotification { notification });
                    steps.push(ExecutionStep::TriggerDownstream { notification });
                }
            }
            streams.push(LogicStream {
                provider: stream_providers[i].clone(),
                steps,
            });
        }
        self.plan.execution_plan = streams;

        // Producer-side maps used by reuse refinement and deallocation.
        for node in graph.nodes_in_topological_order() {
            for name in &node.outputs {
                if !arg_exists(name) {
                    continue;
                }
                let index = self.index(name)?;
                self.plan
                    .value_to_stream_map
                    .insert(index, self.node_stream_map[node.index]);
                self.value_node_map.insert(index, node.index);
            }
            for name in node.inputs.iter().chain(node.implicit_inputs.iter()) {
                if !arg_exists(name) {
                    continue;
                }
                let index = self.index(name)?;
                self.value_consumer_map
                    .entry(index)
                    .or_default()
                    .insert(node.index);
            }
        }

        Ok(())
    }
}
