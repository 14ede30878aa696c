// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Deallocation-plan emission.
//!
//! Converts end-of-life knowledge into release actions. Each stream is
//! scanned in reverse so the first consumer recorded per stream is that
//! stream's last consumer. When all consumers of a buffer share a stream
//! the release is attached to that single last consumer with a count of
//! one; otherwise the action carries the full consumer count and every
//! consumer decrements it, the executor freeing at zero.

use crate::{AllocKind, PlanError, PlannerImpl, ReleaseAction};
use graph_ir::{arg_exists, NodeIndex};

impl PlannerImpl<'_> {
    /// Emits `release_actions` and the per-node release lists.
    pub(crate) fn generate_deallocation_plan(&mut self) -> Result<(), PlanError> {
        let graph = self.graph;

        // Consumers per root buffer, one entry per consuming occurrence,
        // each stream scanned back to front.
        let mut value_consumers: Vec<Vec<NodeIndex>> =
            vec![Vec::new(); self.plan.allocation_plan.len()];
        for stream in &self.stream_nodes {
            for &node_index in stream.iter().rev() {
                let node = graph.node(node_index)?;
                for name in node.inputs.iter().chain(node.implicit_inputs.iter()) {
                    if !arg_exists(name) {
                        continue;
                    }
                    let index = self.index(name)?;
                    let origin = self.plan.root_of(index)?;
                    if self.plan.allocation_plan[origin].alloc_kind == AllocKind::Allocate {
                        value_consumers[origin].push(node_index);
                    }
                }
            }
        }

        self.plan.node_release_list = vec![Vec::new(); graph.num_nodes()];
        for (value_index, consumers) in value_consumers.iter().enumerate() {
            if consumers.is_empty() {
                continue;
            }
            self.plan.release_actions.push(ReleaseAction {
                value_index,
                ref_count: 0,
            });
            let action_idx = self.plan.release_actions.len() - 1;

            let first_stream = self.node_stream_map[consumers[0]];
            let single_stream = consumers
                .iter()
                .all(|&c| self.node_stream_map[c] == first_stream);

            if single_stream {
                // The reverse scan makes consumers[0] the stream's last
                // consumer, so the release point is statically known.
                self.attach_release(action_idx, consumers[0]);
            } else {
                // The last consumer across streams is decided at run time;
                // every consumer decrements the shared count.
                for &consumer in consumers {
                    self.attach_release(action_idx, consumer);
                }
            }
        }
        Ok(())
    }

    fn attach_release(&mut self, action_idx: usize, node_index: NodeIndex) {
        self.plan.release_actions[action_idx].ref_count += 1;
        self.plan.node_release_list[node_index].push(action_idx);
    }
}
