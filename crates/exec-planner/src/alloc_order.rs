// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Allocation ordering for contiguous-input kernels.
//!
//! Kernels that fuse their inputs into one device launch need those
//! buffers laid out back to back, so the runtime must allocate them in a
//! stable order. The pass records that order separately for initializers
//! and activations; a kernel mixing the two classes cannot be laid out
//! contiguously and is rejected.

use crate::{AllocKind, PlanError, PlannerImpl};
use graph_ir::arg_exists;

impl PlannerImpl<'_> {
    /// Records allocation orders for every contiguous-input kernel.
    pub(crate) fn compute_allocation_order(&mut self) -> Result<(), PlanError> {
        let graph = self.graph;
        let stream_nodes = self.stream_nodes.clone();

        for stream in &stream_nodes {
            for &node_index in stream {
                let node = graph.node(node_index)?;
                if !self.kernel(node_index)?.allocate_inputs_contiguously {
                    continue;
                }

                let mut expect_initializers: Option<bool> = None;
                for name in &node.inputs {
                    if !arg_exists(name) {
                        continue;
                    }
                    let current = self.index(name)?;
                    let entry = &self.plan.allocation_plan[current];
                    let actual = match (entry.alloc_kind, entry.reused_buffer) {
                        (AllocKind::Reuse, Some(root)) => root,
                        _ => current,
                    };
                    let is_initializer = self.plan.allocation_plan[actual].alloc_kind
                        == AllocKind::AllocateStatically;

                    match expect_initializers {
                        None => expect_initializers = Some(is_initializer),
                        Some(expected) if expected != is_initializer => {
                            return Err(PlanError::InvalidInput(format!(
                                "node '{}' requires contiguous inputs, which must be all initializers or all activations",
                                node.name,
                            )));
                        }
                        Some(_) => {}
                    }

                    let order = if is_initializer {
                        &mut self.plan.initializer_allocation_order
                    } else {
                        &mut self.plan.activation_allocation_order
                    };
                    if !order.contains(&actual) {
                        order.push(actual);
                    }
                }
            }
        }
        Ok(())
    }
}
