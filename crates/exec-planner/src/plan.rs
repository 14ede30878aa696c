// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The planner's output: per-stream command lists plus the allocation and
//! deallocation plans.
//!
//! Steps are plain data here; the executor gives each kind its runtime
//! behavior (see the step-machine contract in `stream-executor`).

use crate::{AllocKind, PlanError, ValueAllocPlan};
use device_registry::{MemoryLocation, WaitFn};
use graph_ir::{NodeIndex, ValueIndex, ValueTable};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a one-shot cross-stream notification.
pub type NotificationIndex = usize;

/// Identifier of a barrier counter.
pub type BarrierIndex = usize;

/// One command in a logical stream.
#[derive(Clone)]
pub enum ExecutionStep {
    /// Decrement the barrier counter; the stream suspends until it hits
    /// zero. Every barrier starts at count 2.
    Barrier { barrier_id: BarrierIndex },
    /// Device-level wait on a notification through the provider pair's
    /// registered handle; advances the stream's logical clock.
    WaitOnDevice {
        handle: WaitFn,
        notification: NotificationIndex,
    },
    /// Execute the kernel bound to a node.
    LaunchKernel { node: NodeIndex },
    /// Mark a notification ready, stamping the producer's clock.
    ActivateNotification { notification: NotificationIndex },
    /// Schedule every barrier registered under the notification onto its
    /// stream's task queue.
    TriggerDownstream { notification: NotificationIndex },
}

impl ExecutionStep {
    /// One-line debug rendering of the step.
    pub fn dump(&self) -> String {
        match self {
            ExecutionStep::Barrier { barrier_id } => {
                format!("Barrier id:{barrier_id} count:2")
            }
            ExecutionStep::WaitOnDevice { notification, .. } => {
                format!("WaitOnDevice notification:{notification}")
            }
            ExecutionStep::LaunchKernel { node } => format!("LaunchKernel node:{node}"),
            ExecutionStep::ActivateNotification { notification } => {
                format!("ActivateNotification notification:{notification}")
            }
            ExecutionStep::TriggerDownstream { notification } => {
                format!("TriggerDownstream notification:{notification}")
            }
        }
    }
}

// Wait handles are closures, so Debug goes through dump().
impl fmt::Debug for ExecutionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

/// One logical stream: a provider binding plus its ordered steps.
#[derive(Debug, Default, Clone)]
pub struct LogicStream {
    /// Provider every node of this stream is bound to; `None` for streams
    /// the partition left empty.
    pub provider: Option<String>,
    /// Steps in execution order.
    pub steps: Vec<ExecutionStep>,
}

impl LogicStream {
    /// Number of steps.
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }
}

/// A deferred buffer release with its completion count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ReleaseAction {
    /// The root value whose buffer is released.
    pub value_index: ValueIndex,
    /// Number of consumer completions required before the release fires.
    pub ref_count: usize,
}

/// The static schedule produced by the planner.
#[derive(Debug, Default)]
pub struct SequentialExecutionPlan {
    /// Allocation decision per dense value index.
    pub allocation_plan: Vec<ValueAllocPlan>,
    /// Ordered logical streams.
    pub execution_plan: Vec<LogicStream>,
    /// For each notification, the logical stream that produces it.
    pub notification_owners: Vec<usize>,
    /// Notification -> (stream index, step index) of each Barrier waiting
    /// on it.
    pub downstream_map: HashMap<NotificationIndex, Vec<(usize, usize)>>,
    /// Total number of barrier counters.
    pub num_barriers: usize,
    /// Node-produced value -> producing stream.
    pub value_to_stream_map: HashMap<ValueIndex, usize>,
    /// All deferred releases.
    pub release_actions: Vec<ReleaseAction>,
    /// Per node, the release actions to decrement after it completes.
    pub node_release_list: Vec<Vec<usize>>,
    /// Stable allocation order over initializers feeding contiguous-input
    /// kernels.
    pub initializer_allocation_order: Vec<ValueIndex>,
    /// Stable allocation order over activations feeding contiguous-input
    /// kernels.
    pub activation_allocation_order: Vec<ValueIndex>,
}

impl SequentialExecutionPlan {
    /// Number of logical streams.
    pub fn num_streams(&self) -> usize {
        self.execution_plan.len()
    }

    /// Number of notifications.
    pub fn num_notifications(&self) -> usize {
        self.notification_owners.len()
    }

    /// The allocation record for one value.
    pub fn value_plan(&self, index: ValueIndex) -> Result<&ValueAllocPlan, PlanError> {
        self.allocation_plan.get(index).ok_or_else(|| {
            PlanError::InternalInconsistency(format!(
                "value index {index} out of range ({} planned values)",
                self.allocation_plan.len(),
            ))
        })
    }

    /// Sets the resolved location of one value.
    pub(crate) fn set_location(
        &mut self,
        index: ValueIndex,
        location: MemoryLocation,
    ) -> Result<(), PlanError> {
        let plan = self.allocation_plan.get_mut(index).ok_or_else(|| {
            PlanError::InternalInconsistency(format!("value index {index} out of range"))
        })?;
        plan.location = Some(location);
        Ok(())
    }

    /// Follows `reused_buffer` links from `index` to the buffer that is
    /// actually allocated.
    ///
    /// Chains are bounded by the value count; exceeding that bound means a
    /// reuse cycle and is reported as an internal inconsistency.
    pub fn root_of(&self, index: ValueIndex) -> Result<ValueIndex, PlanError> {
        let mut current = index;
        for _ in 0..=self.allocation_plan.len() {
            let plan = self.value_plan(current)?;
            match (plan.alloc_kind, plan.reused_buffer) {
                (AllocKind::Reuse | AllocKind::Share, Some(next)) if next != current => {
                    current = next;
                }
                _ => return Ok(current),
            }
        }
        Err(PlanError::InternalInconsistency(format!(
            "cyclic reuse chain starting at value {index}",
        )))
    }

    /// Checks that every `Allocate` decision carries well-formed lifetime
    /// intervals.
    pub fn verify_allocation_lifetimes(&self) -> Result<(), PlanError> {
        for (idx, entry) in self.allocation_plan.iter().enumerate() {
            if entry.alloc_kind == AllocKind::Allocate
                && !entry.program_counter.has_valid_entries()
            {
                return Err(PlanError::InternalInconsistency(format!(
                    "value {idx} is planned as Allocate but has no valid lifetime entries",
                )));
            }
        }
        Ok(())
    }

    /// Renders the allocation plan and every stream's steps, resolving
    /// value indices back to names through the table.
    pub fn dump(&self, table: &ValueTable) -> String {
        let mut out = String::new();
        out.push_str("Allocation plan:\n");
        for (name, index) in table.iter() {
            let entry = &self.allocation_plan[index];
            out.push_str(&format!("  ({index}) {name}: {}", entry.alloc_kind));
            if let Some(reused) = entry.reused_buffer {
                if matches!(entry.alloc_kind, AllocKind::Reuse | AllocKind::Share) {
                    out.push_str(&format!(" of ({reused})"));
                }
            }
            if let Some(loc) = entry.location {
                out.push_str(&format!(" @ {loc}"));
            }
            out.push('\n');
        }
        out.push_str("Execution plan:\n");
        for (i, stream) in self.execution_plan.iter().enumerate() {
            out.push_str(&format!(
                "  stream {i} on {}:\n",
                stream.provider.as_deref().unwrap_or("<unbound>"),
            ));
            for step in &stream.steps {
                out.push_str(&format!("    {}\n", step.dump()));
            }
        }
        out
    }
}
