// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Planner state and orchestration.
//!
//! [`SequentialPlanner::create_plan`] is the only public entry point. A
//! [`PlannerImpl`] is constructed per graph, mutated only by the planning
//! passes (location → execution plan → reuse → deallocation), and consumed
//! when the finished [`SequentialExecutionPlan`] is returned. No state
//! outlives planning.

use crate::{
    AllocKind, PlanError, PlannerContext, SequentialExecutionPlan, ValueAllocPlan,
};
use device_registry::{ExecutionProvider, MemoryLocation, ProviderRegistry, StreamCommandHandleRegistry};
use graph_ir::{
    Graph, KernelDef, KernelInfoMap, Node, NodeIndex, SubgraphKernelInfoMaps, ValueDef,
    ValueIndex, ValueTable,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// Everything the planner consumes, all read-only.
pub struct PlannerInputs<'a> {
    /// The node whose subgraph is being planned; `None` for the top graph.
    pub parent_node: Option<&'a Node>,
    /// The graph to plan.
    pub graph: &'a Graph,
    /// Outer-scope values visible to this graph level.
    pub outer_scope_args: &'a [ValueDef],
    /// Provider table.
    pub providers: &'a ProviderRegistry,
    /// Kernel metadata for this graph level, keyed by node index.
    pub kernel_info: &'a KernelInfoMap,
    /// Kernel metadata for nested subgraphs, keyed by
    /// [`graph_ir::compose_nested_key`].
    pub subgraph_kernel_info: &'a SubgraphKernelInfoMaps,
    /// Locations already resolved for outer-scope values.
    pub outer_scope_locations: &'a HashMap<String, MemoryLocation>,
    /// Value-name → dense-index table covering this graph level.
    pub value_table: &'a ValueTable,
    /// Cross-provider wait handles.
    pub handle_registry: &'a StreamCommandHandleRegistry,
    /// Partition configuration file; `None` selects the default partition
    /// without persistence.
    pub partition_config: Option<&'a Path>,
}

/// The planner entry point.
pub struct SequentialPlanner;

impl SequentialPlanner {
    /// Produces the execution plan for one graph level.
    ///
    /// All errors are fatal; no partial plan is returned. The error is
    /// wrapped with the graph name at this boundary only.
    pub fn create_plan(
        inputs: PlannerInputs<'_>,
        context: &dyn PlannerContext,
    ) -> Result<SequentialExecutionPlan, PlanError> {
        let graph_name = inputs.graph.name.clone();
        Self::create_plan_inner(inputs, context).map_err(PlanError::in_graph(&graph_name))
    }

    fn create_plan_inner(
        inputs: PlannerInputs<'_>,
        context: &dyn PlannerContext,
    ) -> Result<SequentialExecutionPlan, PlanError> {
        let graph = inputs.graph;

        // Partition first: a malformed configuration aborts planning
        // before any plan state exists.
        let mut partitioner = stream_partitioner::create_partitioner(inputs.partition_config)?;
        let partition = partitioner.partition(graph)?;
        tracing::debug!(
            "partitioned '{}' into {} logical stream(s)",
            graph.name,
            partition.num_streams(),
        );

        let mut planner = PlannerImpl::new(inputs, context, partition);
        planner.compute_value_location()?;
        planner.compute_plan_for_inputs_and_weights()?;
        planner.build_execution_plan()?;
        planner.compute_reuse_plan()?;
        planner.compute_allocation_order()?;
        planner.generate_deallocation_plan()?;
        planner.plan.verify_allocation_lifetimes()?;

        tracing::info!(
            "planned '{}': {} values, {} streams, {} notifications, {} barriers",
            graph.name,
            planner.plan.allocation_plan.len(),
            planner.plan.num_streams(),
            planner.plan.num_notifications(),
            planner.plan.num_barriers,
        );
        Ok(planner.plan)
    }
}

/// Per-value bookkeeping used only while planning.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValueInfo {
    /// The value's definition site; `None` until registered.
    pub(crate) def_site: Option<ValueDef>,
    /// Static reference count.
    pub(crate) use_count: i64,
    /// Root buffer this value ultimately writes into; self when no reuse.
    pub(crate) reused_buffer: Option<ValueIndex>,
}

/// A buffer currently free for reuse.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeBufferInfo {
    pub(crate) value: ValueIndex,
    /// Program counter after which the buffer became free.
    #[allow(dead_code)]
    pub(crate) deallocate_point: usize,
}

pub(crate) struct PlannerImpl<'a> {
    pub(crate) context: &'a dyn PlannerContext,
    pub(crate) parent_node: Option<&'a Node>,
    pub(crate) graph: &'a Graph,
    pub(crate) outer_scope_args: &'a [ValueDef],
    pub(crate) providers: &'a ProviderRegistry,
    pub(crate) kernel_info: &'a KernelInfoMap,
    pub(crate) subgraph_kernel_info: &'a SubgraphKernelInfoMaps,
    pub(crate) outer_scope_locations: &'a HashMap<String, MemoryLocation>,
    pub(crate) table: &'a ValueTable,
    pub(crate) handle_registry: &'a StreamCommandHandleRegistry,

    pub(crate) plan: SequentialExecutionPlan,

    /// Node indices per logical stream, in topological order.
    pub(crate) stream_nodes: Vec<Vec<NodeIndex>>,
    /// Node index → logical stream.
    pub(crate) node_stream_map: Vec<usize>,
    /// Combined dependence graph: node → immediate upstream nodes, from
    /// model edges plus intra-stream order.
    pub(crate) dependence_graph: HashMap<NodeIndex, HashSet<NodeIndex>>,
    /// Value → nodes consuming it (explicitly or implicitly).
    pub(crate) value_consumer_map: HashMap<ValueIndex, HashSet<NodeIndex>>,
    /// Node-produced value → producing node.
    pub(crate) value_node_map: HashMap<ValueIndex, NodeIndex>,
    /// Per-value planning info, indexed by dense value index.
    pub(crate) values: Vec<ValueInfo>,
    /// Dead buffers available for reuse, most recently freed first.
    pub(crate) freelist: VecDeque<FreeBufferInfo>,
}

impl<'a> PlannerImpl<'a> {
    fn new(
        inputs: PlannerInputs<'a>,
        context: &'a dyn PlannerContext,
        partition: stream_partitioner::StreamPartition,
    ) -> Self {
        let num_values = inputs.value_table.len();
        let node_stream_map = partition.node_stream_map(inputs.graph.num_nodes());

        let mut plan = SequentialExecutionPlan::default();
        plan.allocation_plan = vec![ValueAllocPlan::default(); num_values];

        Self {
            context,
            parent_node: inputs.parent_node,
            graph: inputs.graph,
            outer_scope_args: inputs.outer_scope_args,
            providers: inputs.providers,
            kernel_info: inputs.kernel_info,
            subgraph_kernel_info: inputs.subgraph_kernel_info,
            outer_scope_locations: inputs.outer_scope_locations,
            table: inputs.value_table,
            handle_registry: inputs.handle_registry,
            plan,
            stream_nodes: partition.streams,
            node_stream_map,
            dependence_graph: HashMap::new(),
            value_consumer_map: HashMap::new(),
            value_node_map: HashMap::new(),
            values: vec![ValueInfo::default(); num_values],
            freelist: VecDeque::new(),
        }
    }

    // ── Value bookkeeping ──────────────────────────────────────────

    /// Resolves a value name to its dense index.
    pub(crate) fn index(&self, name: &str) -> Result<ValueIndex, PlanError> {
        self.table.index(name).map_err(|_| {
            PlanError::InternalInconsistency(format!("value '{name}' has no dense index"))
        })
    }

    /// Registers a value at its definition site.
    ///
    /// Each value is defined exactly once; re-registration means the graph
    /// violated static single assignment.
    pub(crate) fn process_def(
        &mut self,
        index: ValueIndex,
        def_site: &ValueDef,
    ) -> Result<(), PlanError> {
        let info = &mut self.values[index];
        if info.def_site.is_some() {
            return Err(PlanError::InternalInconsistency(format!(
                "value '{}' registered twice",
                def_site.name,
            )));
        }
        info.def_site = Some(def_site.clone());
        info.use_count = 0;
        info.reused_buffer = Some(index);
        Ok(())
    }

    /// The definition site of a registered value.
    pub(crate) fn def_of(&self, index: ValueIndex) -> Option<&ValueDef> {
        self.values[index].def_site.as_ref()
    }

    pub(crate) fn use_count(&self, index: ValueIndex) -> i64 {
        self.values[index].use_count
    }

    pub(crate) fn bump_use_count(&mut self, index: ValueIndex, by: i64) {
        self.values[index].use_count += by;
    }

    /// Decrements a value's use count, returning the remaining count.
    pub(crate) fn decrement_use_count(&mut self, index: ValueIndex) -> Result<i64, PlanError> {
        let info = &mut self.values[index];
        if info.use_count == 0 {
            return Err(PlanError::InternalInconsistency(format!(
                "use count underflow for value {index}",
            )));
        }
        info.use_count -= 1;
        Ok(info.use_count)
    }

    /// The root buffer a value writes into, or `None` if the value was
    /// never registered (values dropped by provider-side rewrites).
    pub(crate) fn buffer(&self, index: ValueIndex) -> Option<ValueIndex> {
        self.values[index].reused_buffer
    }

    /// Records that `reused_for` shares the root buffer underlying
    /// `reused`, transferring the use count to the root.
    pub(crate) fn reuse(
        &mut self,
        reused: ValueIndex,
        reused_for: ValueIndex,
        alloc_kind: AllocKind,
    ) -> Result<(), PlanError> {
        if reused == reused_for {
            return Err(PlanError::InternalInconsistency(format!(
                "value {reused} cannot reuse itself",
            )));
        }
        let original = self.buffer(reused).ok_or_else(|| {
            PlanError::InternalInconsistency(format!("value {reused} has no registered buffer"))
        })?;
        self.values[reused_for].reused_buffer = Some(original);
        let transferred = self.use_count(reused_for);
        self.bump_use_count(original, transferred);

        let entry = &mut self.plan.allocation_plan[reused_for];
        entry.alloc_kind = alloc_kind;
        entry.reused_buffer = Some(original);
        Ok(())
    }

    // ── Graph-side lookups ─────────────────────────────────────────

    /// Kernel metadata for a node; missing metadata is a caller error.
    pub(crate) fn kernel(&self, node_index: NodeIndex) -> Result<&Arc<KernelDef>, PlanError> {
        self.kernel_info.get(&node_index).ok_or_else(|| {
            PlanError::InvalidInput(format!(
                "no kernel create info saved for node {node_index}",
            ))
        })
    }

    /// The provider a node was bound to.
    pub(crate) fn provider_of(&self, node: &Node) -> Result<&Arc<ExecutionProvider>, PlanError> {
        self.providers.get(&node.provider).ok_or_else(|| {
            PlanError::InvalidInput(format!(
                "execution provider '{}' (node '{}') is not registered",
                node.provider, node.name,
            ))
        })
    }

    pub(crate) fn has_external_outputs(&self, node_index: NodeIndex) -> Result<bool, PlanError> {
        Ok(self.kernel(node_index)?.has_external_outputs)
    }

    /// The definition the planner should consult for a name: this graph's
    /// def, or the outer-scope def for free names.
    pub(crate) fn lookup_def(&self, name: &str) -> Option<&ValueDef> {
        self.outer_scope_args
            .iter()
            .find(|d| d.name == name)
            .or_else(|| self.graph.value_def(name))
    }

    // ── Size checks ────────────────────────────────────────────────

    /// Byte size of a value under the context's shape oracle: `None` for
    /// strings, non-tensors, unknown shapes, or symbolic dimensions.
    pub(crate) fn byte_size(
        &self,
        ctx: &dyn PlannerContext,
        def: &ValueDef,
    ) -> Option<u64> {
        if def.is_non_tensor() || def.is_string() {
            return None;
        }
        let width = def.ty?.elem.byte_width()? as u64;
        let elements = ctx.shape(def)?.num_elements()?;
        elements.checked_mul(width)
    }

    /// Two values may share a buffer size-wise: both byte sizes known and
    /// equal. String tensors never match.
    pub(crate) fn same_size(
        &self,
        ctx: &dyn PlannerContext,
        a: &ValueDef,
        b: &ValueDef,
    ) -> bool {
        match (self.byte_size(ctx, a), self.byte_size(ctx, b)) {
            (Some(sa), Some(sb)) => sa == sb,
            _ => false,
        }
    }

    // ── Stream queries ─────────────────────────────────────────────

    /// Returns `true` when no provider type owns more than one non-empty
    /// stream, i.e. the single-stream reuse result is already safe.
    pub(crate) fn is_single_stream(&self) -> bool {
        let mut seen = HashSet::new();
        for (i, nodes) in self.stream_nodes.iter().enumerate() {
            if nodes.is_empty() {
                continue;
            }
            let provider = self.plan.execution_plan[i].provider.as_deref();
            if !seen.insert(provider) {
                return false;
            }
        }
        true
    }
}
