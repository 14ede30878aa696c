// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reference counting and buffer reuse.
//!
//! Three passes:
//!
//! 1. [`PlannerImpl::compute_reuse_count`] accumulates static use counts.
//! 2. The single-stream pass walks nodes in topological order, picks an
//!    [`AllocKind`] per output, honors kernel alias/in-place contracts,
//!    and recycles dead buffers through a LIFO free list.
//! 3. When several non-empty streams share a provider type, pass 2 runs
//!    with aliasing and free-list reuse disabled (the safe baseline), and
//!    a Kahn-order sweep over the combined dependence graph then relaxes
//!    reuse where every read of the previous occupant happens-before the
//!    reusing write on every stream.

use crate::{
    planner::FreeBufferInfo, AllocKind, ParallelOverrideContext, PlanError, PlannerContext,
    PlannerImpl,
};
use graph_ir::{arg_exists, Node, NodeIndex, ValueIndex};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// Operator that yields intermediate tensors back to the embedding caller;
/// buffers flowing into it must never be overwritten by aliasing.
const YIELD_OP: &str = "Yield";

impl PlannerImpl<'_> {
    // ── Pass 1: static use counts ──────────────────────────────────

    /// Accumulates the static use count of every value: one per occurrence
    /// as explicit input, implicit input, or named graph output, plus a
    /// caller-retention count for graph inputs, outer-scope values, and
    /// initializers. Externally owned outputs get an extra count so their
    /// buffer never reaches the free list.
    pub(crate) fn compute_reuse_count(&mut self) -> Result<(), PlanError> {
        let graph = self.graph;

        for name in graph.inputs() {
            let index = self.index(name)?;
            self.bump_use_count(index, 1);
        }
        for def in self.outer_scope_args {
            let index = self.index(&def.name)?;
            self.bump_use_count(index, 1);
        }
        for name in graph.initializers() {
            let index = self.index(name)?;
            self.bump_use_count(index, 1);
        }

        let stream_nodes = self.stream_nodes.clone();
        for stream in &stream_nodes {
            for &node_index in stream {
                let node = graph.node(node_index)?;
                for name in node.inputs.iter().chain(node.implicit_inputs.iter()) {
                    if !arg_exists(name) {
                        continue;
                    }
                    let index = self.index(name)?;
                    self.bump_use_count(index, 1);
                }

                let extra = if self.has_external_outputs(node_index)? { 2 } else { 1 };
                for name in &node.outputs {
                    if !arg_exists(name) {
                        continue;
                    }
                    let index = self.index(name)?;
                    self.bump_use_count(index, extra);
                }
            }
        }

        for name in graph.outputs() {
            let index = self.index(name)?;
            self.bump_use_count(index, 1);
        }
        Ok(())
    }

    // ── Orchestration ──────────────────────────────────────────────

    /// Computes the complete reuse plan: counts, the sequential pass, and
    /// the multi-stream refinement when the partition requires it.
    pub(crate) fn compute_reuse_plan(&mut self) -> Result<(), PlanError> {
        self.compute_reuse_count()?;

        if self.is_single_stream() {
            return self.compute_single_stream_reuse_plan(self.context);
        }

        // Multiple streams share a provider: generate a baseline with no
        // memory sharing, then relax it against the dependence graph.
        let baseline = ParallelOverrideContext::new(self.context);
        self.compute_single_stream_reuse_plan(&baseline)?;
        self.optimize_reuse_plan_for_multi_stream()
    }

    // ── Pass 2: sequential reuse ───────────────────────────────────

    /// Walks nodes in global topological order assigning each output an
    /// [`AllocKind`], then retires inputs whose counts reach zero onto the
    /// free list.
    pub(crate) fn compute_single_stream_reuse_plan(
        &mut self,
        ctx: &dyn PlannerContext,
    ) -> Result<(), PlanError> {
        let graph = self.graph;
        let graph_outputs: HashSet<&str> = graph.outputs().iter().map(String::as_str).collect();
        let parallel = ctx.is_parallel_execution_enabled();

        for (program_counter, node) in graph.nodes_in_topological_order().enumerate() {
            let node_index = node.index;
            let has_external_outputs = self.has_external_outputs(node_index)?;

            for (output_arg_idx, name) in node.outputs.iter().enumerate() {
                if !arg_exists(name) {
                    continue;
                }
                let current = self.index(name)?;
                let def = graph.value_def(name).ok_or_else(|| {
                    PlanError::InternalInconsistency(format!("output '{name}' has no definition"))
                })?;
                self.plan.allocation_plan[current].value_type = def.ty;

                if has_external_outputs {
                    if def.is_non_tensor() {
                        return Err(PlanError::InvalidInput(format!(
                            "output '{name}' is externally owned but not a tensor",
                        )));
                    }
                    self.plan.allocation_plan[current].alloc_kind =
                        AllocKind::AllocatedExternally;
                } else if graph_outputs.contains(name.as_str()) {
                    self.plan.allocation_plan[current].alloc_kind = AllocKind::AllocateOutput;
                    self.try_share_loop_state_output(node, current)?;
                } else if !parallel {
                    if let Some((reused, is_strided)) =
                        self.find_reusable_input(ctx, node, output_arg_idx)?
                    {
                        self.apply_input_reuse(current, reused, is_strided, name)?;
                        continue;
                    }
                    self.plan_fresh_or_recycled(ctx, node, name, current, program_counter)?;
                } else {
                    self.plan_fresh_or_recycled(ctx, node, name, current, program_counter)?;
                }
            }

            // Retire inputs (and unused outputs) whose counts hit zero.
            for name in node
                .inputs
                .iter()
                .chain(node.implicit_inputs.iter())
                .chain(node.outputs.iter())
            {
                if !arg_exists(name) {
                    continue;
                }
                let index = self.index(name)?;
                // Values a provider rewrite dropped were never registered;
                // they own no buffer to retire.
                let Some(original) = self.buffer(index) else { continue };
                if self.decrement_use_count(original)? == 0 {
                    self.freelist.push_front(FreeBufferInfo {
                        value: original,
                        deallocate_point: program_counter,
                    });
                    let entry = &mut self.plan.allocation_plan[original];
                    if entry.alloc_kind == AllocKind::Allocate {
                        entry.program_counter.add_end(program_counter);
                    }
                }
            }
        }
        Ok(())
    }

    /// Rules 4–6 of the decision ladder: non-tensors and plain tensors
    /// either recycle a dead buffer or allocate fresh.
    fn plan_fresh_or_recycled(
        &mut self,
        ctx: &dyn PlannerContext,
        node: &Node,
        name: &str,
        current: ValueIndex,
        program_counter: usize,
    ) -> Result<(), PlanError> {
        let def = self.graph.value_def(name).cloned().ok_or_else(|| {
            PlanError::InternalInconsistency(format!("output '{name}' has no definition"))
        })?;

        if def.is_non_tensor() {
            self.plan.allocation_plan[current].alloc_kind = AllocKind::Allocate;
            self.plan.allocation_plan[current]
                .program_counter
                .add_start(program_counter);
            return Ok(());
        }

        if !ctx.is_parallel_execution_enabled() {
            if let Some(reused) = self.find_reusable_tensor(ctx, &def, current)? {
                tracing::debug!(
                    "'{}' recycles the dead buffer of value {reused} (node '{}')",
                    name,
                    node.name,
                );
                self.reuse(reused, current, AllocKind::Reuse)?;
                let original = self.buffer(reused).expect("freelist entries are registered");
                let entry = &mut self.plan.allocation_plan[original];
                if entry.alloc_kind == AllocKind::Allocate {
                    entry.program_counter.add_start(program_counter);
                }
                return Ok(());
            }
        }

        self.plan.allocation_plan[current].alloc_kind = AllocKind::Allocate;
        self.plan.allocation_plan[current]
            .program_counter
            .add_start(program_counter);
        Ok(())
    }

    /// Applies an input-aliasing decision, enforcing the strided-tensor
    /// build gate.
    fn apply_input_reuse(
        &mut self,
        current: ValueIndex,
        reused: ValueIndex,
        is_strided: bool,
        name: &str,
    ) -> Result<(), PlanError> {
        if is_strided && !cfg!(feature = "training") {
            return Err(PlanError::Unsupported(format!(
                "output '{name}' would become a strided view, which requires the 'training' feature",
            )));
        }
        tracing::debug!("'{name}' aliases input value {reused}");
        self.reuse(reused, current, AllocKind::Reuse)?;
        if is_strided {
            self.plan.allocation_plan[current].is_strided_tensor = true;
        }
        Ok(())
    }

    /// Loop-state pass-through: an `Identity` inside a `Loop` subgraph
    /// whose input is a pre-existing outer value shares that input's
    /// storage instead of copying it on every iteration. The loop
    /// iteration number is excluded — the loop implementation mutates it
    /// in place, so the output must stay a copy.
    fn try_share_loop_state_output(
        &mut self,
        node: &Node,
        current: ValueIndex,
    ) -> Result<(), PlanError> {
        let Some(parent) = self.parent_node else { return Ok(()) };
        if parent.op_type != "Loop" || node.op_type != "Identity" {
            return Ok(());
        }
        let Some(input) = node.inputs.first().filter(|n| arg_exists(n)) else {
            return Ok(());
        };
        if self.graph.inputs().first() == Some(input) {
            return Ok(());
        }
        let input_index = self.index(input)?;
        if self.plan.allocation_plan[input_index].alloc_kind == AllocKind::PreExisting {
            tracing::debug!(
                "loop state output of '{}' shares pre-existing value '{input}'",
                node.name,
            );
            self.reuse(input_index, current, AllocKind::Share)?;
        }
        Ok(())
    }

    // ── Input aliasing (rule 3) ────────────────────────────────────

    /// Finds an input whose storage this output may take over, per the
    /// kernel's contracts. Returns the input's value index and whether the
    /// output becomes a strided view.
    pub(crate) fn find_reusable_input(
        &self,
        ctx: &dyn PlannerContext,
        node: &Node,
        output_arg_idx: usize,
    ) -> Result<Option<(ValueIndex, bool)>, PlanError> {
        // Tensors flowing into a yield operator are handed back to the
        // embedding caller; overwriting them would corrupt the caller's
        // view of the results.
        for &succ in self.graph.successors(node.index) {
            if self.graph.node(succ)?.op_type == YIELD_OP {
                return Ok(None);
            }
        }

        let kernel = self.kernel(node.index)?.clone();
        let output_name = &node.outputs[output_arg_idx];
        let output_def = self.graph.value_def(output_name);

        // Mandatory alias (e.g. Reshape): reuse regardless of use counts.
        for &(input_idx, out_idx) in &kernel.alias {
            if out_idx != output_arg_idx {
                continue;
            }
            if let Some(input) = node.inputs.get(input_idx) {
                if arg_exists(input) {
                    return Ok(Some((self.index(input)?, false)));
                }
            }
        }

        // Variadic alias: output at relative offset maps to input at
        // relative offset.
        if let Some((input_offset, output_offset)) = kernel.variadic_alias {
            let alias_input_idx =
                output_arg_idx as isize - output_offset as isize + input_offset as isize;
            if alias_input_idx >= 0 {
                if let Some(input) = node.inputs.get(alias_input_idx as usize) {
                    if arg_exists(input) {
                        return Ok(Some((self.index(input)?, false)));
                    }
                }
            }
        }

        // Optional in-place: only on the input's last use, and only when
        // the byte sizes match.
        for &(input_idx, out_idx) in &kernel.may_inplace {
            if out_idx != output_arg_idx {
                continue;
            }
            let Some(input) = node.inputs.get(input_idx).filter(|n| arg_exists(n)) else {
                continue;
            };
            let input_index = self.index(input)?;
            let Some(original) = self.buffer(input_index) else { continue };
            if self.use_count(original) != 1 {
                continue;
            }
            let same = match (self.lookup_def(input), output_def) {
                (Some(a), Some(b)) => self.same_size(ctx, a, b),
                _ => false,
            };
            if same {
                return Ok(Some((input_index, false)));
            }
        }

        // Strided view: legal only when every downstream consumer accepts
        // a strided tensor at the corresponding position.
        for &(input_idx, out_idx) in &kernel.may_strided_output {
            if out_idx != output_arg_idx {
                continue;
            }
            let Some(input) = node.inputs.get(input_idx).filter(|n| arg_exists(n)) else {
                continue;
            };
            if self.all_consumers_accept_strided(node, output_name)? {
                return Ok(Some((self.index(input)?, true)));
            }
        }

        Ok(None)
    }

    fn all_consumers_accept_strided(
        &self,
        node: &Node,
        output_name: &str,
    ) -> Result<bool, PlanError> {
        for &succ in self.graph.successors(node.index) {
            let consumer = self.graph.node(succ)?;
            let Some(consumer_kernel) = self.kernel_info.get(&succ) else {
                return Ok(false);
            };
            for (i, input) in consumer.inputs.iter().enumerate() {
                if input == output_name && !consumer_kernel.accepts_strided_input(i) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    // ── Free-list match (rule 5) ───────────────────────────────────

    /// Finds a dead buffer matching the output's location and byte size.
    /// On success the buffer is removed from the free list.
    ///
    /// String tensors never match, and optional-typed candidates are
    /// skipped because their None-ness is only known at run time.
    pub(crate) fn find_reusable_tensor(
        &mut self,
        ctx: &dyn PlannerContext,
        output_def: &graph_ir::ValueDef,
        output_index: ValueIndex,
    ) -> Result<Option<ValueIndex>, PlanError> {
        if !ctx.enable_memory_reuse() {
            return Ok(None);
        }
        let Some(required_shape) = ctx.shape(output_def) else {
            return Ok(None);
        };
        if required_shape.rank() == 0 {
            return Ok(None);
        }
        let Some(required_location) = self.plan.allocation_plan[output_index].location else {
            return Ok(None);
        };

        let mut matched = None;
        for (pos, free) in self.freelist.iter().enumerate() {
            let Some(candidate_def) = self.def_of(free.value) else { continue };
            if candidate_def.is_optional() {
                continue;
            }
            if self.plan.allocation_plan[free.value].location != Some(required_location) {
                continue;
            }
            if self.same_size(ctx, candidate_def, output_def) {
                matched = Some((pos, free.value));
                break;
            }
        }

        match matched {
            Some((pos, value)) => {
                self.freelist.remove(pos);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    // ── Pass 3: multi-stream refinement ────────────────────────────

    /// Relaxes the no-reuse baseline using the combined dependence graph.
    ///
    /// The sweep visits nodes in Kahn order over the reversed dependence
    /// graph (sinks first). `try_reuse_input` re-applies the kernel
    /// aliasing contracts; `try_reuse_output` matches each output against
    /// waiting downstream values whose producing node — and every consumer
    /// of the output — provably runs after all reads of the output, on
    /// every stream.
    pub(crate) fn optimize_reuse_plan_for_multi_stream(&mut self) -> Result<(), PlanError> {
        let mut sweep = MultiStreamSweep::default();

        // Out-degree per node under the dependence graph.
        let mut pending: HashMap<NodeIndex, usize> = HashMap::new();
        for upstreams in self.dependence_graph.values() {
            for &up in upstreams {
                *pending.entry(up).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        for stream in &self.stream_nodes {
            for &node_index in stream {
                if pending.get(&node_index).copied().unwrap_or(0) == 0 {
                    queue.push_back(node_index);
                }
            }
        }

        while let Some(node_index) = queue.pop_front() {
            self.try_reuse_input(node_index, &mut sweep)?;
            self.try_reuse_output(node_index, &mut sweep)?;

            if let Some(upstreams) = self.dependence_graph.get(&node_index) {
                for &up in upstreams.clone().iter() {
                    let counter = pending.get_mut(&up).expect("counted above");
                    *counter -= 1;
                    if *counter == 0 {
                        queue.push_back(up);
                    }
                }
            }
        }
        Ok(())
    }

    /// Re-applies alias, variadic-alias, and in-place contracts on top of
    /// the baseline. In-place additionally requires the input to have
    /// exactly one surviving consumer.
    fn try_reuse_input(
        &mut self,
        node_index: NodeIndex,
        sweep: &mut MultiStreamSweep,
    ) -> Result<(), PlanError> {
        let graph = self.graph;
        let node = graph.node(node_index)?;
        let Some(kernel) = self.kernel_info.get(&node_index).cloned() else {
            return Ok(());
        };

        // Record input/output pairings so try_reuse_output never fuses a
        // kernel's own input with its output.
        let mut input_indices = Vec::new();
        for input in &node.inputs {
            if arg_exists(input) {
                if let Ok(idx) = self.index(input) {
                    input_indices.push(idx);
                }
            }
        }

        for (output_arg_idx, output_name) in node.outputs.iter().enumerate() {
            if !arg_exists(output_name) {
                continue;
            }
            let output_idx = self.index(output_name)?;
            for &input_idx in &input_indices {
                sweep
                    .input_output_map
                    .entry(input_idx)
                    .or_default()
                    .insert(output_idx);
            }
            if self.plan.allocation_plan[output_idx].alloc_kind != AllocKind::Allocate {
                continue;
            }

            let mut found = false;
            for &(input_idx, out_idx) in &kernel.alias {
                if out_idx != output_arg_idx {
                    continue;
                }
                if let Some(input) = node.inputs.get(input_idx).filter(|n| arg_exists(n)) {
                    let reusable = self.index(input)?;
                    if self.plan.allocation_plan[reusable].alloc_kind == AllocKind::Allocate {
                        self.commit_multi_stream_input_reuse(output_idx, reusable, sweep);
                        found = true;
                        break;
                    }
                }
            }
            if found {
                continue;
            }

            if let Some((input_offset, output_offset)) = kernel.variadic_alias {
                let alias_input_idx =
                    output_arg_idx as isize - output_offset as isize + input_offset as isize;
                if alias_input_idx >= 0 {
                    if let Some(input) = node
                        .inputs
                        .get(alias_input_idx as usize)
                        .filter(|n| arg_exists(n))
                    {
                        let reusable = self.index(input)?;
                        if self.plan.allocation_plan[reusable].alloc_kind == AllocKind::Allocate
                        {
                            self.commit_multi_stream_input_reuse(output_idx, reusable, sweep);
                            continue;
                        }
                    }
                }
            }

            for &(input_idx, out_idx) in &kernel.may_inplace {
                if out_idx != output_arg_idx {
                    continue;
                }
                let Some(input) = node.inputs.get(input_idx).filter(|n| arg_exists(n)) else {
                    continue;
                };
                let input_index = self.index(input)?;
                if self.plan.allocation_plan[input_index].alloc_kind != AllocKind::Allocate {
                    continue;
                }
                let single_consumer = self
                    .value_consumer_map
                    .get(&input_index)
                    .is_some_and(|c| c.len() == 1);
                let same = match (self.lookup_def(input), graph.value_def(output_name)) {
                    (Some(a), Some(b)) => self.same_size(self.context, a, b),
                    _ => false,
                };
                if single_consumer && same {
                    self.commit_multi_stream_input_reuse(output_idx, input_index, sweep);
                    break;
                }
            }
        }
        Ok(())
    }

    fn commit_multi_stream_input_reuse(
        &mut self,
        output_idx: ValueIndex,
        reusable: ValueIndex,
        sweep: &mut MultiStreamSweep,
    ) {
        tracing::debug!("value {reusable} reused by value {output_idx} as aliased input");
        let entry = &mut self.plan.allocation_plan[output_idx];
        entry.alloc_kind = AllocKind::Reuse;
        entry.reused_buffer = Some(reusable);

        let output_consumers = self
            .value_consumer_map
            .get(&output_idx)
            .cloned()
            .unwrap_or_default();
        self.value_consumer_map
            .entry(reusable)
            .or_default()
            .extend(output_consumers);
        sweep.reused.insert(reusable);
    }

    /// Offers this node's outputs to waiting downstream values, and parks
    /// unmatched outputs on the waiting list keyed by (location, size).
    fn try_reuse_output(
        &mut self,
        node_index: NodeIndex,
        sweep: &mut MultiStreamSweep,
    ) -> Result<(), PlanError> {
        let graph = self.graph;
        let node = graph.node(node_index)?;

        sweep
            .dependents_map
            .entry(node_index)
            .or_insert_with(|| transitive_dependents(&self.dependence_graph, node_index));

        for output_name in &node.outputs {
            if !arg_exists(output_name) {
                continue;
            }
            let output_idx = self.index(output_name)?;
            if sweep.reused.contains(&output_idx)
                || self.plan.allocation_plan[output_idx].alloc_kind != AllocKind::Allocate
            {
                continue;
            }
            let Some(def) = graph.value_def(output_name) else { continue };
            let Some(size) = self.byte_size(self.context, def) else { continue };
            let Some(location) = self.plan.allocation_plan[output_idx].location else {
                continue;
            };

            let key = (location, size);
            let mut matched = None;
            if let Some(entries) = sweep.waiting_list.get(&key) {
                for (pos, waiting) in entries.iter().enumerate() {
                    // Never fuse a kernel's own input and output.
                    if sweep
                        .input_output_map
                        .get(&output_idx)
                        .is_some_and(|outs| outs.contains(&waiting.value))
                    {
                        continue;
                    }
                    let deps = &sweep.dependents_map[&waiting.node];
                    if !deps.contains(&node_index) {
                        continue;
                    }
                    let all_covered = self
                        .value_consumer_map
                        .get(&output_idx)
                        .map(|consumers| consumers.iter().all(|c| deps.contains(c)))
                        .unwrap_or(true);
                    if all_covered {
                        matched = Some((pos, waiting.value));
                        break;
                    }
                }
            }

            match matched {
                Some((pos, downstream_value)) => {
                    tracing::debug!(
                        "value {output_idx} reused by downstream value {downstream_value} across streams",
                    );
                    let entry = &mut self.plan.allocation_plan[downstream_value];
                    entry.alloc_kind = AllocKind::Reuse;
                    entry.reused_buffer = Some(output_idx);

                    // The downstream writer and its consumers now extend
                    // the buffer's consumer set.
                    let mut extension: HashSet<NodeIndex> = self
                        .value_consumer_map
                        .get(&downstream_value)
                        .cloned()
                        .unwrap_or_default();
                    if let Some(&producer) = self.value_node_map.get(&downstream_value) {
                        extension.insert(producer);
                    }
                    self.value_consumer_map
                        .entry(output_idx)
                        .or_default()
                        .extend(extension);

                    sweep.reused.insert(output_idx);
                    let entries = sweep.waiting_list.get_mut(&key).expect("matched above");
                    entries.remove(pos);
                    if entries.is_empty() {
                        sweep.waiting_list.remove(&key);
                    }
                }
                None => {
                    sweep.waiting_list.entry(key).or_default().push(WaitingValue {
                        value: output_idx,
                        node: node_index,
                    });
                }
            }
        }
        Ok(())
    }
}

/// A value wanting to take over an upstream buffer.
#[derive(Debug, Clone, Copy)]
struct WaitingValue {
    value: ValueIndex,
    node: NodeIndex,
}

/// Scratch state of the multi-stream sweep.
#[derive(Default)]
struct MultiStreamSweep {
    /// Values wanting to reuse upstream memory, bucketed by
    /// (location, byte size).
    waiting_list: BTreeMap<(device_registry::MemoryLocation, u64), Vec<WaitingValue>>,
    /// Per visited node, all upstream nodes guaranteed complete before it.
    dependents_map: HashMap<NodeIndex, HashSet<NodeIndex>>,
    /// Kernel input → outputs of the same kernel.
    input_output_map: HashMap<ValueIndex, HashSet<ValueIndex>>,
    /// Buffers already claimed in this sweep; each is taken over once.
    reused: HashSet<ValueIndex>,
}

/// All nodes reachable from `start` through upstream edges, including
/// `start` itself.
fn transitive_dependents(
    dependence_graph: &HashMap<NodeIndex, HashSet<NodeIndex>>,
    start: NodeIndex,
) -> HashSet<NodeIndex> {
    let mut seen = HashSet::new();
    let mut stack = vec![start];
    while let Some(current) = stack.pop() {
        if seen.insert(current) {
            if let Some(upstreams) = dependence_graph.get(&current) {
                stack.extend(upstreams.iter().copied());
            }
        }
    }
    seen
}
