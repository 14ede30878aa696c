// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `stream-rt plan` command: build and dump the execution plan.

use device_registry::{ProviderRegistry, StreamCommandHandleRegistry};
use exec_planner::{PlannerContext, PlannerInputs, SequentialPlanner};
use graph_ir::{GraphManifest, ValueTable};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Context honoring the `--no-reuse` switch.
struct CliPlannerContext {
    reuse: bool,
}

impl PlannerContext for CliPlannerContext {
    fn enable_memory_reuse(&self) -> bool {
        self.reuse
    }
}

pub fn execute(
    graph_path: PathBuf,
    partition_config: Option<PathBuf>,
    no_reuse: bool,
) -> anyhow::Result<()> {
    let manifest = GraphManifest::from_file(&graph_path).map_err(|e| {
        anyhow::anyhow!("failed to load graph from '{}': {e}", graph_path.display())
    })?;
    let graph = manifest.build_graph()?;
    let providers = manifest.build_providers()?;
    let kernel_info = manifest.build_kernel_map(&graph);
    let value_table = ValueTable::from_graph(&graph, std::iter::empty());
    let handle_registry = default_wait_handles(&providers);

    println!("{}", graph.summary());

    let context = CliPlannerContext { reuse: !no_reuse };
    let plan = SequentialPlanner::create_plan(
        PlannerInputs {
            parent_node: None,
            graph: &graph,
            outer_scope_args: &[],
            providers: &providers,
            kernel_info: &kernel_info,
            subgraph_kernel_info: &HashMap::new(),
            outer_scope_locations: &HashMap::new(),
            value_table: &value_table,
            handle_registry: &handle_registry,
            partition_config: partition_config.as_deref(),
        },
        &context,
    )?;

    println!();
    println!("{}", plan.dump(&value_table));
    println!(
        "{} stream(s), {} notification(s), {} barrier(s), {} release action(s)",
        plan.num_streams(),
        plan.num_notifications(),
        plan.num_barriers,
        plan.release_actions.len(),
    );
    Ok(())
}

/// Registers a clock-synchronizing wait handle for every cross-device
/// provider pair. Same-device pairs need no device-level wait.
fn default_wait_handles(providers: &ProviderRegistry) -> StreamCommandHandleRegistry {
    let mut registry = StreamCommandHandleRegistry::new();
    for producer in providers.iter() {
        for consumer in providers.iter() {
            if producer.name == consumer.name || producer.device == consumer.device {
                continue;
            }
            registry.register_wait_handle(
                &producer.name,
                &consumer.name,
                Arc::new(|stream, notification| {
                    stream.update_clock(notification.stream_clock);
                }),
            );
        }
    }
    registry
}
