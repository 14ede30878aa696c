// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Planning throughput on synthetic chains.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use device_registry::{DeviceType, ExecutionProvider, ProviderRegistry, StreamCommandHandleRegistry};
use exec_planner::{DefaultPlannerContext, PlannerInputs, SequentialPlanner};
use graph_ir::{ElemType, Graph, GraphBuilder, KernelDef, KernelInfoMap, Node, Shape, ValueDef, ValueTable};
use std::collections::HashMap;
use std::sync::Arc;

const CPU: &str = "CpuExecutionProvider";
const GPU: &str = "GpuExecutionProvider";

/// A linear chain alternating providers every `period` nodes.
fn chain(n: usize, period: usize) -> Graph {
    let mut builder = GraphBuilder::new("bench_chain")
        .input("v0")
        .output(format!("v{n}"))
        .value(ValueDef::tensor("v0", ElemType::F32, Shape::fixed(&[64, 64])));
    for i in 0..n {
        let provider = if (i / period) % 2 == 0 { CPU } else { GPU };
        builder = builder
            .value(ValueDef::tensor(
                format!("v{}", i + 1),
                ElemType::F32,
                Shape::fixed(&[64, 64]),
            ))
            .node(
                Node::new(format!("n{i}"), "Exp", provider)
                    .with_inputs([format!("v{i}")])
                    .with_outputs([format!("v{}", i + 1)]),
            );
    }
    builder.build().unwrap()
}

fn bench_planning(c: &mut Criterion) {
    let mut providers = ProviderRegistry::new();
    providers.register(ExecutionProvider::cpu()).unwrap();
    providers
        .register(ExecutionProvider::new(GPU, DeviceType::Gpu, 0))
        .unwrap();

    let mut group = c.benchmark_group("create_plan");
    for &n in &[16usize, 128, 512] {
        let graph = chain(n, 8);
        let empty = Arc::new(KernelDef::new().with_may_inplace(0, 0));
        let kernels: KernelInfoMap = graph
            .nodes_in_topological_order()
            .map(|node| (node.index, Arc::clone(&empty)))
            .collect();
        let table = ValueTable::from_graph(&graph, std::iter::empty());
        let handles = StreamCommandHandleRegistry::new();

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                SequentialPlanner::create_plan(
                    PlannerInputs {
                        parent_node: None,
                        graph: &graph,
                        outer_scope_args: &[],
                        providers: &providers,
                        kernel_info: &kernels,
                        subgraph_kernel_info: &HashMap::new(),
                        outer_scope_locations: &HashMap::new(),
                        value_table: &table,
                        handle_registry: &handles,
                        partition_config: None,
                    },
                    &DefaultPlannerContext,
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_planning);
criterion_main!(benches);
