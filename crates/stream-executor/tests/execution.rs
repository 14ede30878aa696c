// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! End-to-end execution of planned graphs: cross-stream ordering,
//! buffer releases, and cooperative cancellation.

use device_registry::{
    DeviceType, ExecutionProvider, ProviderRegistry, StreamCommandHandleRegistry,
};
use exec_planner::{
    DefaultPlannerContext, PlannerInputs, SequentialExecutionPlan, SequentialPlanner,
};
use graph_ir::{
    ElemType, Graph, GraphBuilder, KernelDef, KernelInfoMap, Node, Shape, ValueDef, ValueTable,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stream_executor::{run_plan, ExecError, KernelRunner};

const CPU: &str = "CpuExecutionProvider";
const GPU: &str = "GpuExecutionProvider";

/// Records every kernel launch in completion order.
#[derive(Default)]
struct RecordingRunner {
    launches: Mutex<Vec<(usize, usize)>>,
    fail_on: Option<usize>,
}

impl RecordingRunner {
    fn failing_on(node: usize) -> Self {
        Self {
            launches: Mutex::new(Vec::new()),
            fail_on: Some(node),
        }
    }

    fn order(&self) -> Vec<usize> {
        self.launches.lock().unwrap().iter().map(|&(n, _)| n).collect()
    }
}

impl KernelRunner for RecordingRunner {
    fn run(&self, node: usize, stream_idx: usize) -> Result<(), ExecError> {
        if self.fail_on == Some(node) {
            return Err(ExecError::Kernel {
                node,
                detail: "injected failure".into(),
            });
        }
        self.launches.lock().unwrap().push((node, stream_idx));
        Ok(())
    }
}

fn f32_value(name: &str, dims: &[u64]) -> ValueDef {
    ValueDef::tensor(name, ElemType::F32, Shape::fixed(dims))
}

fn plan_graph(graph: &Graph, providers: &ProviderRegistry) -> (SequentialExecutionPlan, ValueTable) {
    let empty = Arc::new(KernelDef::new());
    let mut kernels = KernelInfoMap::new();
    for node in graph.nodes_in_topological_order() {
        kernels.insert(node.index, Arc::clone(&empty));
    }
    let table = ValueTable::from_graph(graph, std::iter::empty());

    let mut handles = StreamCommandHandleRegistry::new();
    for producer in providers.iter() {
        for consumer in providers.iter() {
            if producer.name != consumer.name {
                handles.register_wait_handle(
                    &producer.name,
                    &consumer.name,
                    Arc::new(|stream, notif| stream.update_clock(notif.stream_clock)),
                );
            }
        }
    }

    let plan = SequentialPlanner::create_plan(
        PlannerInputs {
            parent_node: None,
            graph,
            outer_scope_args: &[],
            providers,
            kernel_info: &kernels,
            subgraph_kernel_info: &HashMap::new(),
            outer_scope_locations: &HashMap::new(),
            value_table: &table,
            handle_registry: &handles,
            partition_config: None,
        },
        &DefaultPlannerContext,
    )
    .unwrap();
    (plan, table)
}

fn cpu_gpu() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(ExecutionProvider::cpu()).unwrap();
    registry
        .register(ExecutionProvider::new(GPU, DeviceType::Gpu, 0))
        .unwrap();
    registry
}

fn cpu_only() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(ExecutionProvider::cpu()).unwrap();
    registry
}

/// x → N1(cpu) → N2(gpu) → N3(cpu) → out
fn two_provider_graph() -> Graph {
    GraphBuilder::new("two_provider")
        .input("x")
        .output("out")
        .value(f32_value("x", &[8]))
        .value(f32_value("a", &[8]))
        .value(f32_value("b", &[8]))
        .value(f32_value("out", &[8]))
        .node(Node::new("N1", "Relu", CPU).with_inputs(["x"]).with_outputs(["a"]))
        .node(Node::new("N2", "MatMul", GPU).with_inputs(["a"]).with_outputs(["b"]))
        .node(Node::new("N3", "Relu", CPU).with_inputs(["b"]).with_outputs(["out"]))
        .build()
        .unwrap()
}

#[test]
fn test_cross_stream_order_is_respected() {
    let graph = two_provider_graph();
    let providers = cpu_gpu();
    let (plan, _) = plan_graph(&graph, &providers);
    assert_eq!(plan.num_streams(), 2);

    // Run several times: the barrier/notification protocol must enforce
    // N1 < N2 < N3 on every interleaving.
    for _ in 0..20 {
        let runner = RecordingRunner::default();
        run_plan(&plan, &runner).unwrap();
        assert_eq!(runner.order(), vec![0, 1, 2]);
    }
}

#[test]
fn test_fanout_runs_all_consumers() {
    let graph = GraphBuilder::new("fanout")
        .input("x")
        .output("o1")
        .output("o2")
        .value(f32_value("x", &[8]))
        .value(f32_value("v", &[8]))
        .value(f32_value("o1", &[8]))
        .value(f32_value("o2", &[8]))
        .node(Node::new("X", "Relu", CPU).with_inputs(["x"]).with_outputs(["v"]))
        .node(Node::new("Y", "MatMul", GPU).with_inputs(["v"]).with_outputs(["o1"]))
        .node(Node::new("Z", "Relu", CPU).with_inputs(["v"]).with_outputs(["o2"]))
        .build()
        .unwrap();
    let providers = cpu_gpu();
    let (plan, _) = plan_graph(&graph, &providers);

    let runner = RecordingRunner::default();
    run_plan(&plan, &runner).unwrap();

    let order = runner.order();
    assert_eq!(order.len(), 3);
    assert_eq!(order[0], 0, "producer must run first");
}

#[test]
fn test_release_fires_after_last_consumer() {
    let graph = GraphBuilder::new("chain")
        .input("x")
        .output("out")
        .value(f32_value("x", &[4]))
        .value(f32_value("a", &[4]))
        .value(f32_value("out", &[4]))
        .node(Node::new("A", "Exp", CPU).with_inputs(["x"]).with_outputs(["a"]))
        .node(Node::new("B", "Exp", CPU).with_inputs(["a"]).with_outputs(["out"]))
        .build()
        .unwrap();
    let providers = cpu_only();
    let (plan, table) = plan_graph(&graph, &providers);

    let runner = RecordingRunner::default();
    let released = run_plan(&plan, &runner).unwrap();
    assert_eq!(released, vec![table.index("a").unwrap()]);
}

#[test]
fn test_multi_stream_release_waits_for_all_consumers() {
    // v is consumed on both streams; its buffer must be released exactly
    // once, after both consumers completed.
    let graph = GraphBuilder::new("fan")
        .input("x")
        .output("o1")
        .output("o2")
        .value(f32_value("x", &[4]))
        .value(f32_value("v", &[4]))
        .value(f32_value("o1", &[4]))
        .value(f32_value("o2", &[4]))
        .node(Node::new("p", "Exp", CPU).with_inputs(["x"]).with_outputs(["v"]))
        .node(Node::new("c1", "Exp", CPU).with_inputs(["v"]).with_outputs(["o1"]))
        .node(Node::new("c2", "MatMul", GPU).with_inputs(["v"]).with_outputs(["o2"]))
        .build()
        .unwrap();
    let providers = cpu_gpu();
    let (plan, table) = plan_graph(&graph, &providers);

    for _ in 0..10 {
        let runner = RecordingRunner::default();
        let released = run_plan(&plan, &runner).unwrap();
        assert_eq!(released, vec![table.index("v").unwrap()]);
    }
}

#[test]
fn test_kernel_failure_terminates_other_streams() {
    let graph = two_provider_graph();
    let providers = cpu_gpu();
    let (plan, _) = plan_graph(&graph, &providers);

    let runner = RecordingRunner::failing_on(1);
    let err = run_plan(&plan, &runner).unwrap_err();
    assert!(matches!(err, ExecError::Kernel { node: 1, .. }), "got {err}");

    // N3 depends on the failed kernel and must not have launched.
    assert!(!runner.order().contains(&2));
}

#[test]
fn test_single_stream_plan_runs_in_emitted_order() {
    let graph = GraphBuilder::new("chain")
        .input("x")
        .output("out")
        .value(f32_value("x", &[4]))
        .value(f32_value("a", &[4]))
        .value(f32_value("b", &[4]))
        .value(f32_value("out", &[4]))
        .node(Node::new("A", "Exp", CPU).with_inputs(["x"]).with_outputs(["a"]))
        .node(Node::new("B", "Exp", CPU).with_inputs(["a"]).with_outputs(["b"]))
        .node(Node::new("C", "Exp", CPU).with_inputs(["b"]).with_outputs(["out"]))
        .build()
        .unwrap();
    let providers = cpu_only();
    let (plan, _) = plan_graph(&graph, &providers);
    assert_eq!(plan.num_streams(), 1);

    let runner = RecordingRunner::default();
    run_plan(&plan, &runner).unwrap();
    assert_eq!(runner.order(), vec![0, 1, 2]);
}
