// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for plan construction.
//!
//! All planner errors are fatal: no partial plan is ever returned. Inner
//! steps propagate unchanged; only [`crate::SequentialPlanner::create_plan`]
//! wraps the failure with the graph it occurred in.

/// Errors that can occur while building an execution plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Caller-supplied inputs are malformed (missing kernel info,
    /// inconsistent provider bindings, bad configuration).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The planner's own bookkeeping broke an invariant (value index out
    /// of range, cyclic reuse chain, unregistered definition).
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// A decision requires a capability this build does not include.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Stream partitioning failed.
    #[error(transparent)]
    Partition(#[from] stream_partitioner::PartitionError),

    /// A graph lookup failed.
    #[error(transparent)]
    Graph(#[from] graph_ir::GraphError),

    /// A device registry lookup failed.
    #[error(transparent)]
    Registry(#[from] device_registry::RegistryError),

    /// Boundary wrapper carrying the graph the failure occurred in.
    #[error("planning failed for graph '{graph}': {source}")]
    InGraph {
        graph: String,
        #[source]
        source: Box<PlanError>,
    },
}

impl PlanError {
    /// Wraps an error with graph context at the planner boundary.
    pub(crate) fn in_graph(graph: &str) -> impl FnOnce(PlanError) -> PlanError + '_ {
        move |source| PlanError::InGraph {
            graph: graph.to_string(),
            source: Box::new(source),
        }
    }
}
