// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # graph-ir
//!
//! The frozen computation graph consumed by the execution planner.
//!
//! A graph arrives here fully resolved: shapes inferred, every node bound
//! to an execution provider, and cross-device copies already inserted by
//! an earlier pass. This crate only models that result — it never rewrites
//! the graph.
//!
//! # Key Components
//!
//! - [`Graph`] / [`Node`] — the DAG in topological order, including nested
//!   subgraphs attached to control-flow nodes.
//! - [`ValueDef`] — per-value element type, container kind, and (possibly
//!   symbolic) shape.
//! - [`KernelDef`] — kernel-declared planning metadata: alias and in-place
//!   contracts, strided hints, per-argument memory types, external-output
//!   and contiguous-input flags.
//! - [`ValueTable`] — the injective value-name → dense-index mapping the
//!   planner addresses values through.
//! - [`GraphManifest`] — a JSON description of a graph, its providers, and
//!   its kernel table, used by the CLI and integration tests.

mod error;
mod graph;
mod kernel;
mod manifest;
mod node;
mod table;
mod value;

pub use error::GraphError;
pub use graph::{Graph, GraphBuilder};
pub use kernel::{compose_nested_key, KernelDef, KernelInfoMap, SubgraphKernelInfoMaps};
pub use manifest::{GraphManifest, ManifestKernel, ManifestNode, ManifestProvider, ManifestValue};
pub use node::Node;
pub use table::ValueTable;
pub use value::{arg_exists, Dim, ElemType, Shape, ValueDef, ValueKind, ValueType};

/// Index of a node within its graph.
pub type NodeIndex = usize;

/// Dense index of a value within a [`ValueTable`].
pub type ValueIndex = usize;
