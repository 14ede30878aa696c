// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph nodes.
//!
//! A node names its argument values; the [`crate::Graph`] owns the value
//! definitions. Omitted optional arguments are empty strings (see
//! [`crate::arg_exists`]). Control-flow nodes carry their subgraphs as
//! attribute-name → graph pairs.

use crate::Graph;
use std::collections::BTreeMap;

/// One operator instance in the graph.
#[derive(Debug, Clone, Default)]
pub struct Node {
    /// Position of this node in the graph's topological order.
    pub index: usize,
    /// Node name; may be empty, in which case the node is referenced
    /// externally as `<op_type><k>` with `k` its occurrence index.
    pub name: String,
    /// Operator type, e.g. `"MatMul"`, `"Loop"`, `"Identity"`.
    pub op_type: String,
    /// Execution provider this node was bound to during partitioning.
    pub provider: String,
    /// Explicit input value names, in argument order.
    pub inputs: Vec<String>,
    /// Outer-scope values consumed by nested subgraphs of this node.
    pub implicit_inputs: Vec<String>,
    /// Output value names, in argument order.
    pub outputs: Vec<String>,
    /// Nested subgraphs keyed by the attribute that carries them.
    pub subgraphs: BTreeMap<String, Graph>,
}

impl Node {
    /// Creates a node with no arguments bound yet.
    pub fn new(
        name: impl Into<String>,
        op_type: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            provider: provider.into(),
            ..Default::default()
        }
    }

    /// Sets the explicit inputs.
    pub fn with_inputs<S: Into<String>>(mut self, inputs: impl IntoIterator<Item = S>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the implicit (outer-scope) inputs.
    pub fn with_implicit_inputs<S: Into<String>>(
        mut self,
        inputs: impl IntoIterator<Item = S>,
    ) -> Self {
        self.implicit_inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the outputs.
    pub fn with_outputs<S: Into<String>>(mut self, outputs: impl IntoIterator<Item = S>) -> Self {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches a subgraph under the given attribute name.
    pub fn with_subgraph(mut self, attr: impl Into<String>, graph: Graph) -> Self {
        self.subgraphs.insert(attr.into(), graph);
        self
    }

    /// Returns `true` if this node carries any nested subgraph.
    pub fn contains_subgraph(&self) -> bool {
        !self.subgraphs.is_empty()
    }

    /// One-line description for logs and dumps.
    pub fn summary(&self) -> String {
        format!(
            "#{} {} ({}) on {}: {:?} -> {:?}",
            self.index, self.name, self.op_type, self.provider, self.inputs, self.outputs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let n = Node::new("add0", "Add", "CpuExecutionProvider")
            .with_inputs(["a", "b"])
            .with_outputs(["c"]);
        assert_eq!(n.op_type, "Add");
        assert_eq!(n.inputs, vec!["a", "b"]);
        assert_eq!(n.outputs, vec!["c"]);
        assert!(!n.contains_subgraph());
    }

    #[test]
    fn test_summary_contains_name_and_provider() {
        let n = Node::new("relu1", "Relu", "GpuExecutionProvider")
            .with_inputs(["x"])
            .with_outputs(["y"]);
        let s = n.summary();
        assert!(s.contains("relu1"));
        assert!(s.contains("GpuExecutionProvider"));
    }
}
