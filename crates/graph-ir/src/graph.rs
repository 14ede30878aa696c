// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The computation graph: a DAG of nodes in topological order.
//!
//! Graphs are immutable once built. [`GraphBuilder::build`] validates the
//! structure (single assignment per value, topological input ordering) and
//! precomputes the node-level edge lists the planner traverses.

use crate::{arg_exists, GraphError, Node, NodeIndex, ValueDef};
use std::collections::HashMap;
use std::fmt;

/// A frozen computation graph.
///
/// Node index equals position in `nodes`, and `nodes` is already a valid
/// topological order — the loader guarantees both.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Graph name, used in error context and dumps.
    pub name: String,
    /// Nodes in topological order.
    nodes: Vec<Node>,
    /// Required feed inputs (initializers excluded).
    inputs: Vec<String>,
    /// Named graph outputs.
    outputs: Vec<String>,
    /// Initializer (weight) value names.
    initializers: Vec<String>,
    /// Definition of every value referenced in this graph.
    value_defs: HashMap<String, ValueDef>,
    /// Value name -> producing node.
    producer: HashMap<String, NodeIndex>,
    /// Node-level out-edges, deduplicated, in topological order.
    successors: Vec<Vec<NodeIndex>>,
    /// Node-level in-edges, deduplicated, in topological order.
    predecessors: Vec<Vec<NodeIndex>>,
}

impl Graph {
    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Returns a node by index.
    pub fn node(&self, index: NodeIndex) -> Result<&Node, GraphError> {
        self.nodes.get(index).ok_or(GraphError::UnknownNode(index))
    }

    /// Iterates nodes in topological order.
    pub fn nodes_in_topological_order(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Required feed inputs (initializers excluded).
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Feed inputs followed by initializers.
    pub fn inputs_including_initializers(&self) -> impl Iterator<Item = &String> {
        self.inputs.iter().chain(self.initializers.iter())
    }

    /// Named graph outputs.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Initializer names.
    pub fn initializers(&self) -> &[String] {
        &self.initializers
    }

    /// Returns `true` if `name` is an initializer of this graph.
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializers.iter().any(|i| i == name)
    }

    /// Returns `true` if `name` is a named graph output.
    pub fn is_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o == name)
    }

    /// The definition of a value, if registered.
    pub fn value_def(&self, name: &str) -> Option<&ValueDef> {
        self.value_defs.get(name)
    }

    /// The node producing `name`, if it is a node output.
    pub fn producer(&self, name: &str) -> Option<NodeIndex> {
        self.producer.get(name).copied()
    }

    /// Nodes consuming any output of `index` (explicitly or implicitly),
    /// deduplicated, in topological order.
    pub fn successors(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.successors[index]
    }

    /// Nodes producing any input of `index` (explicit or implicit),
    /// deduplicated, in topological order.
    pub fn predecessors(&self, index: NodeIndex) -> &[NodeIndex] {
        &self.predecessors[index]
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        format!(
            "Graph '{}': {} nodes, {} inputs, {} outputs, {} initializers",
            self.name,
            self.nodes.len(),
            self.inputs.len(),
            self.outputs.len(),
            self.initializers.len(),
        )
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for node in &self.nodes {
            writeln!(f, "  {}", node.summary())?;
        }
        Ok(())
    }
}

/// Incremental builder for [`Graph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    name: String,
    nodes: Vec<Node>,
    inputs: Vec<String>,
    outputs: Vec<String>,
    initializers: Vec<String>,
    value_defs: HashMap<String, ValueDef>,
}

impl GraphBuilder {
    /// Starts a new graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Registers a value definition.
    pub fn value(mut self, def: ValueDef) -> Self {
        self.value_defs.insert(def.name.clone(), def);
        self
    }

    /// Declares a feed input.
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Declares a graph output.
    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    /// Declares an initializer.
    pub fn initializer(mut self, name: impl Into<String>) -> Self {
        self.initializers.push(name.into());
        self
    }

    /// Appends a node; nodes must be added in topological order.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validates and freezes the graph.
    ///
    /// # Checks
    /// - The graph has at least one node.
    /// - Every existing output is produced exactly once and does not shadow
    ///   a graph input or initializer.
    /// - Every node input produced inside the graph is produced by an
    ///   earlier node (the node order is a valid topological order).
    ///
    /// Input names with no producer and no input/initializer declaration
    /// are left as free names — they may be bound from an outer scope when
    /// this graph is nested inside a control-flow node.
    pub fn build(mut self) -> Result<Graph, GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::InvalidGraph("graph contains no nodes".into()));
        }

        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.index = i;
        }

        let mut producer: HashMap<String, NodeIndex> = HashMap::new();
        for node in &self.nodes {
            for output in &node.outputs {
                if !arg_exists(output) {
                    continue;
                }
                if self.inputs.contains(output) || self.initializers.contains(output) {
                    return Err(GraphError::InvalidNode {
                        node: node.name.clone(),
                        detail: format!("output '{output}' shadows a graph input or initializer"),
                    });
                }
                if producer.insert(output.clone(), node.index).is_some() {
                    return Err(GraphError::DuplicateValue(output.clone()));
                }
            }
        }

        // Topological consistency: internally produced inputs must come
        // from strictly earlier nodes.
        for node in &self.nodes {
            for input in node.inputs.iter().chain(node.implicit_inputs.iter()) {
                if !arg_exists(input) {
                    continue;
                }
                if let Some(&p) = producer.get(input) {
                    if p >= node.index {
                        return Err(GraphError::InvalidNode {
                            node: node.name.clone(),
                            detail: format!(
                                "input '{input}' is produced by node {p}, which does not precede node {}",
                                node.index,
                            ),
                        });
                    }
                }
            }
        }

        // Fill in untyped defs for any referenced name without one, so the
        // planner can always resolve a definition site.
        let mut register = |name: &String, defs: &mut HashMap<String, ValueDef>| {
            if arg_exists(name) && !defs.contains_key(name) {
                defs.insert(name.clone(), ValueDef::untyped(name.clone()));
            }
        };
        let mut defs = std::mem::take(&mut self.value_defs);
        for node in &self.nodes {
            for name in node
                .inputs
                .iter()
                .chain(node.implicit_inputs.iter())
                .chain(node.outputs.iter())
            {
                register(name, &mut defs);
            }
        }
        for name in self
            .inputs
            .iter()
            .chain(self.initializers.iter())
            .chain(self.outputs.iter())
        {
            register(name, &mut defs);
        }

        // Node-level edges, deduplicated, in topological order.
        let n = self.nodes.len();
        let mut successors: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        let mut predecessors: Vec<Vec<NodeIndex>> = vec![Vec::new(); n];
        for node in &self.nodes {
            for input in node.inputs.iter().chain(node.implicit_inputs.iter()) {
                if let Some(&p) = producer.get(input.as_str()) {
                    if !successors[p].contains(&node.index) {
                        successors[p].push(node.index);
                    }
                    if !predecessors[node.index].contains(&p) {
                        predecessors[node.index].push(p);
                    }
                }
            }
        }
        for list in successors.iter_mut().chain(predecessors.iter_mut()) {
            list.sort_unstable();
        }

        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            inputs: self.inputs,
            outputs: self.outputs,
            initializers: self.initializers,
            value_defs: defs,
            producer,
            successors,
            predecessors,
        })
    }
}
