// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The injective value-name → dense-index mapping.
//!
//! Every value the planner touches — graph inputs, outer-scope args,
//! initializers, and every existing node output — gets exactly one dense
//! index. The planner addresses all per-value state through these indices.

use crate::{arg_exists, Graph, GraphError, ValueIndex};
use std::collections::HashMap;

/// Bidirectional name ↔ dense index table.
#[derive(Debug, Clone, Default)]
pub struct ValueTable {
    by_name: HashMap<String, ValueIndex>,
    names: Vec<String>,
}

impl ValueTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table for one graph level: graph inputs, initializers,
    /// outer-scope args, then every node argument in topological order.
    pub fn from_graph<'a>(
        graph: &Graph,
        outer_scope: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        let mut table = Self::new();
        for name in graph.inputs_including_initializers() {
            table.intern(name);
        }
        for name in outer_scope {
            table.intern(name);
        }
        for node in graph.nodes_in_topological_order() {
            for name in node
                .inputs
                .iter()
                .chain(node.implicit_inputs.iter())
                .chain(node.outputs.iter())
            {
                table.intern(name);
            }
        }
        for name in graph.outputs() {
            table.intern(name);
        }
        table
    }

    /// Interns a name, returning its index. Empty names (missing optional
    /// arguments) are never interned and return `None`.
    pub fn intern(&mut self, name: &str) -> Option<ValueIndex> {
        if !arg_exists(name) {
            return None;
        }
        if let Some(&idx) = self.by_name.get(name) {
            return Some(idx);
        }
        let idx = self.names.len();
        self.by_name.insert(name.to_string(), idx);
        self.names.push(name.to_string());
        Some(idx)
    }

    /// Resolves a name to its index.
    pub fn index(&self, name: &str) -> Result<ValueIndex, GraphError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::UnknownValue(name.to_string()))
    }

    /// Resolves an index back to its name.
    pub fn name(&self, index: ValueIndex) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Number of interned values.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates `(name, index)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ValueIndex)> {
        self.names.iter().enumerate().map(|(i, n)| (n.as_str(), i))
    }
}
