// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON graph manifest parsing.
//!
//! The manifest describes a frozen graph, the providers its nodes were
//! bound to, and the kernel contracts per operator type. It is the input
//! format of the `stream-rt` CLI and of integration tests.
//!
//! # Format
//! ```json
//! {
//!   "name": "two_stage",
//!   "providers": [
//!     { "name": "CpuExecutionProvider", "device": "cpu" },
//!     { "name": "GpuExecutionProvider", "device": "gpu" }
//!   ],
//!   "inputs": ["x"],
//!   "outputs": ["out"],
//!   "initializers": ["w0"],
//!   "values": [
//!     { "name": "x", "elem": "f32", "shape": [1, 768] },
//!     { "name": "w0", "elem": "f32", "shape": [768, 768] }
//!   ],
//!   "nodes": [
//!     {
//!       "name": "mm0", "op_type": "MatMul",
//!       "provider": "GpuExecutionProvider",
//!       "inputs": ["x", "w0"], "outputs": ["out"]
//!     }
//!   ],
//!   "kernels": {
//!     "Relu": { "may_inplace": [[0, 0]] }
//!   }
//! }
//! ```

use crate::{
    ElemType, Graph, GraphBuilder, GraphError, KernelDef, KernelInfoMap, Node, Shape, ValueDef,
    ValueKind, ValueType,
};
use device_registry::{DeviceType, ExecutionProvider, ProviderRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One provider entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestProvider {
    pub name: String,
    pub device: DeviceType,
    #[serde(default)]
    pub device_id: u16,
}

/// One value definition in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestValue {
    pub name: String,
    pub elem: ElemType,
    #[serde(default)]
    pub kind: ValueKind,
    #[serde(default)]
    pub shape: Option<Shape>,
}

/// One node entry in the manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestNode {
    #[serde(default)]
    pub name: String,
    pub op_type: String,
    pub provider: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub implicit_inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// Kernel contracts keyed by operator type.
pub type ManifestKernel = KernelDef;

/// Top-level graph manifest.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphManifest {
    pub name: String,
    pub providers: Vec<ManifestProvider>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub initializers: Vec<String>,
    #[serde(default)]
    pub values: Vec<ManifestValue>,
    pub nodes: Vec<ManifestNode>,
    #[serde(default)]
    pub kernels: HashMap<String, ManifestKernel>,
}

impl GraphManifest {
    /// Loads a manifest from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates internal consistency.
    ///
    /// # Checks
    /// - At least one node and one provider.
    /// - Every node references a declared provider.
    /// - No duplicate value-definition names.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::InvalidGraph("manifest contains no nodes".into()));
        }
        if self.providers.is_empty() {
            return Err(GraphError::InvalidGraph(
                "manifest declares no execution providers".into(),
            ));
        }

        let provider_names: Vec<&str> = self.providers.iter().map(|p| p.name.as_str()).collect();
        for node in &self.nodes {
            if !provider_names.contains(&node.provider.as_str()) {
                return Err(GraphError::InvalidNode {
                    node: node.name.clone(),
                    detail: format!("undeclared execution provider '{}'", node.provider),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for value in &self.values {
            if !seen.insert(value.name.as_str()) {
                return Err(GraphError::DuplicateValue(value.name.clone()));
            }
        }

        // Dangling value defs are legal but usually a typo in the manifest.
        for value in &self.values {
            let referenced = self.nodes.iter().any(|n| {
                n.inputs.iter().chain(n.implicit_inputs.iter()).chain(n.outputs.iter())
                    .any(|a| a == &value.name)
            }) || self.inputs.contains(&value.name)
                || self.outputs.contains(&value.name)
                || self.initializers.contains(&value.name);
            if !referenced {
                tracing::warn!("value '{}' is defined but never referenced", value.name);
            }
        }
        Ok(())
    }

    /// Builds the provider registry declared by this manifest.
    pub fn build_providers(&self) -> Result<ProviderRegistry, GraphError> {
        let mut registry = ProviderRegistry::new();
        for p in &self.providers {
            registry.register(ExecutionProvider::new(&p.name, p.device, p.device_id))?;
        }
        Ok(registry)
    }

    /// Builds the graph described by this manifest.
    pub fn build_graph(&self) -> Result<Graph, GraphError> {
        self.validate()?;
        let mut builder = GraphBuilder::new(&self.name);
        for value in &self.values {
            builder = builder.value(ValueDef {
                name: value.name.clone(),
                ty: Some(ValueType {
                    elem: value.elem,
                    kind: value.kind,
                }),
                shape: value.shape.clone(),
            });
        }
        for input in &self.inputs {
            builder = builder.input(input);
        }
        for output in &self.outputs {
            builder = builder.output(output);
        }
        for init in &self.initializers {
            builder = builder.initializer(init);
        }
        for node in &self.nodes {
            builder = builder.node(
                Node::new(&node.name, &node.op_type, &node.provider)
                    .with_inputs(node.inputs.clone())
                    .with_implicit_inputs(node.implicit_inputs.clone())
                    .with_outputs(node.outputs.clone()),
            );
        }
        builder.build()
    }

    /// Builds the per-node kernel map from the per-op-type kernel table.
    /// Nodes of an op type with no entry get contract-free kernels.
    pub fn build_kernel_map(&self, graph: &Graph) -> KernelInfoMap {
        let mut by_op: HashMap<&str, Arc<KernelDef>> = HashMap::new();
        for (op, def) in &self.kernels {
            by_op.insert(op.as_str(), Arc::new(def.clone()));
        }
        let empty = Arc::new(KernelDef::new());

        let mut map = KernelInfoMap::new();
        for node in graph.nodes_in_topological_order() {
            let def = by_op
                .get(node.op_type.as_str())
                .cloned()
                .unwrap_or_else(|| Arc::clone(&empty));
            map.insert(node.index, def);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "name": "two_stage",
            "providers": [
                { "name": "CpuExecutionProvider", "device": "cpu" },
                { "name": "GpuExecutionProvider", "device": "gpu" }
            ],
            "inputs": ["x"],
            "outputs": ["out"],
            "initializers": ["w0"],
            "values": [
                { "name": "x", "elem": "f32", "shape": [1, 16] },
                { "name": "w0", "elem": "f32", "shape": [16, 16] },
                { "name": "h0", "elem": "f32", "shape": [1, 16] },
                { "name": "out", "elem": "f32", "shape": [1, 16] }
            ],
            "nodes": [
                {
                    "name": "mm0", "op_type": "MatMul",
                    "provider": "GpuExecutionProvider",
                    "inputs": ["x", "w0"], "outputs": ["h0"]
                },
                {
                    "name": "relu0", "op_type": "Relu",
                    "provider": "CpuExecutionProvider",
                    "inputs": ["h0"], "outputs": ["out"]
                }
            ],
            "kernels": {
                "Relu": { "may_inplace": [[0, 0]] }
            }
        }"#
    }

    #[test]
    fn test_parse_and_validate() {
        let m = GraphManifest::from_json(sample_json()).unwrap();
        m.validate().unwrap();
        assert_eq!(m.name, "two_stage");
        assert_eq!(m.nodes.len(), 2);
    }

    #[test]
    fn test_build_graph() {
        let m = GraphManifest::from_json(sample_json()).unwrap();
        let g = m.build_graph().unwrap();
        assert_eq!(g.num_nodes(), 2);
        assert!(g.is_initializer("w0"));
        assert!(g.is_output("out"));
        assert_eq!(g.producer("h0"), Some(0));
        assert_eq!(
            g.value_def("x").unwrap().shape.as_ref().unwrap(),
            &Shape::fixed(&[1, 16]),
        );
    }

    #[test]
    fn test_build_providers() {
        let m = GraphManifest::from_json(sample_json()).unwrap();
        let registry = m.build_providers().unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.cpu().is_ok());
    }

    #[test]
    fn test_build_kernel_map() {
        let m = GraphManifest::from_json(sample_json()).unwrap();
        let g = m.build_graph().unwrap();
        let kernels = m.build_kernel_map(&g);
        // Relu gets the in-place contract; MatMul gets an empty kernel.
        assert_eq!(kernels[&1].may_inplace, vec![(0, 0)]);
        assert!(kernels[&0].may_inplace.is_empty());
    }

    #[test]
    fn test_undeclared_provider_rejected() {
        let json = r#"{
            "name": "bad",
            "providers": [{ "name": "CpuExecutionProvider", "device": "cpu" }],
            "nodes": [
                { "op_type": "Relu", "provider": "Mystery", "inputs": ["x"], "outputs": ["y"] }
            ]
        }"#;
        let m = GraphManifest::from_json(json).unwrap();
        assert!(matches!(m.validate(), Err(GraphError::InvalidNode { .. })));
    }

    #[test]
    fn test_symbolic_shape_in_manifest() {
        let json = r#"{
            "name": "sym",
            "providers": [{ "name": "CpuExecutionProvider", "device": "cpu" }],
            "values": [{ "name": "x", "elem": "f32", "shape": ["batch", 768] }],
            "nodes": [
                { "op_type": "Relu", "provider": "CpuExecutionProvider", "inputs": ["x"], "outputs": ["y"] }
            ]
        }"#;
        let m = GraphManifest::from_json(json).unwrap();
        let shape = m.values[0].shape.clone().unwrap();
        assert_eq!(shape.num_elements(), None);
        assert_eq!(shape.rank(), 2);
    }

    #[test]
    fn test_serde_roundtrip() {
        let m = GraphManifest::from_json(sample_json()).unwrap();
        let json = serde_json::to_string_pretty(&m).unwrap();
        let back = GraphManifest::from_json(&json).unwrap();
        assert_eq!(back.name, m.name);
        assert_eq!(back.nodes.len(), m.nodes.len());
    }
}
