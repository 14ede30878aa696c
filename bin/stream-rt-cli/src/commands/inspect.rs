// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `stream-rt inspect` command: display a graph manifest's structure.

use graph_ir::GraphManifest;
use std::path::PathBuf;

pub fn execute(graph_path: PathBuf) -> anyhow::Result<()> {
    let manifest = GraphManifest::from_file(&graph_path).map_err(|e| {
        anyhow::anyhow!("failed to load graph from '{}': {e}", graph_path.display())
    })?;
    let graph = manifest.build_graph()?;

    println!("{}", graph.summary());
    println!();

    println!("  Providers:");
    for p in &manifest.providers {
        println!("    {} ({}:{})", p.name, p.device.as_str(), p.device_id);
    }
    println!();

    println!(
        "  {:<4} {:<20} {:<14} {:<24} {:<6}",
        "Idx", "Name", "Op", "Provider", "Outs",
    );
    println!("  {}", "-".repeat(72));
    for node in graph.nodes_in_topological_order() {
        let display = if node.name.is_empty() { "<unnamed>" } else { node.name.as_str() };
        println!(
            "  {:<4} {:<20} {:<14} {:<24} {:<6}",
            node.index,
            super::truncate(display, 20),
            super::truncate(&node.op_type, 14),
            super::truncate(&node.provider, 24),
            node.outputs.len(),
        );
    }
    println!();

    println!("  Values:");
    for value in &manifest.values {
        let shape = value
            .shape
            .as_ref()
            .map(|s| format!("{s}"))
            .unwrap_or_else(|| "[?]".into());
        println!("    {:<24} {:?} {shape}", value.name, value.elem);
    }

    Ok(())
}
