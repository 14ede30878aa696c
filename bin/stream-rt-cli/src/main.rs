// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # stream-rt
//!
//! Command-line interface for the stream-rt execution planner.
//!
//! ## Usage
//! ```bash
//! # Inspect a graph manifest
//! stream-rt inspect --graph ./graphs/two_stage.json
//!
//! # Plan the graph and dump the schedule
//! stream-rt plan --graph ./graphs/two_stage.json
//!
//! # Pin the stream partition through a configuration file
//! stream-rt plan --graph ./graphs/two_stage.json --partition-config ./partition.cfg
//! ```

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "stream-rt",
    about = "Reuse-aware multi-stream execution planner",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a graph manifest: nodes, providers, and value shapes.
    Inspect {
        /// Path to the graph manifest (JSON).
        #[arg(short, long)]
        graph: std::path::PathBuf,
    },

    /// Build the execution plan for a graph manifest and dump it.
    Plan {
        /// Path to the graph manifest (JSON).
        #[arg(short, long)]
        graph: std::path::PathBuf,

        /// Partition configuration file. Missing file: the derived
        /// partition is written back to this path.
        #[arg(short, long)]
        partition_config: Option<std::path::PathBuf>,

        /// Disable free-list buffer reuse.
        #[arg(long, default_value_t = false)]
        no_reuse: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Inspect { graph } => commands::inspect::execute(graph),
        Commands::Plan {
            graph,
            partition_config,
            no_reuse,
        } => commands::plan::execute(graph, partition_config, no_reuse),
    }
}
