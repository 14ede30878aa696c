// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # stream-executor
//!
//! Executes a [`exec_planner::SequentialExecutionPlan`] under the
//! parallel-streams, cooperative-within-stream model:
//!
//! - Each logical stream is a FIFO of steps run by one worker thread;
//!   steps within a stream are sequential, streams run in parallel.
//! - Barriers suspend a stream until their counter reaches zero; device
//!   waits block on the handle the provider pair registered.
//! - Cross-stream happens-before is established exclusively by
//!   `ActivateNotification` → matching `Barrier`(+`Wait`) pairs, which the
//!   planner guarantees exist for every cross-stream graph edge.
//! - Cancellation is a single terminate flag; streams observe it at their
//!   next kernel launch.
//!
//! Kernels themselves are supplied by the embedding runtime through the
//! [`KernelRunner`] seam.
//!
//! # Example
//! ```no_run
//! use stream_executor::{run_plan, KernelRunner};
//! # struct NoopRunner;
//! # impl KernelRunner for NoopRunner {
//! #     fn run(&self, _: usize, _: usize) -> Result<(), stream_executor::ExecError> { Ok(()) }
//! # }
//! # fn demo(plan: &exec_planner::SequentialExecutionPlan) {
//! let released = run_plan(plan, &NoopRunner).unwrap();
//! println!("released {} buffers", released.len());
//! # }
//! ```

mod context;
mod error;
mod executor;

pub use context::{ExecutionContext, KernelRunner};
pub use error::ExecError;
pub use executor::{run_plan, run_streams};
