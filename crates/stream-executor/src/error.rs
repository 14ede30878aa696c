// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for plan execution.

/// Errors that can occur while executing a plan.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecError {
    /// The terminate flag was observed before a kernel launch.
    #[error("exiting due to terminate flag being set")]
    Terminated,

    /// A kernel returned a failure.
    #[error("kernel for node {node} failed: {detail}")]
    Kernel { node: usize, detail: String },

    /// The executor's bookkeeping broke an invariant (bad barrier id,
    /// notification index out of range).
    #[error("executor inconsistency: {0}")]
    Inconsistency(String),
}
