// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-value allocation decisions.
//!
//! One [`ValueAllocPlan`] is produced per dense value index. Records are
//! written once during planning and are immutable afterwards; the runtime
//! allocator keys actual buffers off `location` and the lifetime records.

use device_registry::MemoryLocation;
use graph_ir::{ValueIndex, ValueType};
use std::fmt;

/// How one value's buffer is obtained at execution time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub enum AllocKind {
    /// Not yet decided (also the state of values never consumed).
    #[default]
    NotSet,
    /// A fresh buffer allocated at the value's definition step.
    Allocate,
    /// An initializer allocated once at session setup.
    AllocateStatically,
    /// A graph output allocated for hand-off to the caller.
    AllocateOutput,
    /// A buffer owned outside the runtime; never reused by anyone.
    AllocatedExternally,
    /// Reuses the buffer of an earlier value (`reused_buffer`).
    Reuse,
    /// Shares storage with a pre-existing value across scope boundaries.
    Share,
    /// Caller-owned: graph inputs and outer-scope values.
    PreExisting,
}

impl fmt::Display for AllocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AllocKind::NotSet => "NotSet",
            AllocKind::Allocate => "Allocate",
            AllocKind::AllocateStatically => "AllocateStatically",
            AllocKind::AllocateOutput => "AllocateOutput",
            AllocKind::AllocatedExternally => "AllocatedExternally",
            AllocKind::Reuse => "Reuse",
            AllocKind::Share => "Share",
            AllocKind::PreExisting => "PreExisting",
        };
        f.write_str(s)
    }
}

/// Lifetime of a buffer as (start, end) program-counter intervals.
///
/// A buffer that is freed and later revived through the free list carries
/// one interval per occupation, so the record is a multiset of intervals:
/// starts are strictly increasing past the previous end, and every closed
/// interval satisfies `start <= end`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Lifetime {
    starts: Vec<usize>,
    ends: Vec<usize>,
}

impl Lifetime {
    /// Opens a new interval at `program_counter`.
    pub fn add_start(&mut self, program_counter: usize) {
        debug_assert_eq!(self.starts.len(), self.ends.len(), "unclosed lifetime interval");
        debug_assert!(
            self.ends.last().is_none_or(|&e| e <= program_counter),
            "lifetime start before previous end",
        );
        self.starts.push(program_counter);
    }

    /// Closes the currently open interval at `program_counter`.
    pub fn add_end(&mut self, program_counter: usize) {
        debug_assert_eq!(self.starts.len(), self.ends.len() + 1, "no open lifetime interval");
        debug_assert!(
            self.starts.last().is_some_and(|&s| s <= program_counter),
            "lifetime end before start",
        );
        self.ends.push(program_counter);
    }

    /// Returns `true` when at least one interval exists and every interval
    /// is well-formed.
    pub fn has_valid_entries(&self) -> bool {
        !self.starts.is_empty()
            && self.starts.len() >= self.ends.len()
            && self
                .starts
                .iter()
                .zip(self.ends.iter())
                .all(|(&s, &e)| s <= e)
    }

    /// The recorded intervals; an unterminated final interval reports no
    /// end entry.
    pub fn intervals(&self) -> impl Iterator<Item = (usize, Option<usize>)> + '_ {
        self.starts
            .iter()
            .enumerate()
            .map(|(i, &s)| (s, self.ends.get(i).copied()))
    }
}

/// The allocation decision for one value.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ValueAllocPlan {
    /// How the buffer is obtained.
    pub alloc_kind: AllocKind,
    /// The memory space the buffer lives in, once resolved.
    pub location: Option<MemoryLocation>,
    /// For `Reuse`/`Share`: the value whose buffer is shared.
    pub reused_buffer: Option<ValueIndex>,
    /// Element type + container kind, when known.
    pub value_type: Option<ValueType>,
    /// Lifetime intervals of the underlying buffer (only maintained for
    /// buffers the runtime allocates itself).
    pub program_counter: Lifetime,
    /// The value is a strided view over `reused_buffer`'s storage.
    pub is_strided_tensor: bool,
}
