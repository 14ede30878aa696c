// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The shared execution context and the step machine.
//!
//! One [`ExecutionContext`] is shared by every stream worker. Barrier
//! counters and notifications are updated atomically or under locks;
//! stream-local state (device stream, resume queue) is single-writer from
//! the owning worker, with the resume queue additionally fed by
//! `TriggerDownstream` steps running on producer streams.

use crate::ExecError;
use device_registry::{DeviceStream, NotificationState};
use exec_planner::{ExecutionStep, SequentialExecutionPlan};
use graph_ir::{NodeIndex, ValueIndex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Initial value of every barrier counter: the producer's trigger and the
/// consumer stream's arrival each decrement once.
const BARRIER_COUNT: usize = 2;

/// How long a suspended stream sleeps between checks of the terminate
/// flag while waiting on a barrier.
const RESUME_POLL: Duration = Duration::from_millis(50);

/// The kernel-execution seam: the embedding runtime supplies the actual
/// compute; the executor only schedules it.
pub trait KernelRunner: Send + Sync {
    /// Executes the kernel bound to `node` on logical stream `stream_idx`.
    fn run(&self, node: NodeIndex, stream_idx: usize) -> Result<(), ExecError>;
}

/// Per-stream runtime state.
struct StreamState {
    /// The device-level queue and its logical clock.
    device: Mutex<DeviceStream>,
    /// Step indices rescheduled by downstream triggers.
    resume: Mutex<VecDeque<usize>>,
    resume_cv: Condvar,
}

/// Shared state of one plan execution.
pub struct ExecutionContext<'a> {
    plan: &'a SequentialExecutionPlan,
    runner: &'a dyn KernelRunner,
    barriers: Vec<AtomicUsize>,
    notifications: Vec<Mutex<NotificationState>>,
    streams: Vec<StreamState>,
    /// Remaining completions per release action.
    release_counts: Vec<AtomicUsize>,
    /// Root values whose buffers have been released, in release order.
    released: Mutex<Vec<ValueIndex>>,
    terminate: AtomicBool,
}

impl<'a> ExecutionContext<'a> {
    /// Builds the runtime state for one execution of `plan`.
    pub fn new(plan: &'a SequentialExecutionPlan, runner: &'a dyn KernelRunner) -> Self {
        let streams = plan
            .execution_plan
            .iter()
            .map(|stream| StreamState {
                device: Mutex::new(DeviceStream::new(
                    stream.provider.clone().unwrap_or_default(),
                )),
                resume: Mutex::new(VecDeque::new()),
                resume_cv: Condvar::new(),
            })
            .collect();

        Self {
            plan,
            runner,
            barriers: (0..plan.num_barriers)
                .map(|_| AtomicUsize::new(BARRIER_COUNT))
                .collect(),
            notifications: (0..plan.num_notifications())
                .map(|_| Mutex::new(NotificationState::default()))
                .collect(),
            streams,
            release_counts: plan
                .release_actions
                .iter()
                .map(|a| AtomicUsize::new(a.ref_count))
                .collect(),
            released: Mutex::new(Vec::new()),
            terminate: AtomicBool::new(false),
        }
    }

    /// The plan being executed.
    pub fn plan(&self) -> &SequentialExecutionPlan {
        self.plan
    }

    /// Requests cooperative cancellation: every stream stops at its next
    /// kernel launch.
    pub fn request_termination(&self) {
        self.terminate.store(true, Ordering::Release);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Root values released so far, in release order.
    pub fn released_values(&self) -> Vec<ValueIndex> {
        self.released.lock().expect("released lock").clone()
    }

    /// Executes one step on behalf of `stream_idx`, returning the
    /// continue flag: `false` suspends the stream until the step is
    /// rescheduled.
    pub fn execute_step(
        &self,
        stream_idx: usize,
        step: &ExecutionStep,
    ) -> Result<bool, ExecError> {
        match step {
            ExecutionStep::Barrier { barrier_id } => {
                let remaining = self.decrement_barrier(*barrier_id)?;
                Ok(remaining == 0)
            }
            ExecutionStep::WaitOnDevice {
                handle,
                notification,
            } => {
                let notif = self
                    .notification(*notification)?
                    .lock()
                    .expect("notification lock")
                    .clone();
                let mut device = self.streams[stream_idx].device.lock().expect("device lock");
                handle(&mut device, &notif);
                device.update_clock(notif.stream_clock);
                tracing::debug!(
                    "stream {stream_idx} waited on notification {notification} (clock {})",
                    device.clock,
                );
                Ok(true)
            }
            ExecutionStep::LaunchKernel { node } => {
                if self.is_terminating() {
                    tracing::warn!("stream {stream_idx} exiting: terminate flag set");
                    return Err(ExecError::Terminated);
                }
                self.runner.run(*node, stream_idx)?;
                self.apply_release_actions(*node)?;
                Ok(true)
            }
            ExecutionStep::ActivateNotification { notification } => {
                let clock = {
                    let mut device =
                        self.streams[stream_idx].device.lock().expect("device lock");
                    device.tick()
                };
                self.notification(*notification)?
                    .lock()
                    .expect("notification lock")
                    .activate(clock);
                tracing::debug!(
                    "stream {stream_idx} activated notification {notification} at clock {clock}",
                );
                Ok(true)
            }
            ExecutionStep::TriggerDownstream { notification } => {
                self.schedule_downstream(*notification);
                Ok(true)
            }
        }
    }

    /// Blocks until `step_idx` is rescheduled onto `stream_idx` by a
    /// downstream trigger, or cancellation is requested.
    pub fn wait_for_resume(&self, stream_idx: usize, step_idx: usize) -> Result<(), ExecError> {
        let state = &self.streams[stream_idx];
        let mut queue = state.resume.lock().expect("resume lock");
        loop {
            if let Some(pos) = queue.iter().position(|&s| s == step_idx) {
                queue.remove(pos);
                return Ok(());
            }
            if self.is_terminating() {
                return Err(ExecError::Terminated);
            }
            let (next, _timeout) = state
                .resume_cv
                .wait_timeout(queue, RESUME_POLL)
                .expect("resume wait");
            queue = next;
        }
    }

    // ── Internals ──────────────────────────────────────────────────

    fn decrement_barrier(&self, barrier_id: usize) -> Result<usize, ExecError> {
        let counter = self.barriers.get(barrier_id).ok_or_else(|| {
            ExecError::Inconsistency(format!("barrier id {barrier_id} out of range"))
        })?;
        let previous = counter.fetch_sub(1, Ordering::AcqRel);
        if previous == 0 {
            return Err(ExecError::Inconsistency(format!(
                "barrier {barrier_id} decremented below zero",
            )));
        }
        Ok(previous - 1)
    }

    fn notification(&self, index: usize) -> Result<&Mutex<NotificationState>, ExecError> {
        self.notifications.get(index).ok_or_else(|| {
            ExecError::Inconsistency(format!("notification index {index} out of range"))
        })
    }

    /// Reschedules every barrier registered under `notification` onto its
    /// stream's resume queue.
    fn schedule_downstream(&self, notification: usize) {
        let Some(entries) = self.plan.downstream_map.get(&notification) else {
            return;
        };
        for &(stream_idx, step_idx) in entries {
            let state = &self.streams[stream_idx];
            state
                .resume
                .lock()
                .expect("resume lock")
                .push_back(step_idx);
            state.resume_cv.notify_all();
            tracing::debug!(
                "notification {notification} rescheduled stream {stream_idx} step {step_idx}",
            );
        }
    }

    /// Decrements the release actions attached to a completed node,
    /// recording buffers whose counts reached zero.
    fn apply_release_actions(&self, node: NodeIndex) -> Result<(), ExecError> {
        let Some(actions) = self.plan.node_release_list.get(node) else {
            return Ok(());
        };
        for &action_idx in actions {
            let action = self.plan.release_actions[action_idx];
            let previous = self.release_counts[action_idx].fetch_sub(1, Ordering::AcqRel);
            if previous == 0 {
                return Err(ExecError::Inconsistency(format!(
                    "release action {action_idx} decremented below zero",
                )));
            }
            if previous == 1 {
                tracing::debug!("buffer of value {} released after node {node}", action.value_index);
                self.released
                    .lock()
                    .expect("released lock")
                    .push(action.value_index);
            }
        }
        Ok(())
    }
}
