// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-stream workers.
//!
//! Each logical stream gets one worker thread running its steps in the
//! emitted order. A barrier whose counter has not reached zero suspends
//! the worker until a downstream trigger reschedules that step. A failure
//! on any stream requests termination; the other streams observe it at
//! their next kernel launch or while suspended.

use crate::{ExecError, ExecutionContext, KernelRunner};
use exec_planner::SequentialExecutionPlan;

/// Executes every stream of `plan` to completion.
///
/// Returns the released-buffer order on success, or the first failure
/// observed across streams.
pub fn run_plan(
    plan: &SequentialExecutionPlan,
    runner: &dyn KernelRunner,
) -> Result<Vec<graph_ir::ValueIndex>, ExecError> {
    let context = ExecutionContext::new(plan, runner);
    run_streams(&context)?;
    Ok(context.released_values())
}

/// Executes every stream of `plan` under a caller-provided context, so
/// callers can cancel mid-run or inspect state afterwards.
pub fn run_streams(context: &ExecutionContext<'_>) -> Result<(), ExecError> {
    let num_streams = context.plan().num_streams();
    if num_streams == 0 {
        return Ok(());
    }

    let results: Vec<Result<(), ExecError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..num_streams)
            .map(|stream_idx| {
                scope.spawn(move || {
                    let result = run_stream(context, stream_idx);
                    if let Err(ref e) = result {
                        // Fail fast: park no stream forever on a barrier
                        // whose producer will never arrive.
                        if !matches!(e, ExecError::Terminated) {
                            tracing::warn!("stream {stream_idx} failed: {e}");
                        }
                        context.request_termination();
                    }
                    result
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("stream worker panicked"))
            .collect()
    });

    // Report the root cause in preference to secondary terminations.
    let mut first_termination = None;
    for result in results {
        match result {
            Ok(()) => {}
            Err(ExecError::Terminated) => first_termination = Some(ExecError::Terminated),
            Err(e) => return Err(e),
        }
    }
    match first_termination {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Runs one stream's steps in order, suspending on unfired barriers.
fn run_stream(context: &ExecutionContext<'_>, stream_idx: usize) -> Result<(), ExecError> {
    let steps = &context.plan().execution_plan[stream_idx].steps;
    let mut pos = 0;
    while pos < steps.len() {
        let step = &steps[pos];
        tracing::trace!("stream {stream_idx} step {pos}: {}", step.dump());
        if context.execute_step(stream_idx, step)? {
            pos += 1;
        } else {
            // Barrier not ready: suspend until the producer's trigger
            // reschedules this step, then re-execute it.
            context.wait_for_resume(stream_idx, pos)?;
        }
    }
    Ok(())
}
