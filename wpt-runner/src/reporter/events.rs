// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events for the test reporter.
//!
//! These types form the interface between the runners and the reporters. Events are produced by
//! a [`ManagerGroup`](crate::runner::ManagerGroup) and consumed by a
//! [`TestReporter`](crate::reporter::TestReporter) or any other callback.

use crate::{
    list::{AssertionCountRange, Test},
    results::{HarnessStatus, SubtestResult},
    runner::ManagerStateKind,
    signal::ShutdownEvent,
    worker::LogLevel,
};
use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};
use std::{fmt, sync::Arc, time::Duration};
use wpt_metadata::{Status, TestType, WptExitCode};

/// Identifies one runner within a [`ManagerGroup`](crate::runner::ManagerGroup).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ManagerId(usize);

impl ManagerId {
    /// Creates a new manager ID.
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the index of this manager within its group.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runner-{}", self.0)
    }
}

impl Serialize for ManagerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A runner event.
#[derive(Clone, Debug)]
pub struct RunnerEvent {
    /// The time at which the event was generated, including the offset from UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the start of the run.
    pub elapsed: Duration,

    /// The kind of event this is.
    pub kind: RunnerEventKind,
}

/// The kind of runner event this is.
///
/// Forms part of [`RunnerEvent`].
#[derive(Clone, Debug)]
pub enum RunnerEventKind {
    /// Tests of one type started running.
    RunStarted {
        /// The type of test being run.
        test_type: TestType,

        /// The number of tests that will be dispatched, not counting disabled ones.
        test_count: usize,

        /// The number of runners started.
        runner_count: usize,
    },

    /// A disabled test was skipped.
    TestSkipped {
        /// The test.
        test: Arc<Test>,

        /// Why the test is disabled.
        reason: String,
    },

    /// A runner moved to a new state.
    ManagerStateChanged {
        /// The runner.
        manager: ManagerId,

        /// The state entered.
        state: ManagerStateKind,
    },

    /// A test was dispatched to a worker.
    TestStarted {
        /// The runner.
        manager: ManagerId,

        /// The test.
        test: Arc<Test>,

        /// Which run of the test this is, starting from 1.
        attempt: usize,
    },

    /// A subtest result was reported.
    SubtestFinished {
        /// The runner.
        manager: ManagerId,

        /// The test the subtest belongs to.
        test: Arc<Test>,

        /// The result.
        result: SubtestResult,

        /// The expected status.
        expected: Status,

        /// Whether the result is unexpected.
        unexpected: bool,
    },

    /// A test reported an assertion count, and the test has an allowed range.
    AssertionCount {
        /// The runner.
        manager: ManagerId,

        /// The test.
        test: Arc<Test>,

        /// The number of assertions hit.
        count: u32,

        /// The allowed range.
        range: AssertionCountRange,
    },

    /// A test finished.
    TestFinished {
        /// The runner.
        manager: ManagerId,

        /// The test.
        test: Arc<Test>,

        /// The public status of the test.
        status: Status,

        /// The status as produced by the harness, before pseudo-statuses were mapped.
        harness_status: HarnessStatus,

        /// The expected status.
        expected: Status,

        /// The message attached to the result, if any.
        message: Option<String>,

        /// The stack attached to the result, if any.
        stack: Option<String>,

        /// Whether the status of the test itself is unexpected.
        unexpected: bool,

        /// The number of subtests with unexpected results.
        subtests_unexpected: usize,

        /// How long the test took, from dispatch to result.
        duration: Duration,
    },

    /// A runner hit a condition it can't recover from.
    ManagerCritical {
        /// The runner.
        manager: ManagerId,

        /// A description of what happened.
        message: String,
    },

    /// A worker sent a log message.
    WorkerLog {
        /// The runner the worker belongs to.
        manager: ManagerId,

        /// The level of the message.
        level: LogLevel,

        /// The message.
        message: String,
    },

    /// A cancellation notice was received.
    RunBeginCancel {
        /// The reason for cancelling the run.
        reason: CancelReason,
    },

    /// Every runner for this test type has exited.
    RunFinished {
        /// The type of test that was run.
        test_type: TestType,

        /// Statistics for the run.
        stats: RunStats,
    },
}

/// The reason a run was cancelled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CancelReason {
    /// A shutdown signal was received.
    Signal(ShutdownEvent),

    /// [`StopHandle::stop`](crate::runner::StopHandle::stop) was called.
    StopRequested,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(event) => write!(f, "received {event}"),
            Self::StopRequested => write!(f, "stop requested"),
        }
    }
}

/// Statistics for a run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The number of test executions expected at the beginning of the run: every enabled test,
    /// times the number of reruns.
    ///
    /// If the run is cancelled or a runner gives up, this will be more than `finished_count`.
    pub initial_run_count: usize,

    /// The number of test executions that finished.
    pub finished_count: usize,

    /// The number of executions whose status and subtests all matched expectations.
    pub expected: usize,

    /// The number of executions with an unexpected status or at least one unexpected subtest.
    pub unexpected: usize,

    /// The number of unexpected subtest results.
    pub subtests_unexpected: usize,

    /// The number of disabled tests that were skipped.
    pub skipped: usize,

    /// The number of executions that ended with the browser crashing.
    pub crashed: usize,

    /// The number of executions that timed out.
    pub timed_out: usize,

    /// The number of runners that gave up after too many initialization failures.
    pub runner_errors: usize,

    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * the run was cancelled
    /// * a runner gave up, or fewer tests finished than were scheduled
    /// * any test produced an unexpected result
    pub fn is_success(&self) -> bool {
        !self.cancelled
            && self.runner_errors == 0
            && self.finished_count >= self.initial_run_count
            && !self.any_unexpected()
    }

    /// Returns true if any test produced an unexpected result.
    #[inline]
    pub fn any_unexpected(&self) -> bool {
        self.unexpected > 0
    }

    /// Returns the exit code for a run that ended with these statistics.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            WptExitCode::RUN_CANCELLED
        } else if self.runner_errors > 0 || self.finished_count < self.initial_run_count {
            WptExitCode::HARNESS_ERROR
        } else if self.any_unexpected() {
            WptExitCode::UNEXPECTED_RESULTS
        } else if self.finished_count == 0 {
            WptExitCode::NO_TESTS_RUN
        } else {
            WptExitCode::OK
        }
    }

    /// Adds the statistics of another run into this one.
    pub fn merge(&mut self, other: &RunStats) {
        self.initial_run_count += other.initial_run_count;
        self.finished_count += other.finished_count;
        self.expected += other.expected;
        self.unexpected += other.unexpected;
        self.subtests_unexpected += other.subtests_unexpected;
        self.skipped += other.skipped;
        self.crashed += other.crashed;
        self.timed_out += other.timed_out;
        self.runner_errors += other.runner_errors;
        self.cancelled |= other.cancelled;
    }

    pub(crate) fn on_event(&mut self, kind: &RunnerEventKind) {
        match kind {
            RunnerEventKind::TestSkipped { .. } => self.skipped += 1,
            RunnerEventKind::TestFinished {
                status,
                unexpected,
                subtests_unexpected,
                ..
            } => {
                self.finished_count += 1;
                if *unexpected || *subtests_unexpected > 0 {
                    self.unexpected += 1;
                } else {
                    self.expected += 1;
                }
                self.subtests_unexpected += subtests_unexpected;
                match status {
                    Status::Crash => self.crashed += 1,
                    Status::Timeout => self.timed_out += 1,
                    _ => {}
                }
            }
            RunnerEventKind::ManagerStateChanged {
                state: ManagerStateKind::Error,
                ..
            } => self.runner_errors += 1,
            RunnerEventKind::RunBeginCancel { .. } => self.cancelled = true,
            RunnerEventKind::RunStarted { .. }
            | RunnerEventKind::ManagerStateChanged { .. }
            | RunnerEventKind::TestStarted { .. }
            | RunnerEventKind::SubtestFinished { .. }
            | RunnerEventKind::AssertionCount { .. }
            | RunnerEventKind::ManagerCritical { .. }
            | RunnerEventKind::WorkerLog { .. }
            | RunnerEventKind::RunFinished { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(
        RunStats { initial_run_count: 2, finished_count: 2, expected: 2, ..Default::default() },
        WptExitCode::OK

        ; "all expected"
    )]
    #[test_case(
        RunStats { initial_run_count: 2, finished_count: 2, expected: 1, unexpected: 1, ..Default::default() },
        WptExitCode::UNEXPECTED_RESULTS

        ; "unexpected"
    )]
    #[test_case(
        RunStats { initial_run_count: 2, finished_count: 0, runner_errors: 1, ..Default::default() },
        WptExitCode::HARNESS_ERROR

        ; "runner error"
    )]
    #[test_case(
        RunStats { initial_run_count: 2, finished_count: 1, unexpected: 1, cancelled: true, ..Default::default() },
        WptExitCode::RUN_CANCELLED

        ; "cancelled"
    )]
    #[test_case(
        RunStats { skipped: 3, ..Default::default() },
        WptExitCode::NO_TESTS_RUN

        ; "only skipped"
    )]
    fn exit_codes(stats: RunStats, expected: i32) {
        assert_eq!(stats.exit_code(), expected);
        assert_eq!(stats.is_success(), expected == WptExitCode::OK);
    }

    #[test]
    fn merge_adds_counts() {
        let mut total = RunStats {
            initial_run_count: 1,
            finished_count: 1,
            expected: 1,
            ..Default::default()
        };
        total.merge(&RunStats {
            initial_run_count: 2,
            finished_count: 2,
            unexpected: 1,
            crashed: 1,
            expected: 1,
            ..Default::default()
        });
        assert_eq!(total.initial_run_count, 3);
        assert_eq!(total.expected, 2);
        assert_eq!(total.unexpected, 1);
        assert_eq!(total.crashed, 1);
        assert!(!total.is_success());
    }
}
