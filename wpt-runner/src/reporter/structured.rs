// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured output in the mozlog JSON lines format.
//!
//! Every entry is a single JSON object on its own line, with at least these fields:
//!
//! * `action`: one of `suite_start`, `test_start`, `test_status`, `test_end`, `assertion_count`,
//!   `log` or `suite_end`
//! * `time`: milliseconds since the Unix epoch
//! * `thread`: the runner that produced the entry, or `MainThread` for run-level entries
//! * `pid`: the process ID of the runner process
//! * `source`: always `wptrunner`
//!
//! Following mozlog, `expected` is only present when the status differs from the expected one.
//! Runner criticals are logged at the `CRITICAL` level.

use super::events::{ManagerId, RunnerEvent, RunnerEventKind};
use crate::{errors::WriteEventError, list::Test};
use serde::Serialize;
use std::{collections::BTreeMap, io::Write, sync::Arc};
use wpt_metadata::Status;

const SOURCE: &str = "wptrunner";
const MAIN_THREAD: &str = "MainThread";

/// Writes [`RunnerEvent`]s as mozlog JSON lines.
pub struct StructuredReporter<'a> {
    writer: Box<dyn Write + Send + 'a>,
    pid: u32,
    started: bool,
    last_time: i64,
}

impl<'a> StructuredReporter<'a> {
    /// Creates a new structured reporter writing to `writer`.
    pub fn new(writer: impl Write + Send + 'a) -> Self {
        Self {
            writer: Box::new(writer),
            pid: std::process::id(),
            started: false,
            last_time: 0,
        }
    }

    /// Writes the `suite_start` entry, listing every test that will be considered.
    ///
    /// If this isn't called, an entry without tests is written before the first event.
    pub fn suite_start<'t>(
        &mut self,
        tests: impl IntoIterator<Item = &'t Arc<Test>>,
    ) -> Result<(), WriteEventError> {
        let ids: Vec<&str> = tests.into_iter().map(|test| test.id.as_str()).collect();
        let time = chrono::Local::now().timestamp_millis();
        self.write_suite_start(time, &ids)
    }

    /// Writes an event.
    pub fn write_event(&mut self, event: &RunnerEvent) -> Result<(), WriteEventError> {
        let time = event.timestamp.timestamp_millis();
        if !self.started {
            self.write_suite_start(time, &[])?;
        }

        match &event.kind {
            RunnerEventKind::TestSkipped { test, reason } => {
                self.write_entry(time, None, Data::TestStart { test: &test.id })?;
                self.write_entry(
                    time,
                    None,
                    Data::TestEnd {
                        test: &test.id,
                        status: Status::Skip,
                        expected: None,
                        known_intermittent: &[],
                        message: Some(reason.as_str()),
                        stack: None,
                    },
                )?;
            }
            RunnerEventKind::TestStarted { manager, test, .. } => {
                self.write_entry(time, Some(*manager), Data::TestStart { test: &test.id })?;
            }
            RunnerEventKind::SubtestFinished {
                manager,
                test,
                result,
                expected,
                ..
            } => {
                self.write_entry(
                    time,
                    Some(*manager),
                    Data::TestStatus {
                        test: &test.id,
                        subtest: &result.name,
                        status: result.status,
                        expected: (result.status != *expected).then_some(*expected),
                        known_intermittent: test.known_intermittent(Some(&result.name)),
                        message: result.message.as_deref(),
                        stack: result.stack.as_deref(),
                    },
                )?;
            }
            RunnerEventKind::AssertionCount {
                manager,
                test,
                count,
                range,
            } => {
                self.write_entry(
                    time,
                    Some(*manager),
                    Data::AssertionCount {
                        test: &test.id,
                        count: *count,
                        min: range.min,
                        max: range.max,
                    },
                )?;
            }
            RunnerEventKind::TestFinished {
                manager,
                test,
                status,
                expected,
                message,
                stack,
                ..
            } => {
                self.write_entry(
                    time,
                    Some(*manager),
                    Data::TestEnd {
                        test: &test.id,
                        status: *status,
                        expected: (status != expected).then_some(*expected),
                        known_intermittent: test.known_intermittent(None),
                        message: message.as_deref(),
                        stack: stack.as_deref(),
                    },
                )?;
            }
            RunnerEventKind::ManagerCritical { manager, message } => {
                self.write_entry(
                    time,
                    Some(*manager),
                    Data::Log {
                        level: "CRITICAL",
                        message,
                    },
                )?;
            }
            RunnerEventKind::WorkerLog {
                manager,
                level,
                message,
            } => {
                self.write_entry(
                    time,
                    Some(*manager),
                    Data::Log {
                        level: level.as_str(),
                        message,
                    },
                )?;
            }
            RunnerEventKind::RunBeginCancel { reason } => {
                let message = format!("cancelling run: {reason}");
                self.write_entry(
                    time,
                    None,
                    Data::Log {
                        level: "WARNING",
                        message: &message,
                    },
                )?;
            }
            RunnerEventKind::RunStarted { .. }
            | RunnerEventKind::ManagerStateChanged { .. }
            | RunnerEventKind::RunFinished { .. } => {}
        }

        self.writer.flush().map_err(WriteEventError::Io)
    }

    /// Writes the `suite_end` entry and flushes the output.
    ///
    /// Does nothing if no entry was ever written.
    pub fn finish(&mut self) -> Result<(), WriteEventError> {
        if !self.started {
            return Ok(());
        }
        let time = chrono::Local::now().timestamp_millis().max(self.last_time);
        self.write_entry(time, None, Data::SuiteEnd {})?;
        self.writer.flush().map_err(WriteEventError::Io)
    }

    fn write_suite_start(&mut self, time: i64, ids: &[&str]) -> Result<(), WriteEventError> {
        let mut tests = BTreeMap::new();
        tests.insert("default", ids);
        self.started = true;
        self.write_entry(time, None, Data::SuiteStart { tests })
    }

    fn write_entry(
        &mut self,
        time: i64,
        manager: Option<ManagerId>,
        data: Data<'_>,
    ) -> Result<(), WriteEventError> {
        self.last_time = self.last_time.max(time);
        let thread = match manager {
            Some(manager) => manager.to_string(),
            None => MAIN_THREAD.to_owned(),
        };
        let entry = Entry {
            action: data.action(),
            time,
            thread: &thread,
            pid: self.pid,
            source: SOURCE,
            data,
        };
        serde_json::to_writer(&mut self.writer, &entry).map_err(WriteEventError::Json)?;
        self.writer.write_all(b"\n").map_err(WriteEventError::Io)
    }
}

#[derive(Serialize)]
struct Entry<'a> {
    action: &'static str,
    time: i64,
    thread: &'a str,
    pid: u32,
    source: &'static str,
    #[serde(flatten)]
    data: Data<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Data<'a> {
    SuiteStart {
        tests: BTreeMap<&'static str, &'a [&'a str]>,
    },
    TestStart {
        test: &'a str,
    },
    TestStatus {
        test: &'a str,
        subtest: &'a str,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<Status>,
        #[serde(skip_serializing_if = "<[_]>::is_empty")]
        known_intermittent: &'a [Status],
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<&'a str>,
    },
    TestEnd {
        test: &'a str,
        status: Status,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<Status>,
        #[serde(skip_serializing_if = "<[_]>::is_empty")]
        known_intermittent: &'a [Status],
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stack: Option<&'a str>,
    },
    AssertionCount {
        test: &'a str,
        count: u32,
        min: u32,
        max: u32,
    },
    Log {
        level: &'a str,
        message: &'a str,
    },
    SuiteEnd {},
}

impl Data<'_> {
    fn action(&self) -> &'static str {
        match self {
            Self::SuiteStart { .. } => "suite_start",
            Self::TestStart { .. } => "test_start",
            Self::TestStatus { .. } => "test_status",
            Self::TestEnd { .. } => "test_end",
            Self::AssertionCount { .. } => "assertion_count",
            Self::Log { .. } => "log",
            Self::SuiteEnd {} => "suite_end",
        }
    }
}
