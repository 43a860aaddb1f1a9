// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    browser::ExecutorBrowser,
    errors::ExecutorError,
    helpers::{display_exit_status, format_duration, terminated_by_signal},
    list::{GroupMetadata, Test},
    results::TestOutcome,
};
use duct::cmd;
use std::{
    fmt,
    process::Output,
    time::{Duration, Instant},
};
use tracing::debug;
use wpt_metadata::{Status, TestType};

/// Information passed to an [`Executor`] when it's set up.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutorContext {
    /// The type of tests the executor will run.
    pub test_type: TestType,

    /// The factor applied to test timeouts.
    pub timeout_multiplier: f64,

    /// Metadata for the group being run.
    pub group_metadata: GroupMetadata,
}

/// Runs tests inside a worker.
///
/// An executor is created for one test type and lives until the worker is stopped or set up again.
pub trait Executor: Send {
    /// Connects to the browser.
    fn setup(
        &mut self,
        browser: &ExecutorBrowser,
        context: &ExecutorContext,
    ) -> Result<(), ExecutorError>;

    /// Runs a single test.
    ///
    /// An error is reported as an `INTERNAL-ERROR` result.
    fn run_test(&mut self, test: &Test) -> Result<TestOutcome, ExecutorError>;

    /// Blocks until the user is done with the browser.
    fn wait(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Releases resources. Called once before the executor is dropped.
    fn teardown(&mut self) {}
}

/// Creates executors for a product.
pub trait ExecutorFactory: Send + Sync + fmt::Debug {
    /// Creates an executor for tests of the given type.
    fn create(&self, test_type: TestType) -> Result<Box<dyn Executor>, ExecutorError>;
}

/// Creates [`CommandExecutor`]s.
#[derive(Clone, Debug)]
pub struct CommandExecutorFactory {
    command: Vec<String>,
    base_url: String,
}

impl CommandExecutorFactory {
    /// Creates a factory for executors running `command` once per test.
    ///
    /// See [`CommandExecutor`] for the placeholders `command` may contain.
    pub fn new(command: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            command,
            base_url: base_url.into(),
        }
    }
}

impl ExecutorFactory for CommandExecutorFactory {
    fn create(&self, test_type: TestType) -> Result<Box<dyn Executor>, ExecutorError> {
        if self.command.is_empty() {
            return Err(ExecutorError::other("no executor command configured"));
        }
        Ok(Box::new(CommandExecutor {
            command: self.command.clone(),
            base_url: self.base_url.clone(),
            test_type,
            timeout_multiplier: 1.0,
            browser: None,
        }))
    }
}

/// Runs a command once per test.
///
/// Each argument of the command may contain these placeholders:
///
/// * `{url}`: the base URL joined with the test ID
/// * `{test_id}`: the test ID
/// * `{test_type}`: the test type, e.g. `testharness`
/// * `{timeout}`: the scaled timeout in seconds
///
/// If the last non-empty line the command prints to stdout is a JSON-encoded [`TestOutcome`], that
/// is the result of the test. Otherwise the result is derived from how the command exited.
#[derive(Debug)]
pub struct CommandExecutor {
    command: Vec<String>,
    base_url: String,
    test_type: TestType,
    timeout_multiplier: f64,
    browser: Option<ExecutorBrowser>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl CommandExecutor {
    fn url(&self, test: &Test) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), test.id)
    }

    fn expand_args(&self, test: &Test, timeout: Duration) -> Vec<String> {
        let url = self.url(test);
        let timeout = timeout.as_secs_f64().to_string();
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{url}", &url)
                    .replace("{test_id}", &test.id)
                    .replace("{test_type}", test.test_type.as_str())
                    .replace("{timeout}", &timeout)
            })
            .collect()
    }

    fn outcome_from_output(&self, output: &Output) -> TestOutcome {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if let Some(line) = stdout.lines().rev().find(|line| !line.trim().is_empty()) {
            if let Ok(outcome) = serde_json::from_str::<TestOutcome>(line) {
                return outcome;
            }
        }

        let has_subtests = self.test_type.has_subtests();
        if output.status.success() {
            let status = if has_subtests { Status::Ok } else { Status::Pass };
            return TestOutcome::new(status);
        }

        let status = if terminated_by_signal(output.status) {
            Status::Crash
        } else if has_subtests {
            Status::Error
        } else {
            Status::Fail
        };
        TestOutcome::new(status).with_message(format!(
            "command exited with {}",
            display_exit_status(output.status)
        ))
    }
}

impl Executor for CommandExecutor {
    fn setup(
        &mut self,
        browser: &ExecutorBrowser,
        context: &ExecutorContext,
    ) -> Result<(), ExecutorError> {
        if context.test_type != self.test_type {
            return Err(ExecutorError::UnsupportedTestType {
                test_type: context.test_type,
            });
        }
        self.timeout_multiplier = context.timeout_multiplier;
        self.browser = Some(browser.clone());
        Ok(())
    }

    fn run_test(&mut self, test: &Test) -> Result<TestOutcome, ExecutorError> {
        let browser = self.browser.as_ref().ok_or(ExecutorError::NotSetUp)?;
        let timeout = test.timeout_with_multiplier(self.timeout_multiplier);
        let args = self.expand_args(test, timeout);
        let (program, args) = args
            .split_first()
            .ok_or_else(|| ExecutorError::other("no executor command configured"))?;

        let mut expression = cmd(program.as_str(), args)
            .env("WPTRUNNER_BROWSER_KIND", &browser.kind)
            .stdin_null()
            .stdout_capture()
            .unchecked();
        if let Some(pid) = browser.pid {
            expression = expression.env("WPTRUNNER_BROWSER_PID", pid.to_string());
        }

        debug!(test_id = %test.id, %program, ?args, "running test command");
        let start = Instant::now();
        let handle = expression.start().map_err(|error| ExecutorError::Spawn {
            program: program.clone(),
            error,
        })?;

        loop {
            let wait_error = |error| ExecutorError::Wait {
                program: program.clone(),
                error,
            };
            if let Some(output) = handle.try_wait().map_err(wait_error)? {
                return Ok(self.outcome_from_output(output));
            }
            if start.elapsed() >= timeout {
                handle.kill().map_err(wait_error)?;
                return Ok(TestOutcome::new(Status::Timeout).with_message(format!(
                    "test did not finish within {}",
                    format_duration(timeout)
                )));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn teardown(&mut self) {
        self.browser = None;
    }
}
