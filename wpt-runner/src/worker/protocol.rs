// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Executor, ExecutorContext, ExecutorFactory};
use crate::{
    browser::ExecutorBrowser,
    errors::{DisplayErrorChain, ExecutorError, WorkerSendError},
    list::{GroupMetadata, Test},
    results::TestOutcome,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use wpt_metadata::TestType;

/// A command sent from a runner to its worker.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Creates an executor for the test type and connects it to the browser.
    ///
    /// Answered with `init_succeeded` or `init_failed`.
    Setup {
        /// The type of tests that will be run.
        test_type: TestType,

        /// How to reach the browser.
        browser: ExecutorBrowser,

        /// The factory applied to test timeouts.
        timeout_multiplier: f64,

        /// Metadata for the group being run.
        group_metadata: GroupMetadata,
    },

    /// Runs a single test. Answered with `test_ended`.
    RunTest {
        /// The test to run.
        test: Test,
    },

    /// Waits for the browser to be closed by the user. Answered with `wait_finished`.
    Wait,

    /// Tears down the executor and exits. Not answered.
    Stop,
}

/// A message sent from a worker to its runner.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// The executor was set up.
    InitSucceeded,

    /// The executor could not be set up.
    InitFailed {
        /// A description of the failure.
        message: String,
    },

    /// A test finished.
    TestEnded {
        /// The ID of the test.
        test_id: String,

        /// The result.
        outcome: TestOutcome,
    },

    /// A `wait` command completed.
    WaitFinished,

    /// The worker hit an error outside of a test.
    Error {
        /// A description of the error.
        message: String,
    },

    /// A log message to forward to the reporter.
    Log {
        /// The level of the message.
        level: LogLevel,

        /// The message.
        message: String,
    },
}

/// The level of a [`WorkerMessage::Log`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// An error.
    Error,

    /// A warning.
    Warning,

    /// Informational.
    Info,

    /// Debug output.
    Debug,
}

impl LogLevel {
    /// Returns the mozlog name of this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The worker's end of a command/message channel.
pub trait WorkerTransport {
    /// Blocks until the next command arrives. Returns `None` once the runner has gone away.
    fn recv(&mut self) -> Option<WorkerCommand>;

    /// Sends a message to the runner.
    fn send(&mut self, message: WorkerMessage) -> Result<(), WorkerSendError>;
}

/// Runs the worker loop until a `stop` command arrives or the runner goes away.
///
/// Each command is answered with exactly one message, except `stop`. Errors from the executor are
/// turned into messages: they never end the loop.
pub fn run_worker(factory: &dyn ExecutorFactory, transport: &mut dyn WorkerTransport) {
    let mut executor: Option<Box<dyn Executor>> = None;

    while let Some(command) = transport.recv() {
        let message = match command {
            WorkerCommand::Setup {
                test_type,
                browser,
                timeout_multiplier,
                group_metadata,
            } => {
                if let Some(mut old) = executor.take() {
                    old.teardown();
                }
                let context = ExecutorContext {
                    test_type,
                    timeout_multiplier,
                    group_metadata,
                };
                match setup_executor(factory, &browser, &context) {
                    Ok(new) => {
                        executor = Some(new);
                        WorkerMessage::InitSucceeded
                    }
                    Err(error) => WorkerMessage::InitFailed {
                        message: DisplayErrorChain::new(error).to_string(),
                    },
                }
            }
            WorkerCommand::RunTest { test } => {
                debug!(test_id = %test.id, "running test");
                let outcome = match executor.as_mut() {
                    Some(executor) => executor.run_test(&test).unwrap_or_else(|error| {
                        TestOutcome::internal_error(DisplayErrorChain::new(error).to_string())
                    }),
                    None => TestOutcome::internal_error(ExecutorError::NotSetUp.to_string()),
                };
                WorkerMessage::TestEnded {
                    test_id: test.id,
                    outcome,
                }
            }
            WorkerCommand::Wait => {
                if let Some(Err(error)) = executor.as_mut().map(|executor| executor.wait()) {
                    let message = WorkerMessage::Log {
                        level: LogLevel::Error,
                        message: DisplayErrorChain::new(error).to_string(),
                    };
                    if transport.send(message).is_err() {
                        break;
                    }
                }
                WorkerMessage::WaitFinished
            }
            WorkerCommand::Stop => break,
        };

        if transport.send(message).is_err() {
            break;
        }
    }

    if let Some(mut executor) = executor {
        executor.teardown();
    }
}

fn setup_executor(
    factory: &dyn ExecutorFactory,
    browser: &ExecutorBrowser,
    context: &ExecutorContext,
) -> Result<Box<dyn Executor>, ExecutorError> {
    let mut executor = factory.create(context.test_type)?;
    executor.setup(browser, context)?;
    Ok(executor)
}
