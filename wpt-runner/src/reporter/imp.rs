// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{displayer::DisplayReporter, events::RunnerEvent, structured::StructuredReporter};
use crate::{errors::WriteEventError, list::Test};
use std::{
    io::{self, Write},
    sync::Arc,
};

/// Standard error destination for the reporter.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum ReporterStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct ReporterBuilder {
    should_colorize: bool,
    verbose: bool,
}

impl ReporterBuilder {
    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets verbose output: state changes, every subtest and every worker log message are shown.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Creates a new test reporter.
    pub fn build<'a>(
        &self,
        stderr: ReporterStderr<'a>,
        structured: Option<StructuredReporter<'a>>,
    ) -> TestReporter<'a> {
        let mut display = DisplayReporter::new(self.verbose);
        if self.should_colorize {
            display.colorize();
        }
        TestReporter {
            display,
            stderr,
            structured,
        }
    }
}

/// Reports runner events to standard error and to a structured log.
pub struct TestReporter<'a> {
    display: DisplayReporter,
    stderr: ReporterStderr<'a>,
    structured: Option<StructuredReporter<'a>>,
}

impl<'a> TestReporter<'a> {
    /// Starts the structured log, listing every test that will be considered.
    pub fn suite_start<'t>(
        &mut self,
        tests: impl IntoIterator<Item = &'t Arc<Test>>,
    ) -> Result<(), WriteEventError> {
        match &mut self.structured {
            Some(structured) => structured.suite_start(tests),
            None => Ok(()),
        }
    }

    /// Reports a runner event.
    pub fn report_event(&mut self, event: &RunnerEvent) -> Result<(), WriteEventError> {
        match &mut self.stderr {
            ReporterStderr::Terminal => {
                let mut stderr = io::stderr().lock();
                self.display
                    .write_event(event, &mut stderr)
                    .and_then(|()| stderr.flush())
                    .map_err(WriteEventError::Io)?;
            }
            ReporterStderr::Buffer(buf) => {
                self.display
                    .write_event(event, *buf)
                    .map_err(WriteEventError::Io)?;
            }
        }

        if let Some(structured) = &mut self.structured {
            structured.write_event(event)?;
        }
        Ok(())
    }

    /// Marks the reporter done, ending the structured log.
    pub fn finish(&mut self) -> Result<(), WriteEventError> {
        match &mut self.structured {
            Some(structured) => structured.finish(),
            None => Ok(()),
        }
    }
}
