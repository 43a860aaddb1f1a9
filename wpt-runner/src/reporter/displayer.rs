// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output.

use super::events::{RunStats, RunnerEvent, RunnerEventKind};
use crate::{
    helpers::{
        format_duration,
        plural::{runners_str, subtests_str, tests_str, were_str},
    },
    list::Test,
    results::SubtestResult,
    worker::LogLevel,
};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};
use wpt_metadata::Status;

pub(super) struct DisplayReporter {
    styles: Styles,
    verbose: bool,
}

impl DisplayReporter {
    pub(super) fn new(verbose: bool) -> Self {
        Self {
            styles: Styles::default(),
            verbose,
        }
    }

    pub(super) fn colorize(&mut self) {
        self.styles.colorize();
    }

    pub(super) fn write_event(
        &mut self,
        event: &RunnerEvent,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        match &event.kind {
            RunnerEventKind::RunStarted {
                test_type,
                test_count,
                runner_count,
            } => {
                writeln!(writer, "{}", "-".repeat(12))?;
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
                writeln!(
                    writer,
                    "{} {test_type} {} across {} {}",
                    test_count.style(self.styles.count),
                    tests_str(*test_count),
                    runner_count.style(self.styles.count),
                    runners_str(*runner_count),
                )?;
            }
            RunnerEventKind::TestSkipped { test, reason } => {
                write!(writer, "{:>12} ", "SKIP".style(self.styles.skip))?;
                writeln!(
                    writer,
                    "{} ({reason})",
                    test.id.style(self.styles.test_id)
                )?;
            }
            RunnerEventKind::ManagerStateChanged { manager, state } => {
                if self.verbose {
                    write!(writer, "{:>12} ", "STATE".style(self.styles.count))?;
                    writeln!(writer, "{} -> {state}", manager.style(self.styles.manager))?;
                }
            }
            RunnerEventKind::TestStarted {
                manager,
                test,
                attempt,
            } => {
                if self.verbose {
                    write!(writer, "{:>12} ", "START".style(self.styles.pass))?;
                    write!(
                        writer,
                        "{} {}",
                        manager.style(self.styles.manager),
                        test.id.style(self.styles.test_id)
                    )?;
                    if *attempt > 1 {
                        write!(writer, " (run {attempt})")?;
                    }
                    writeln!(writer)?;
                }
            }
            RunnerEventKind::SubtestFinished {
                test,
                result,
                expected,
                unexpected,
                ..
            } => {
                if *unexpected || self.verbose {
                    self.write_subtest(test, result, *expected, *unexpected, writer)?;
                }
            }
            RunnerEventKind::AssertionCount {
                manager,
                test,
                count,
                range,
            } => {
                if !range.contains(*count) {
                    write!(writer, "{:>12} ", "ASSERTIONS".style(self.styles.fail))?;
                    writeln!(
                        writer,
                        "{} {}: {count} assertions, expected {}..={}",
                        manager.style(self.styles.manager),
                        test.id.style(self.styles.test_id),
                        range.min,
                        range.max,
                    )?;
                }
            }
            RunnerEventKind::TestFinished {
                manager,
                test,
                status,
                expected,
                message,
                unexpected,
                subtests_unexpected,
                duration,
                ..
            } => {
                let style = if *unexpected {
                    self.styles.fail
                } else {
                    self.styles.pass
                };
                write!(writer, "{:>12} ", status.as_str().style(style))?;
                write!(
                    writer,
                    "[{:>9}] {} {}",
                    format_duration(*duration),
                    manager.style(self.styles.manager),
                    test.id.style(self.styles.test_id),
                )?;
                if *unexpected {
                    write!(writer, " (expected {expected})")?;
                }
                if *subtests_unexpected > 0 {
                    write!(
                        writer,
                        ", {} unexpected {}",
                        subtests_unexpected.style(self.styles.fail),
                        subtests_str(*subtests_unexpected),
                    )?;
                }
                writeln!(writer)?;
                if *unexpected {
                    if let Some(message) = message {
                        writeln!(writer, "{:>12} {message}", "")?;
                    }
                }
            }
            RunnerEventKind::ManagerCritical { manager, message } => {
                write!(writer, "{:>12} ", "CRITICAL".style(self.styles.fail))?;
                writeln!(writer, "{}: {message}", manager.style(self.styles.manager))?;
            }
            RunnerEventKind::WorkerLog {
                manager,
                level,
                message,
            } => {
                let style = match level {
                    LogLevel::Error => Some(self.styles.fail),
                    LogLevel::Warning => Some(self.styles.skip),
                    LogLevel::Info | LogLevel::Debug if self.verbose => Some(self.styles.count),
                    LogLevel::Info | LogLevel::Debug => None,
                };
                if let Some(style) = style {
                    write!(writer, "{:>12} ", level.as_str().style(style))?;
                    writeln!(writer, "{}: {message}", manager.style(self.styles.manager))?;
                }
            }
            RunnerEventKind::RunBeginCancel { reason } => {
                write!(writer, "{:>12} ", "Cancelling".style(self.styles.fail))?;
                writeln!(writer, "due to {reason}")?;
            }
            RunnerEventKind::RunFinished { test_type, stats } => {
                writeln!(writer, "{}", "-".repeat(12))?;
                let summary_style = if stats.is_success() {
                    self.styles.pass
                } else {
                    self.styles.fail
                };
                write!(writer, "{:>12} ", "Summary".style(summary_style))?;
                write!(writer, "[{:>9}] ", format_duration(event.elapsed))?;
                write!(writer, "{test_type}: ")?;
                self.write_summary(stats, writer)?;
            }
        }
        Ok(())
    }

    fn write_subtest(
        &self,
        test: &Test,
        result: &SubtestResult,
        expected: Status,
        unexpected: bool,
        writer: &mut dyn Write,
    ) -> io::Result<()> {
        let style = if unexpected {
            self.styles.fail
        } else {
            self.styles.pass
        };
        write!(writer, "{:>12} ", result.status.as_str().style(style))?;
        write!(
            writer,
            "{} | {}",
            test.id.style(self.styles.test_id),
            result.name
        )?;
        if unexpected {
            write!(writer, " (expected {expected})")?;
        }
        writeln!(writer)?;
        if unexpected {
            if let Some(message) = &result.message {
                writeln!(writer, "{:>12} {message}", "")?;
            }
        }
        Ok(())
    }

    fn write_summary(&self, stats: &RunStats, writer: &mut dyn Write) -> io::Result<()> {
        write!(
            writer,
            "{} {} run: {} expected",
            stats.finished_count.style(self.styles.count),
            tests_str(stats.finished_count),
            stats.expected.style(self.styles.pass),
        )?;
        if stats.unexpected > 0 {
            write!(
                writer,
                ", {} unexpected",
                stats.unexpected.style(self.styles.fail)
            )?;
        }
        if stats.crashed > 0 {
            write!(writer, ", {} crashed", stats.crashed.style(self.styles.fail))?;
        }
        if stats.timed_out > 0 {
            write!(
                writer,
                ", {} timed out",
                stats.timed_out.style(self.styles.fail)
            )?;
        }
        if stats.skipped > 0 {
            write!(writer, ", {} skipped", stats.skipped.style(self.styles.skip))?;
        }
        writeln!(writer)?;

        if stats.subtests_unexpected > 0 {
            writeln!(
                writer,
                "{:>12} {} {} {} unexpected",
                "",
                stats.subtests_unexpected.style(self.styles.fail),
                subtests_str(stats.subtests_unexpected),
                were_str(stats.subtests_unexpected),
            )?;
        }
        let not_run = stats.initial_run_count.saturating_sub(stats.finished_count);
        if not_run > 0 {
            writeln!(
                writer,
                "{:>12} {} {} {} not run",
                "",
                not_run.style(self.styles.fail),
                tests_str(not_run),
                were_str(not_run),
            )?;
        }
        if stats.runner_errors > 0 {
            writeln!(
                writer,
                "{:>12} {} {} gave up after repeated failures",
                "",
                stats.runner_errors.style(self.styles.fail),
                runners_str(stats.runner_errors),
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    test_id: Style,
    manager: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.test_id = Style::new().blue().bold();
        self.manager = Style::new().purple();
    }
}
