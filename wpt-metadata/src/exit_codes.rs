// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `wptrunner` failures.
///
/// `wptrunner` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum WptExitCode {}

impl WptExitCode {
    /// No errors occurred and every test produced its expected result.
    pub const OK: i32 = 0;

    /// No tests were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// A user issue happened while setting up a wptrunner invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more tests produced an unexpected result.
    pub const UNEXPECTED_RESULTS: i32 = 100;

    /// At least one runner manager gave up after exhausting its restart budget.
    pub const HARNESS_ERROR: i32 = 101;

    /// The run was cancelled, for example by Ctrl-C, before every test ran.
    pub const RUN_CANCELLED: i32 = 102;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
