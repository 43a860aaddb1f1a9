// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

/// A test or subtest status, as seen by loggers and expectations.
///
/// This is the public vocabulary: statuses synthesized by the harness itself (external timeouts and
/// internal errors) are mapped onto these before they are reported.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The test harness ran to completion. Subtests carry the individual results.
    Ok,

    /// The test or subtest passed.
    Pass,

    /// The test or subtest failed.
    Fail,

    /// The test harness reported an error.
    Error,

    /// The test or subtest timed out.
    Timeout,

    /// The browser crashed while running the test.
    Crash,

    /// A precondition for the test wasn't met.
    PreconditionFailed,

    /// The subtest never ran.
    Notrun,

    /// The test was skipped.
    Skip,
}

impl Status {
    /// All statuses, in declaration order.
    pub const ALL: [Self; 9] = [
        Self::Ok,
        Self::Pass,
        Self::Fail,
        Self::Error,
        Self::Timeout,
        Self::Crash,
        Self::PreconditionFailed,
        Self::Notrun,
        Self::Skip,
    ];

    /// Returns the string form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Crash => "CRASH",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::Notrun => "NOTRUN",
            Self::Skip => "SKIP",
        }
    }

    /// Returns the string forms of all statuses.
    pub fn variants() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().map(Self::as_str)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus {
                input: s.to_owned(),
            })
    }
}

/// Error returned while parsing a [`Status`] from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnknownStatus {
    input: String,
}

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status `{}` (known statuses: ", self.input)?;
        for (i, status) in Status::variants().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(status)?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for UnknownStatus {}

/// The kind of a test, which determines how it is executed and what it reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestType {
    /// A JavaScript test reporting individual subtests through testharness.js.
    Testharness,

    /// A rendering test compared against one or more reference pages.
    Reftest,

    /// A reftest rendered in print mode.
    PrintReftest,

    /// A WebDriver specification test, run by an external Python harness.
    Wdspec,

    /// A test which passes as long as loading it doesn't crash the browser.
    Crashtest,
}

impl TestType {
    /// All test types, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Testharness,
        Self::Reftest,
        Self::PrintReftest,
        Self::Wdspec,
        Self::Crashtest,
    ];

    /// Returns the string form of this test type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Testharness => "testharness",
            Self::Reftest => "reftest",
            Self::PrintReftest => "print-reftest",
            Self::Wdspec => "wdspec",
            Self::Crashtest => "crashtest",
        }
    }

    /// The status a test of this type is expected to produce if nothing else is recorded.
    ///
    /// Tests that report subtests finish with `OK`; everything else passes or fails as a whole.
    pub fn default_expected(self) -> Status {
        match self {
            Self::Testharness | Self::Wdspec => Status::Ok,
            Self::Reftest | Self::PrintReftest | Self::Crashtest => Status::Pass,
        }
    }

    /// Returns true if tests of this type report individual subtests.
    pub fn has_subtests(self) -> bool {
        matches!(self, Self::Testharness | Self::Wdspec)
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The timeout class of a test, as recorded in the manifest.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutKind {
    /// The regular timeout (10 seconds).
    #[default]
    Normal,

    /// The long timeout (60 seconds), for tests marked `timeout=long`.
    Long,
}

impl TimeoutKind {
    /// Returns the unscaled duration corresponding to this timeout class.
    pub fn duration(self) -> Duration {
        match self {
            Self::Normal => Duration::from_secs(10),
            Self::Long => Duration::from_secs(60),
        }
    }
}
