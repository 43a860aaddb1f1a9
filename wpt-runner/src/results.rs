// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Results produced by executors.
//!
//! A [`TestOutcome`] is produced once for every execution of a test, either by an executor or
//! synthesized by the runner when the harness itself gives up on a test.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};
use wpt_metadata::{Status, UnknownStatus};

/// A test status as produced by the harness.
///
/// This extends the public [`Status`] vocabulary with two statuses that the harness synthesizes
/// itself. They are only used to decide whether to restart the browser: loggers and expectation
/// comparisons see [`Self::to_public`] instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HarnessStatus {
    /// A status from the public vocabulary.
    Public(Status),

    /// The harness killed the browser because the test didn't finish within its timeout plus a
    /// grace period.
    ExternalTimeout,

    /// The harness itself failed while running the test.
    InternalError,
}

impl HarnessStatus {
    /// `OK`.
    pub const OK: Self = Self::Public(Status::Ok);

    /// `PASS`.
    pub const PASS: Self = Self::Public(Status::Pass);

    /// `CRASH`.
    pub const CRASH: Self = Self::Public(Status::Crash);

    /// Maps this status to the public vocabulary.
    ///
    /// `EXTERNAL-TIMEOUT` becomes `TIMEOUT`, and `INTERNAL-ERROR` becomes `ERROR`.
    pub fn to_public(self) -> Status {
        match self {
            Self::Public(status) => status,
            Self::ExternalTimeout => Status::Timeout,
            Self::InternalError => Status::Error,
        }
    }

    /// Returns true if a result with this status always forces a browser restart.
    pub fn forces_restart(self) -> bool {
        matches!(
            self,
            Self::Public(Status::Crash) | Self::ExternalTimeout | Self::InternalError
        )
    }

    /// Returns the string form of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public(status) => status.as_str(),
            Self::ExternalTimeout => "EXTERNAL-TIMEOUT",
            Self::InternalError => "INTERNAL-ERROR",
        }
    }
}

impl From<Status> for HarnessStatus {
    fn from(status: Status) -> Self {
        Self::Public(status)
    }
}

impl fmt::Display for HarnessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HarnessStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXTERNAL-TIMEOUT" => Ok(Self::ExternalTimeout),
            "INTERNAL-ERROR" => Ok(Self::InternalError),
            other => other.parse().map(Self::Public),
        }
    }
}

impl Serialize for HarnessStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HarnessStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The result of a single subtest.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SubtestResult {
    /// The name of the subtest.
    pub name: String,

    /// The status of the subtest.
    pub status: Status,

    /// An optional message describing the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// An optional stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl SubtestResult {
    /// Creates a new subtest result with no message.
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
            stack: None,
        }
    }
}

/// Extra data attached to a [`TestOutcome`].
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ResultExtra {
    /// The number of assertions the browser hit while running the test, if it counts them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_count: Option<u32>,

    /// Any other data reported by the executor.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// The result of one execution of a test.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TestOutcome {
    /// The status of the test as a whole.
    pub status: HarnessStatus,

    /// An optional message describing the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// An optional stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Extra data reported with the result.
    #[serde(default)]
    pub extra: ResultExtra,

    /// Results for individual subtests, in the order they were reported.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtests: Vec<SubtestResult>,
}

impl TestOutcome {
    /// Creates a new outcome with the given status and nothing else.
    pub fn new(status: impl Into<HarnessStatus>) -> Self {
        Self {
            status: status.into(),
            message: None,
            stack: None,
            extra: ResultExtra::default(),
            subtests: Vec::new(),
        }
    }

    /// Creates an `INTERNAL-ERROR` outcome with the given message.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(HarnessStatus::InternalError).with_message(message)
    }

    /// Creates an `EXTERNAL-TIMEOUT` outcome with the given message.
    pub fn external_timeout(message: impl Into<String>) -> Self {
        Self::new(HarnessStatus::ExternalTimeout).with_message(message)
    }

    /// Sets the message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a subtest result.
    pub fn with_subtest(mut self, subtest: SubtestResult) -> Self {
        self.subtests.push(subtest);
        self
    }

    /// Sets the assertion count.
    pub fn with_assertion_count(mut self, count: u32) -> Self {
        self.extra.assertion_count = Some(count);
        self
    }
}
