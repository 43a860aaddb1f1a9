// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{Status, TestType, TimeoutKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A list of tests with pre-resolved expectations, as read by `wptrunner run`.
///
/// This is the serialized form of the test manifest. Expectations are resolved by whatever tool
/// produced the manifest: by the time it reaches the runner every test carries its expected status
/// directly.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct TestManifestSummary {
    /// The tests in this manifest, in the order they should be scheduled.
    #[serde(default)]
    pub tests: Vec<TestSummary>,
}

impl TestManifestSummary {
    /// Parses a manifest from a JSON string.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }

    /// Serializes this manifest as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A single test in a [`TestManifestSummary`].
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestSummary {
    /// The URL path of the test, for example `/dom/nodes/Node-cloneNode.html`.
    pub id: String,

    /// The kind of test.
    pub test_type: TestType,

    /// The timeout class.
    #[serde(default)]
    pub timeout: TimeoutKind,

    /// The expected status of the test as a whole.
    ///
    /// If absent, the default for the test type is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Status>,

    /// Other statuses that are accepted without being counted as unexpected.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_intermittent: Vec<Status>,

    /// Expectations for individual subtests, keyed by subtest name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subtests: BTreeMap<String, SubtestExpectationSummary>,

    /// If set, the test is disabled and this is the reason. Disabled tests are never run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,

    /// Whether the browser must be restarted after this test, whatever its result.
    #[serde(default)]
    pub restart_after: bool,

    /// Browser preferences required by this test.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prefs: BTreeMap<String, String>,

    /// Free-form tags attached to this test.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// The range of assertion counts this test is allowed to produce.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assertion_count: Option<AssertionCountSummary>,
}

/// The expectation for a single subtest.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SubtestExpectationSummary {
    /// The expected status. Subtests default to `PASS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Status>,

    /// Other statuses accepted for this subtest.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_intermittent: Vec<Status>,

    /// If set, results for this subtest are not reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
}

/// The inclusive range of assertion counts allowed for a test.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct AssertionCountSummary {
    /// The minimum number of assertions.
    #[serde(default)]
    pub min: u32,

    /// The maximum number of assertions.
    #[serde(default)]
    pub max: u32,
}
