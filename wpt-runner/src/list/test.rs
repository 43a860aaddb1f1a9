// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::helpers::scale_duration;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, time::Duration};
use wpt_metadata::{AssertionCountSummary, Status, TestSummary, TestType};

/// A single test, along with its resolved expectations.
///
/// Tests are immutable once loaded, and are shared between the queue and the runners as
/// `Arc<Test>`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Test {
    /// The URL path of the test, which also identifies it.
    pub id: String,

    /// The kind of test.
    pub test_type: TestType,

    /// The unscaled timeout for the test.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// The expected status of the test as a whole.
    pub expected: Status,

    /// Other statuses accepted for the test as a whole.
    #[serde(default)]
    pub known_intermittent: Vec<Status>,

    /// Expectations for individual subtests.
    #[serde(default)]
    pub subtests: BTreeMap<String, SubtestExpectation>,

    /// If set, the test is disabled for this reason and is reported as skipped.
    #[serde(default)]
    pub disabled: Option<String>,

    /// Whether the browser must be restarted after this test.
    #[serde(default)]
    pub restart_after: bool,

    /// Browser preferences this test needs.
    #[serde(default)]
    pub prefs: BTreeMap<String, String>,

    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// The allowed range of assertion counts, if the test has one.
    #[serde(default)]
    pub assertion_count: Option<AssertionCountRange>,
}

impl Test {
    /// Creates a new test with the default expectations for its type and a normal timeout.
    pub fn new(id: impl Into<String>, test_type: TestType) -> Self {
        Self {
            id: id.into(),
            test_type,
            timeout: Duration::from_secs(10),
            expected: test_type.default_expected(),
            known_intermittent: Vec::new(),
            subtests: BTreeMap::new(),
            disabled: None,
            restart_after: false,
            prefs: BTreeMap::new(),
            tags: Vec::new(),
            assertion_count: None,
        }
    }

    /// Creates a test from its manifest entry.
    pub fn from_summary(summary: &TestSummary) -> Self {
        Self {
            id: summary.id.clone(),
            test_type: summary.test_type,
            timeout: summary.timeout.duration(),
            expected: summary
                .expected
                .unwrap_or_else(|| summary.test_type.default_expected()),
            known_intermittent: summary.known_intermittent.clone(),
            subtests: summary
                .subtests
                .iter()
                .map(|(name, subtest)| {
                    let expectation = SubtestExpectation {
                        expected: subtest.expected.unwrap_or(Status::Pass),
                        known_intermittent: subtest.known_intermittent.clone(),
                        disabled: subtest.disabled.clone(),
                    };
                    (name.clone(), expectation)
                })
                .collect(),
            disabled: summary.disabled.clone(),
            restart_after: summary.restart_after,
            prefs: summary.prefs.clone(),
            tags: summary.tags.clone(),
            assertion_count: summary.assertion_count.map(AssertionCountRange::from),
        }
    }

    /// Sets the expected status.
    pub fn with_expected(mut self, expected: Status) -> Self {
        self.expected = expected;
        self
    }

    /// Sets the unscaled timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Marks the test as requiring a browser restart after it runs.
    pub fn with_restart_after(mut self) -> Self {
        self.restart_after = true;
        self
    }

    /// Adds a browser preference.
    pub fn with_pref(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.prefs.insert(name.into(), value.into());
        self
    }

    /// Adds a subtest expectation.
    pub fn with_subtest(
        mut self,
        name: impl Into<String>,
        expectation: SubtestExpectation,
    ) -> Self {
        self.subtests.insert(name.into(), expectation);
        self
    }

    /// Marks the test as disabled.
    pub fn with_disabled(mut self, reason: impl Into<String>) -> Self {
        self.disabled = Some(reason.into());
        self
    }

    /// Returns the expected status of the test (for `None`) or of the named subtest.
    ///
    /// Subtests without an expectation are expected to pass.
    pub fn expected(&self, subtest: Option<&str>) -> Status {
        match subtest {
            None => self.expected,
            Some(name) => self
                .subtests
                .get(name)
                .map_or(Status::Pass, |subtest| subtest.expected),
        }
    }

    /// Returns the known intermittent statuses of the test or of the named subtest.
    pub fn known_intermittent(&self, subtest: Option<&str>) -> &[Status] {
        match subtest {
            None => &self.known_intermittent,
            Some(name) => self
                .subtests
                .get(name)
                .map(|subtest| subtest.known_intermittent.as_slice())
                .unwrap_or_default(),
        }
    }

    /// Returns true if results for the named subtest should not be reported.
    pub fn is_subtest_disabled(&self, name: &str) -> bool {
        self.subtests
            .get(name)
            .is_some_and(|subtest| subtest.disabled.is_some())
    }

    /// Returns true if `status` is neither the expected status nor a known intermittent one.
    pub fn is_unexpected(&self, subtest: Option<&str>, status: Status) -> bool {
        status != self.expected(subtest) && !self.known_intermittent(subtest).contains(&status)
    }

    /// Returns the timeout scaled by `multiplier`.
    pub fn timeout_with_multiplier(&self, multiplier: f64) -> Duration {
        scale_duration(self.timeout, multiplier)
    }
}

/// The expectation for one subtest.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct SubtestExpectation {
    /// The expected status.
    pub expected: Status,

    /// Other accepted statuses.
    #[serde(default)]
    pub known_intermittent: Vec<Status>,

    /// If set, results for this subtest are not reported.
    #[serde(default)]
    pub disabled: Option<String>,
}

impl SubtestExpectation {
    /// Creates an expectation for the given status.
    pub fn new(expected: Status) -> Self {
        Self {
            expected,
            known_intermittent: Vec::new(),
            disabled: None,
        }
    }
}

/// The inclusive range of assertion counts a test may produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub struct AssertionCountRange {
    /// The minimum count.
    pub min: u32,

    /// The maximum count.
    pub max: u32,
}

impl AssertionCountRange {
    /// Returns true if `count` is within this range.
    pub fn contains(&self, count: u32) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

impl From<AssertionCountSummary> for AssertionCountRange {
    fn from(summary: AssertionCountSummary) -> Self {
        Self {
            min: summary.min,
            max: summary.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use wpt_metadata::TestManifestSummary;

    fn sample_test() -> Test {
        let manifest = TestManifestSummary::parse_json(
            r#"{ "tests": [{
                "id": "/dom/a.html",
                "test-type": "testharness",
                "known-intermittent": ["TIMEOUT"],
                "subtests": {
                    "fails": { "expected": "FAIL", "known-intermittent": ["PASS"] },
                    "hidden": { "disabled": "flaky" }
                }
            }] }"#,
        )
        .expect("manifest parses");
        Test::from_summary(&manifest.tests[0])
    }

    #[test_case(None, Status::Ok, false; "test expected")]
    #[test_case(None, Status::Timeout, false; "test intermittent")]
    #[test_case(None, Status::Error, true; "test unexpected")]
    #[test_case(Some("fails"), Status::Fail, false; "subtest expected")]
    #[test_case(Some("fails"), Status::Pass, false; "subtest intermittent")]
    #[test_case(Some("fails"), Status::Timeout, true; "subtest unexpected")]
    #[test_case(Some("unlisted"), Status::Pass, false; "unlisted subtest passes")]
    #[test_case(Some("unlisted"), Status::Fail, true; "unlisted subtest fails")]
    fn is_unexpected(subtest: Option<&str>, status: Status, unexpected: bool) {
        assert_eq!(sample_test().is_unexpected(subtest, status), unexpected);
    }

    #[test]
    fn disabled_subtests() {
        let test = sample_test();
        assert!(test.is_subtest_disabled("hidden"));
        assert!(!test.is_subtest_disabled("fails"));
        assert!(!test.is_subtest_disabled("unlisted"));
    }

    #[test]
    fn timeout_scaling() {
        let test = Test::new("/a.html", TestType::Reftest).with_timeout(Duration::from_secs(10));
        assert_eq!(test.expected(None), Status::Pass);
        assert_eq!(test.timeout_with_multiplier(1.5), Duration::from_secs(15));
    }

    #[test]
    fn assertion_count_range() {
        let range = AssertionCountRange { min: 1, max: 2 };
        assert!(!range.contains(0));
        assert!(range.contains(2));
        assert!(!range.contains(3));
    }

    #[test]
    fn prefs_from_summary() {
        let manifest = TestManifestSummary::parse_json(
            r#"{ "tests": [{
                "id": "/css/b.html",
                "test-type": "reftest",
                "prefs": { "layout.css.grid": "true", "gfx.zoom": "2" },
                "restart-after": true
            }] }"#,
        )
        .expect("manifest parses");
        let test = Test::from_summary(&manifest.tests[0]);
        assert_eq!(
            test.prefs,
            btreemap! {
                "gfx.zoom".to_owned() => "2".to_owned(),
                "layout.css.grid".to_owned() => "true".to_owned(),
            }
        );
        assert!(test.restart_after);
        assert_eq!(test.expected(None), Status::Pass);
    }
}
