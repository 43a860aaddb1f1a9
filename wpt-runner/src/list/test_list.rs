// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Test;
use crate::errors::ManifestReadError;
use camino::Utf8Path;
use std::{collections::BTreeSet, sync::Arc};
use wpt_metadata::{TestManifestSummary, TestType};

/// The list of tests read from a manifest.
#[derive(Clone, Debug, Default)]
pub struct TestList {
    tests: Vec<Arc<Test>>,
}

impl TestList {
    /// Creates a test list from a parsed manifest.
    pub fn from_summary(summary: &TestManifestSummary) -> Self {
        Self::new(summary.tests.iter().map(Test::from_summary))
    }

    /// Creates a test list from tests.
    pub fn new(tests: impl IntoIterator<Item = Test>) -> Self {
        Self {
            tests: tests.into_iter().map(Arc::new).collect(),
        }
    }

    /// Reads and parses a JSON manifest from disk.
    pub fn from_manifest_path(path: &Utf8Path) -> Result<Self, ManifestReadError> {
        let contents = std::fs::read_to_string(path).map_err(|error| ManifestReadError::Read {
            path: path.to_owned(),
            error,
        })?;
        let summary =
            TestManifestSummary::parse_json(contents).map_err(|error| ManifestReadError::Parse {
                path: path.to_owned(),
                error,
            })?;
        Ok(Self::from_summary(&summary))
    }

    /// Returns the total number of tests, including disabled ones.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if the list has no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterates over all tests in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Test>> + '_ {
        self.tests.iter()
    }

    /// Returns the test types present in the list, in a stable order.
    pub fn test_types(&self) -> BTreeSet<TestType> {
        self.tests.iter().map(|test| test.test_type).collect()
    }

    /// Returns the tests of the given type matched by `filter`, in manifest order.
    ///
    /// Disabled tests are included: runners report them as skipped.
    pub fn select(&self, test_type: TestType, filter: &TestFilter) -> Vec<Arc<Test>> {
        self.tests
            .iter()
            .filter(|test| test.test_type == test_type && filter.matches(test))
            .cloned()
            .collect()
    }
}

/// Selects tests from a [`TestList`].
#[derive(Clone, Debug, Default)]
pub struct TestFilter {
    include: Vec<String>,
    tags: Vec<String>,
}

impl TestFilter {
    /// Creates a filter that matches every test.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only match tests whose ID starts with one of the given prefixes.
    ///
    /// An empty list of prefixes matches everything.
    pub fn set_include(
        &mut self,
        include: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.include = include.into_iter().map(Into::into).collect();
        self
    }

    /// Only match tests carrying at least one of the given tags.
    ///
    /// An empty list of tags matches everything.
    pub fn set_tags(&mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if this filter matches the test.
    pub fn matches(&self, test: &Test) -> bool {
        let included = self.include.is_empty()
            || self
                .include
                .iter()
                .any(|prefix| test.id.starts_with(prefix.as_str()));
        let tagged = self.tags.is_empty() || self.tags.iter().any(|tag| test.tags.contains(tag));
        included && tagged
    }
}
