// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Test;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

/// Identifies a [`TestGroup`] within a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Deserialize, Serialize)]
#[serde(transparent)]
pub struct GroupId(usize);

impl GroupId {
    /// Creates a new group ID.
    pub fn new(id: usize) -> Self {
        Self(id)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Data shared by every test in a group.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct GroupMetadata {
    /// The URL prefix shared by the tests in the group.
    pub scope: String,

    /// Free-form data for browsers and executors.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl GroupMetadata {
    /// Creates metadata with the given scope and no extra data.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            extra: BTreeMap::new(),
        }
    }
}

/// An ordered set of tests that are dispatched by a single runner.
///
/// Tests are popped from the front as they're dispatched.
#[derive(Clone, Debug)]
pub struct TestGroup {
    id: GroupId,
    tests: VecDeque<Arc<Test>>,
}

impl TestGroup {
    /// Creates a new group.
    pub fn new(id: GroupId, tests: impl IntoIterator<Item = Arc<Test>>) -> Self {
        Self {
            id,
            tests: tests.into_iter().collect(),
        }
    }

    /// Returns the ID of this group.
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Removes and returns the next test in this group.
    pub fn pop_front(&mut self) -> Option<Arc<Test>> {
        self.tests.pop_front()
    }

    /// Returns the number of tests remaining in this group.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no tests remain in this group.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Iterates over the tests remaining in this group.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Test>> + '_ {
        self.tests.iter()
    }
}

/// The queue of groups shared between the runners of a [`ManagerGroup`](crate::runner::ManagerGroup).
///
/// Each group is handed to exactly one runner. Once a runner has a group, no other runner takes
/// tests from it.
#[derive(Clone, Debug, Default)]
pub struct TestQueue {
    groups: Arc<Mutex<VecDeque<(TestGroup, GroupMetadata)>>>,
}

impl TestQueue {
    /// Creates a new queue from the given groups, dropping empty ones.
    pub fn new(groups: impl IntoIterator<Item = (TestGroup, GroupMetadata)>) -> Self {
        let groups = groups
            .into_iter()
            .filter(|(group, _)| !group.is_empty())
            .collect();
        Self {
            groups: Arc::new(Mutex::new(groups)),
        }
    }

    /// Removes and returns the next group, or `None` if the queue is exhausted.
    pub fn pop(&self) -> Option<(TestGroup, GroupMetadata)> {
        self.lock().pop_front()
    }

    /// Returns the number of groups remaining.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no groups remain.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns the total number of tests remaining across all groups.
    pub fn test_count(&self) -> usize {
        self.lock().iter().map(|(group, _)| group.len()).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(TestGroup, GroupMetadata)>> {
        // The queue is only ever popped from, so a panic while the lock is held can't leave it
        // in an inconsistent state.
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
