// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{GroupId, GroupMetadata, Test, TestGroup, TestQueue};
use std::{fmt, sync::Arc};
use xxhash_rust::xxh3::xxh3_64;

/// Turns an ordered list of tests into a [`TestQueue`] of groups.
pub trait TestSource: fmt::Debug + Send + Sync {
    /// Splits `tests` into groups, preserving their relative order within each group.
    fn make_queue(&self, tests: Vec<Arc<Test>>) -> TestQueue;
}

/// Spreads tests over one group per runner.
///
/// Each test is assigned to a group by a stable hash of its ID, so a test always lands with the
/// same neighbors for a given number of processes.
#[derive(Clone, Copy, Debug)]
pub struct SingleTestSource {
    processes: usize,
}

impl SingleTestSource {
    /// Creates a new source for the given number of processes (at least one).
    pub fn new(processes: usize) -> Self {
        Self {
            processes: processes.max(1),
        }
    }

    fn group_index(&self, test: &Test) -> usize {
        (xxh3_64(test.id.as_bytes()) % self.processes as u64) as usize
    }
}

impl TestSource for SingleTestSource {
    fn make_queue(&self, tests: Vec<Arc<Test>>) -> TestQueue {
        let mut buckets = vec![Vec::new(); self.processes];
        for test in tests {
            buckets[self.group_index(&test)].push(test);
        }

        TestQueue::new(buckets.into_iter().enumerate().map(|(index, tests)| {
            (
                TestGroup::new(GroupId::new(index), tests),
                GroupMetadata::new("/"),
            )
        }))
    }
}

/// Groups consecutive tests that share a directory prefix.
#[derive(Clone, Copy, Debug)]
pub struct PathGroupedSource {
    depth: usize,
}

impl PathGroupedSource {
    /// Creates a new source grouping by the first `depth` directory components of each test ID.
    ///
    /// A depth of 0 groups by the full directory.
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    fn dir_components<'a>(&self, test: &'a Test) -> Vec<&'a str> {
        let path = test.id.split(['?', '#']).next().unwrap_or_default();
        let mut components: Vec<_> = path.split('/').filter(|c| !c.is_empty()).collect();
        // The last component is the file name.
        components.pop();
        if self.depth > 0 {
            components.truncate(self.depth);
        }
        components
    }
}

impl TestSource for PathGroupedSource {
    fn make_queue(&self, tests: Vec<Arc<Test>>) -> TestQueue {
        let mut groups: Vec<(Vec<&str>, Vec<Arc<Test>>)> = Vec::new();
        for test in &tests {
            let components = self.dir_components(test);
            match groups.last_mut() {
                Some((prefix, members)) if *prefix == components => members.push(test.clone()),
                _ => groups.push((components, vec![test.clone()])),
            }
        }

        TestQueue::new(groups.into_iter().enumerate().map(|(index, (prefix, tests))| {
            let scope = format!("/{}", prefix.join("/"));
            (TestGroup::new(GroupId::new(index), tests), GroupMetadata::new(scope))
        }))
    }
}
