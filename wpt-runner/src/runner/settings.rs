// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::{Processes, TestGrouping, WptProfile},
    helpers::scale_duration,
    list::Test,
};
use std::time::Duration;

/// Settings shared by every runner in a [`ManagerGroup`](super::ManagerGroup).
///
/// Resolved from a profile by [`ManagerGroupBuilder`](super::ManagerGroupBuilder), with any
/// overrides applied.
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerSettings {
    pub(super) processes: usize,
    pub(super) max_restarts: usize,
    pub(super) restart_on_unexpected: bool,
    pub(super) rerun: usize,
    pub(super) timeout_multiplier: f64,
    pub(super) pause_after_test: bool,
    pub(super) pause_on_unexpected: bool,
    pub(super) init_timeout: Duration,
    pub(super) external_timeout_grace: Duration,
    pub(super) stop_grace_period: Duration,
    pub(super) poll_interval: Duration,
    pub(super) test_grouping: TestGrouping,
}

impl RunnerSettings {
    /// Reads settings from a profile, without overrides.
    pub fn from_profile(profile: &WptProfile<'_>) -> Self {
        Self {
            processes: profile.processes().compute(),
            max_restarts: profile.max_restarts(),
            restart_on_unexpected: profile.restart_on_unexpected(),
            rerun: profile.rerun(),
            timeout_multiplier: profile.timeout_multiplier(),
            pause_after_test: profile.pause_after_test(),
            pause_on_unexpected: profile.pause_on_unexpected(),
            init_timeout: profile.init_timeout(),
            external_timeout_grace: profile.external_timeout_grace(),
            stop_grace_period: profile.stop_grace_period(),
            poll_interval: profile.poll_interval(),
            test_grouping: profile.test_grouping(),
        }
    }

    /// The maximum number of runners.
    pub fn processes(&self) -> usize {
        self.processes
    }

    /// The number of consecutive initialization failures a runner tolerates.
    pub fn max_restarts(&self) -> usize {
        self.max_restarts
    }

    /// Whether unexpected results restart the browser.
    pub fn restart_on_unexpected(&self) -> bool {
        self.restart_on_unexpected
    }

    /// The number of times each test is run.
    pub fn rerun(&self) -> usize {
        self.rerun
    }

    /// The factor applied to test and initialization timeouts.
    pub fn timeout_multiplier(&self) -> f64 {
        self.timeout_multiplier
    }

    /// Whether to wait for the browser to be closed after each test.
    pub fn pause_after_test(&self) -> bool {
        self.pause_after_test
    }

    /// Whether to wait for the browser to be closed after unexpected results.
    pub fn pause_on_unexpected(&self) -> bool {
        self.pause_on_unexpected
    }

    /// The initialization budget, scaled by the timeout multiplier.
    pub fn init_timeout(&self) -> Duration {
        scale_duration(self.init_timeout, self.timeout_multiplier)
    }

    /// How long to wait for a worker to exit at teardown.
    pub fn stop_grace_period(&self) -> Duration {
        self.stop_grace_period
    }

    /// How often worker liveness is checked.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// How tests are split into groups.
    pub fn test_grouping(&self) -> TestGrouping {
        self.test_grouping
    }

    /// The time after dispatch at which the harness gives up on `test`: its scaled timeout plus the
    /// external timeout grace.
    pub fn external_timeout(&self, test: &Test) -> Duration {
        test.timeout_with_multiplier(self.timeout_multiplier)
            .saturating_add(self.external_timeout_grace)
    }
}

/// Overrides applied on top of a profile, usually from the command line.
#[derive(Clone, Debug, Default)]
pub(super) struct SettingsOverrides {
    pub(super) processes: Option<Processes>,
    pub(super) max_restarts: Option<usize>,
    pub(super) restart_on_unexpected: Option<bool>,
    pub(super) rerun: Option<usize>,
    pub(super) timeout_multiplier: Option<f64>,
    pub(super) pause_after_test: Option<bool>,
    pub(super) pause_on_unexpected: Option<bool>,
    pub(super) test_grouping: Option<TestGrouping>,
}

impl SettingsOverrides {
    pub(super) fn apply(&self, settings: &mut RunnerSettings) {
        if let Some(processes) = self.processes {
            settings.processes = processes.compute();
        }
        if let Some(max_restarts) = self.max_restarts {
            settings.max_restarts = max_restarts;
        }
        if let Some(restart_on_unexpected) = self.restart_on_unexpected {
            settings.restart_on_unexpected = restart_on_unexpected;
        }
        if let Some(rerun) = self.rerun {
            settings.rerun = rerun.max(1);
        }
        if let Some(timeout_multiplier) = self.timeout_multiplier {
            settings.timeout_multiplier = timeout_multiplier;
        }
        if let Some(pause_after_test) = self.pause_after_test {
            settings.pause_after_test = pause_after_test;
        }
        if let Some(pause_on_unexpected) = self.pause_on_unexpected {
            settings.pause_on_unexpected = pause_on_unexpected;
        }
        if let Some(test_grouping) = self.test_grouping {
            settings.test_grouping = test_grouping;
        }
    }
}
