// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::list::{GroupMetadata, Test, TestGroup};
use std::{fmt, sync::Arc};

/// The state of a runner.
///
/// Each state carries the data it needs: the pending test, the rest of its group, and the group's
/// metadata. The runner owns the state by value and replaces it on every transition.
#[derive(Debug)]
pub(super) enum ManagerState {
    /// Nothing has happened yet.
    BeforeInit,

    /// The browser and worker are starting up.
    Initializing {
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
        failure_count: usize,
    },

    /// Tests are being run. `test` is in flight or about to be dispatched.
    Running {
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
    },

    /// The browser and worker are being stopped, to be started again for `test`.
    Restarting {
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
        force_stop: bool,
    },

    /// The runner gave up.
    Error,

    /// Every test has been run.
    Stop { force_stop: bool },
}

impl ManagerState {
    pub(super) fn kind(&self) -> ManagerStateKind {
        match self {
            Self::BeforeInit => ManagerStateKind::BeforeInit,
            Self::Initializing { .. } => ManagerStateKind::Initializing,
            Self::Running { .. } => ManagerStateKind::Running,
            Self::Restarting { .. } => ManagerStateKind::Restarting,
            Self::Error => ManagerStateKind::Error,
            Self::Stop { .. } => ManagerStateKind::Stop,
        }
    }

    pub(super) fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Stop { .. })
    }
}

/// The result of handling an event or entering a state.
#[derive(Debug)]
pub(super) enum Transition {
    /// Remain in the given state, without running its entry actions again.
    Stay(ManagerState),

    /// Move to the given state and run its entry actions.
    Enter(ManagerState),
}

/// The kind of state a runner is in, as reported in events.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ManagerStateKind {
    /// Nothing has happened yet.
    BeforeInit,

    /// The browser and worker are starting up.
    Initializing,

    /// Tests are being run.
    Running,

    /// The browser and worker are being restarted.
    Restarting,

    /// The runner gave up after too many failures, or lost a test it couldn't account for.
    Error,

    /// The runner finished.
    Stop,
}

impl ManagerStateKind {
    /// Returns the name of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeInit => "before-init",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Error => "error",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for ManagerStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
