// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`ManagerGroup`], which runs tests of one type across a
//! number of runners. Each runner is a state machine driving one browser and one worker; runners
//! share a queue of test groups and report everything they do as events.

mod group;
mod manager;
mod settings;
mod state;

pub use group::*;
use manager::RunnerManager;
pub use settings::RunnerSettings;
use settings::SettingsOverrides;
pub use state::ManagerStateKind;
