// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for wptrunner, a harness that runs web-platform-tests against browsers.
//!
//! The basic flow is:
//!
//! * A [`TestList`](list::TestList) is read from a JSON manifest.
//! * A [`ManagerGroup`](runner::ManagerGroup) splits the tests into groups through a
//!   [`TestSource`](list::TestSource), and starts one [`RunnerManager`](runner) per configured
//!   process.
//! * Each runner owns one browser and one worker. It feeds tests to the worker one at a time,
//!   watches for crashes and hangs, and restarts the pair when needed.
//! * Every step is reported as a [`RunnerEvent`](reporter::events::RunnerEvent), which is typically
//!   fed into a [`TestReporter`](reporter::TestReporter).

pub mod browser;
pub mod config;
pub mod errors;
mod helpers;
pub mod list;
pub mod product;
pub mod reporter;
pub mod results;
pub mod runner;
pub mod signal;
mod time;
pub mod worker;
