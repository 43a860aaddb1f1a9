// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Browsers controlled by the runner.
//!
//! A [`Browser`] is owned by exactly one runner, through a [`BrowserManager`]. The runner starts it
//! before launching a worker, checks it for crashes after every test, and stops it when the pair is
//! restarted or the run ends.

mod command;
mod manager;
mod null;

pub use command::*;
pub use manager::*;
pub use null::*;

use crate::{errors::BrowserError, list::GroupMetadata, list::Test};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// A browser controlled by a runner.
///
/// Implementations are expected to be synchronous: the runner calls them from a blocking context.
pub trait Browser: Send + fmt::Debug {
    /// Starts the browser with the given settings.
    ///
    /// The runner arms its initialization timer before calling this.
    fn start(
        &mut self,
        group_metadata: &GroupMetadata,
        settings: &BrowserSettings,
    ) -> Result<(), BrowserError>;

    /// Stops the browser. If `force` is true the browser is killed without waiting for it to shut
    /// down cleanly.
    ///
    /// Returns true if the browser is known to have stopped. Calling this on a browser that isn't
    /// running is not an error.
    fn stop(&mut self, force: bool) -> bool;

    /// Returns the process ID of the browser, if there's one.
    fn pid(&self) -> Option<u32>;

    /// Returns true if the browser is running.
    fn is_alive(&mut self) -> bool;

    /// Returns true if the browser crashed since the last check.
    ///
    /// `test` is the test that was running, or `None` during initialization.
    fn check_crash(&mut self, test: Option<&Test>) -> bool;

    /// Computes the settings the browser needs to run `test`.
    ///
    /// If these differ from the settings the browser was started with, the runner restarts the
    /// browser before running the test.
    fn settings(&self, test: &Test) -> BrowserSettings;

    /// Returns the information a worker needs to connect to this browser.
    fn executor_browser(&self) -> ExecutorBrowser;

    /// Releases any resources held by the browser. Called once, after the final stop.
    fn cleanup(&mut self) {}
}

/// Settings a browser is started with, computed per test.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct BrowserSettings(BTreeMap<String, serde_json::Value>);

impl BrowserSettings {
    /// Creates an empty set of settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, returning `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Iterates over the settings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> + '_ {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Connection information for a browser, handed to the worker during setup.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ExecutorBrowser {
    /// The kind of browser, for executors that support several.
    pub kind: String,

    /// The process ID of the browser, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Anything else the executor needs, such as a WebDriver host and port.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExecutorBrowser {
    /// Creates connection info for the given kind of browser.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            pid: None,
            extra: BTreeMap::new(),
        }
    }
}
