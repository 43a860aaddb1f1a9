// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Browser, BrowserSettings, ExecutorBrowser};
use crate::{
    errors::BrowserError,
    list::{GroupMetadata, Test},
};

/// A browser with no process behind it, for executors that manage their own browser.
///
/// It never crashes and never needs restarting for settings.
#[derive(Debug, Default)]
pub struct NullBrowser {
    running: bool,
}

impl NullBrowser {
    /// Creates a new `NullBrowser`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Browser for NullBrowser {
    fn start(
        &mut self,
        _group_metadata: &GroupMetadata,
        _settings: &BrowserSettings,
    ) -> Result<(), BrowserError> {
        self.running = true;
        Ok(())
    }

    fn stop(&mut self, _force: bool) -> bool {
        self.running = false;
        true
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        self.running
    }

    fn check_crash(&mut self, _test: Option<&Test>) -> bool {
        false
    }

    fn settings(&self, _test: &Test) -> BrowserSettings {
        BrowserSettings::new()
    }

    fn executor_browser(&self) -> ExecutorBrowser {
        ExecutorBrowser::new("null")
    }
}
