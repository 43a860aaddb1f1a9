// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Browser, BrowserSettings, ExecutorBrowser};
use crate::{
    errors::BrowserError,
    list::{GroupMetadata, Test},
};
use std::time::Duration;
use tokio::{runtime::RuntimeFlavor, time::Instant};
use tracing::debug;

/// Owns a runner's [`Browser`] and tracks the state the runner needs around it.
///
/// The manager remembers the settings the browser was last computed with, so that a change in
/// settings between two tests can trigger a restart, and the deadline by which initialization has
/// to complete.
#[derive(Debug)]
pub struct BrowserManager {
    browser: Box<dyn Browser>,
    settings: Option<BrowserSettings>,
    started: bool,
    init_timeout: Duration,
    init_deadline: Option<Instant>,
}

impl BrowserManager {
    /// Creates a new manager. `init_timeout` should already be scaled by the timeout multiplier.
    pub fn new(browser: Box<dyn Browser>, init_timeout: Duration) -> Self {
        Self {
            browser,
            settings: None,
            started: false,
            init_timeout,
            init_deadline: None,
        }
    }

    /// Recomputes the browser settings for `test`.
    ///
    /// Returns true if settings were previously known and the new ones differ. The new settings are
    /// stored either way.
    pub fn update_settings(&mut self, test: &Test) -> bool {
        let new_settings = self.browser.settings(test);
        let changed = self
            .settings
            .as_ref()
            .is_some_and(|old| *old != new_settings);
        self.settings = Some(new_settings);
        changed
    }

    /// Starts the browser with the current settings and arms the initialization deadline.
    ///
    /// A timeout too large to be represented as an instant leaves initialization without a
    /// deadline.
    pub fn init(&mut self, group_metadata: &GroupMetadata) -> Result<(), BrowserError> {
        self.init_deadline = Instant::now().checked_add(self.init_timeout);
        let settings = self.settings.get_or_insert_default();
        debug!(scope = %group_metadata.scope, ?settings, "starting browser");

        let browser = &mut self.browser;
        blocking(|| browser.start(group_metadata, settings))?;
        self.started = true;
        Ok(())
    }

    /// The instant by which initialization must have succeeded, if it's in progress.
    pub fn init_deadline(&self) -> Option<Instant> {
        self.init_deadline
    }

    /// Disarms the initialization deadline.
    pub fn after_init(&mut self) {
        self.init_deadline = None;
    }

    /// Stops the browser. Returns true if it's known to have stopped.
    pub fn stop(&mut self, force: bool) -> bool {
        self.init_deadline = None;
        self.started = false;
        let browser = &mut self.browser;
        let stopped = blocking(|| browser.stop(force));
        debug!(force, stopped, "stopped browser");
        stopped
    }

    /// Returns true if the browser was started and hasn't been stopped since.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Returns true if the browser crashed while running `test`, or during initialization if
    /// `test` is `None`.
    pub fn check_crash(&mut self, test: Option<&Test>) -> bool {
        self.browser.check_crash(test)
    }

    /// Returns true if the browser is running.
    pub fn is_alive(&mut self) -> bool {
        self.browser.is_alive()
    }

    /// Returns the process ID of the browser, if any.
    pub fn pid(&self) -> Option<u32> {
        self.browser.pid()
    }

    /// Returns connection info for the worker.
    pub fn executor_browser(&self) -> ExecutorBrowser {
        self.browser.executor_browser()
    }

    /// Releases the browser's resources.
    pub fn cleanup(&mut self) {
        self.browser.cleanup();
    }
}

/// Runs a browser operation that may block, without stalling other runners on the same runtime.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wpt_metadata::TestType;

    #[derive(Debug, Default)]
    struct PrefsBrowser {
        starts: usize,
        stops: Vec<bool>,
        fail_start: bool,
    }

    impl Browser for PrefsBrowser {
        fn start(
            &mut self,
            _group_metadata: &GroupMetadata,
            _settings: &BrowserSettings,
        ) -> Result<(), BrowserError> {
            self.starts += 1;
            if self.fail_start {
                Err(BrowserError::other("refused to start"))
            } else {
                Ok(())
            }
        }

        fn stop(&mut self, force: bool) -> bool {
            self.stops.push(force);
            true
        }

        fn pid(&self) -> Option<u32> {
            None
        }

        fn is_alive(&mut self) -> bool {
            true
        }

        fn check_crash(&mut self, _test: Option<&Test>) -> bool {
            false
        }

        fn settings(&self, test: &Test) -> BrowserSettings {
            test.prefs
                .iter()
                .fold(BrowserSettings::new(), |settings, (k, v)| {
                    settings.with(k.clone(), v.clone())
                })
        }

        fn executor_browser(&self) -> ExecutorBrowser {
            ExecutorBrowser::new("prefs")
        }
    }

    #[test]
    fn settings_change_detection() {
        let mut manager =
            BrowserManager::new(Box::new(PrefsBrowser::default()), Duration::from_secs(1));
        let a = Test::new("/a.html", TestType::Testharness).with_pref("x", "1");
        let b = Test::new("/b.html", TestType::Testharness).with_pref("x", "2");

        // The first computation has nothing to compare against.
        assert!(!manager.update_settings(&a));
        assert!(!manager.update_settings(&a));
        assert!(manager.update_settings(&b));
        assert!(!manager.update_settings(&b));
    }

    #[test]
    fn init_arms_deadline_until_after_init() {
        let mut manager =
            BrowserManager::new(Box::new(PrefsBrowser::default()), Duration::from_secs(5));
        assert_eq!(manager.init_deadline(), None);

        manager.init(&GroupMetadata::new("/")).unwrap();
        assert!(manager.is_started());
        assert!(manager.init_deadline().is_some());

        manager.after_init();
        assert_eq!(manager.init_deadline(), None);

        assert!(manager.stop(true));
        assert!(!manager.is_started());
    }

    #[test]
    fn unrepresentable_init_timeout_has_no_deadline() {
        let mut manager = BrowserManager::new(Box::new(PrefsBrowser::default()), Duration::MAX);
        manager.init(&GroupMetadata::new("/")).unwrap();
        assert!(manager.is_started());
        assert_eq!(manager.init_deadline(), None);
    }

    #[test]
    fn failed_start_leaves_browser_stopped() {
        let browser = PrefsBrowser {
            fail_start: true,
            ..Default::default()
        };
        let mut manager = BrowserManager::new(Box::new(browser), Duration::from_secs(5));
        let err = manager.init(&GroupMetadata::new("/")).unwrap_err();
        assert_eq!(err.to_string(), "refused to start");
        assert!(!manager.is_started());
    }
}
