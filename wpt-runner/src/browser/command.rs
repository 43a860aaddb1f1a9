// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Browser, BrowserSettings, ExecutorBrowser};
use crate::{
    errors::BrowserError,
    helpers::display_exit_status,
    list::{GroupMetadata, Test},
};
use debug_ignore::DebugIgnore;
use duct::{Handle, cmd};
use tracing::{debug, warn};

/// A browser that runs an arbitrary binary for the lifetime of a browser session.
///
/// Test preferences are passed to the binary as extra arguments, expanded from a template such as
/// `--pref={name}={value}`. A change in preferences between two tests restarts the browser.
///
/// Any exit of the process while the runner expects it to be running is reported as a crash.
#[derive(Debug)]
pub struct CommandBrowser {
    program: String,
    args: Vec<String>,
    pref_arg: Option<String>,
    handle: Option<DebugIgnore<Handle>>,
}

impl CommandBrowser {
    /// Creates a new browser running `program` with `args`.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            pref_arg: None,
            handle: None,
        }
    }

    /// Sets the template used to turn each preference into an argument.
    ///
    /// `{name}` and `{value}` are replaced with the preference's name and value.
    pub fn set_pref_arg(&mut self, template: impl Into<String>) -> &mut Self {
        self.pref_arg = Some(template.into());
        self
    }

    fn command_args(&self, settings: &BrowserSettings) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(template) = &self.pref_arg {
            for (name, value) in settings.iter() {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                args.push(template.replace("{name}", name).replace("{value}", &value));
            }
        }
        args
    }

    /// Returns the exit status if the process has exited.
    fn try_wait(&mut self) -> Option<std::process::ExitStatus> {
        let handle = self.handle.as_ref()?;
        match handle.try_wait() {
            Ok(Some(output)) => Some(output.status),
            Ok(None) => None,
            Err(error) => {
                warn!(program = %self.program, %error, "error checking browser status");
                None
            }
        }
    }
}

impl Browser for CommandBrowser {
    fn start(
        &mut self,
        _group_metadata: &GroupMetadata,
        settings: &BrowserSettings,
    ) -> Result<(), BrowserError> {
        let args = self.command_args(settings);
        debug!(program = %self.program, ?args, "spawning browser");
        let handle = cmd(self.program.as_str(), &args)
            .stdin_null()
            // Stdout is reserved for reporter output.
            .stdout_to_stderr()
            .unchecked()
            .start()
            .map_err(|error| BrowserError::Spawn {
                program: self.program.clone(),
                error,
            })?;
        self.handle = Some(DebugIgnore(handle));

        if let Some(status) = self.try_wait() {
            self.handle = None;
            return Err(BrowserError::ExitedDuringStartup {
                program: self.program.clone(),
                status,
            });
        }
        Ok(())
    }

    fn stop(&mut self, force: bool) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        // There's no portable way to ask an arbitrary binary to shut down, so both paths kill it.
        debug!(program = %self.program, force, "killing browser");
        match handle.kill() {
            Ok(()) => true,
            Err(error) => {
                warn!(program = %self.program, %error, "error killing browser");
                false
            }
        }
    }

    fn pid(&self) -> Option<u32> {
        self.handle
            .as_ref()
            .and_then(|handle| handle.pids().first().copied())
    }

    fn is_alive(&mut self) -> bool {
        self.handle.is_some() && self.try_wait().is_none()
    }

    fn check_crash(&mut self, test: Option<&Test>) -> bool {
        match self.try_wait() {
            Some(status) => {
                warn!(
                    program = %self.program,
                    test = test.map(|test| test.id.as_str()),
                    "browser exited unexpectedly with {}",
                    display_exit_status(status),
                );
                // The crash is reported once, after which the browser is considered stopped.
                self.handle = None;
                true
            }
            None => false,
        }
    }

    fn settings(&self, test: &Test) -> BrowserSettings {
        test.prefs
            .iter()
            .fold(BrowserSettings::new(), |settings, (name, value)| {
                settings.with(name.clone(), value.clone())
            })
    }

    fn executor_browser(&self) -> ExecutorBrowser {
        let mut browser = ExecutorBrowser::new("command");
        browser.pid = self.pid();
        browser
            .extra
            .insert("binary".to_owned(), self.program.clone().into());
        browser
    }

    fn cleanup(&mut self) {
        self.stop(true);
    }
}
