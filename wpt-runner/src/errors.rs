// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by wpt-runner.

use crate::reporter::events::ManagerId;
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{fmt, process::ExitStatus};
use thiserror::Error;
use wpt_metadata::TestType;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse wptrunner config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error which indicates that a profile was requested but is not defined.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// Error returned while parsing a [`Processes`](crate::config::Processes) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for processes: {input}\n(hint: {message})")]
pub struct ProcessesParseError {
    input: String,
    message: &'static str,
}

impl ProcessesParseError {
    pub(crate) fn new(input: impl Into<String>, message: &'static str) -> Self {
        Self {
            input: input.into(),
            message,
        }
    }
}

/// Error returned while parsing a [`TestGrouping`](crate::config::TestGrouping) value.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for test grouping: {input}\n(known values: single, by-dir=<depth>)"
)]
pub struct TestGroupingParseError {
    input: String,
}

impl TestGroupingParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while reading a test manifest.
#[derive(Debug, Error)]
pub enum ManifestReadError {
    /// The manifest could not be read from disk.
    #[error("error reading test manifest `{path}`")]
    Read {
        /// The path that was being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The manifest could not be parsed.
    #[error("error parsing test manifest `{path}`")]
    Parse {
        /// The path that was being parsed.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// A product was requested that isn't registered.
#[derive(Clone, Debug, Error)]
#[error("unknown product `{name}` (known products: {})", .known.iter().join(", "))]
pub struct ProductNotFound {
    name: String,
    known: Vec<String>,
}

impl ProductNotFound {
    pub(crate) fn new(
        name: impl Into<String>,
        known: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            known: known.into_iter().map(Into::into).collect(),
        }
    }
}

/// The arguments passed to a product were invalid.
#[derive(Clone, Debug, Error)]
#[error("invalid arguments for product `{product}`: {message}")]
pub struct ProductArgsError {
    product: String,
    message: String,
}

impl ProductArgsError {
    /// Creates a new `ProductArgsError`.
    pub fn new(product: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            message: message.into(),
        }
    }
}

/// An error returned by a [`Browser`](crate::browser::Browser).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrowserError {
    /// The browser process could not be started.
    #[error("failed to start browser `{program}`")]
    Spawn {
        /// The program that was being run.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The browser exited while it was starting up.
    #[error("browser `{program}` exited during startup with {}", crate::helpers::display_exit_status(*.status))]
    ExitedDuringStartup {
        /// The program that was being run.
        program: String,

        /// The exit status.
        status: ExitStatus,
    },

    /// Some other error occurred.
    #[error("{message}")]
    Other {
        /// A description of the error.
        message: String,
    },
}

impl BrowserError {
    /// Creates a new `BrowserError` from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// An error returned by an [`Executor`](crate::worker::Executor).
///
/// Errors returned while running a test are reported as `INTERNAL-ERROR` results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The executor doesn't know how to run this kind of test.
    #[error("test type `{test_type}` is not supported by this executor")]
    UnsupportedTestType {
        /// The test type.
        test_type: TestType,
    },

    /// A command could not be spawned.
    #[error("failed to run `{program}`")]
    Spawn {
        /// The program that was being run.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while waiting for a command.
    #[error("error waiting for `{program}` to exit")]
    Wait {
        /// The program that was being run.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The executor was used before it was set up.
    #[error("executor used before setup")]
    NotSetUp,

    /// Some other error occurred.
    #[error("{message}")]
    Other {
        /// A description of the error.
        message: String,
    },
}

impl ExecutorError {
    /// Creates a new `ExecutorError` from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// An error that occurred while starting a worker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorkerSpawnError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread for {manager}")]
    Thread {
        /// The manager the worker belongs to.
        manager: ManagerId,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The worker process could not be spawned.
    #[error("failed to spawn worker process `{program}` for {manager}")]
    Process {
        /// The manager the worker belongs to.
        manager: ManagerId,

        /// The program that was being run.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The worker process was spawned without one of its standard streams.
    #[error("worker process for {manager} is missing its {stream}")]
    MissingPipe {
        /// The manager the worker belongs to.
        manager: ManagerId,

        /// The missing stream.
        stream: &'static str,
    },
}

/// A command couldn't be delivered because the worker has gone away.
#[derive(Clone, Copy, Debug, Error)]
#[error("worker is no longer accepting commands")]
pub struct WorkerSendError;

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while building a [`ManagerGroup`](crate::runner::ManagerGroup).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManagerGroupBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandler(#[from] SignalHandlerSetupError),
}

/// An error that occurred while running tests through a
/// [`ManagerGroup`](crate::runner::ManagerGroup).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ManagerGroupRunError {
    /// The product could not create a browser for a runner.
    #[error("error creating browser for {manager}")]
    CreateBrowser {
        /// The manager the browser was for.
        manager: ManagerId,

        /// The underlying error.
        #[source]
        error: ProductArgsError,
    },

    /// One or more runner tasks panicked.
    #[error("{} {} panicked", .count, crate::helpers::plural::runners_str(*.count))]
    RunnerPanicked {
        /// The number of runner tasks that panicked.
        count: usize,
    },
}

/// An error that occurred while writing a reporter event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while serializing an event.
    #[error("error serializing event")]
    Json(#[source] serde_json::Error),
}

/// Displays a list of errors, one per line.
pub struct DisplayErrorChain<E>(E);

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(error) = source {
            write!(f, "\n  caused by: {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
