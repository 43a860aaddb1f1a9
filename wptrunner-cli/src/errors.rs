// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;
use wpt_metadata::WptExitCode;
use wpt_runner::errors::{
    ConfigParseError, ManagerGroupBuildError, ManagerGroupRunError, ManifestReadError,
    ProductArgsError, ProductNotFound, ProfileNotFound, WriteEventError,
};

/// An error that wptrunner knows how to report, along with its exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("product not found")]
    ProductNotFound {
        #[from]
        err: ProductNotFound,
    },
    #[error("invalid product arguments")]
    ProductArgsError {
        #[from]
        err: ProductArgsError,
    },
    #[error("error converting product arguments to or from JSON")]
    ProductArgsJsonError {
        #[source]
        err: serde_json::Error,
    },
    #[error("error reading test manifest")]
    ManifestReadError {
        #[from]
        err: ManifestReadError,
    },
    #[error("error creating structured log")]
    StructuredLogCreateError {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error locating the current executable")]
    CurrentExeError {
        #[source]
        err: std::io::Error,
    },
    #[error("error building runners")]
    ManagerGroupBuildError {
        #[from]
        err: ManagerGroupBuildError,
    },
    #[error("error running tests")]
    ManagerGroupRunError {
        #[from]
        err: ManagerGroupRunError,
    },
    #[error("error writing output")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("error writing to standard output")]
    WriteError {
        #[source]
        err: std::io::Error,
    },
    #[error("error in worker process")]
    WorkerIoError {
        #[source]
        err: std::io::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::ProductNotFound { .. }
            | Self::ProductArgsError { .. }
            | Self::ProductArgsJsonError { .. }
            | Self::ManifestReadError { .. }
            | Self::StructuredLogCreateError { .. }
            | Self::CurrentExeError { .. }
            | Self::ManagerGroupBuildError { .. } => WptExitCode::SETUP_ERROR,
            Self::ManagerGroupRunError {
                err: ManagerGroupRunError::CreateBrowser { .. },
            } => WptExitCode::SETUP_ERROR,
            Self::ManagerGroupRunError { .. } | Self::WorkerIoError { .. } => {
                WptExitCode::HARNESS_ERROR
            }
            Self::WriteEventError { .. } | Self::WriteError { .. } => {
                WptExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse config file `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                None
            }
            Self::ProductNotFound { err } => {
                error!("{err}");
                None
            }
            Self::ProductArgsError { err } => {
                error!("{err}");
                None
            }
            Self::ProductArgsJsonError { err } => {
                error!("failed to convert product arguments to or from JSON");
                Some(err as &dyn Error)
            }
            Self::ManifestReadError { err } => {
                error!("{err}");
                err.source()
            }
            Self::StructuredLogCreateError { path, err } => {
                error!(
                    "failed to create structured log at `{}`",
                    path.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::CurrentExeError { err } => {
                error!("failed to locate the wptrunner executable for worker processes");
                Some(err as &dyn Error)
            }
            Self::ManagerGroupBuildError { err } => {
                error!("failed to set up runners");
                Some(err as &dyn Error)
            }
            Self::ManagerGroupRunError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteEventError { err } => {
                error!("failed to write test results");
                Some(err as &dyn Error)
            }
            Self::WriteError { err } => {
                error!("failed to write to standard output");
                Some(err as &dyn Error)
            }
            Self::WorkerIoError { err } => {
                error!("worker lost its connection to the runner");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {err}");
            next_error = err.source();
        }
    }
}
