// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shutdown signals.
//!
//! The first shutdown signal cancels the run: [`ManagerGroup`](crate::runner::ManagerGroup) sets
//! its stop flag, as [`StopHandle::stop`](crate::runner::StopHandle::stop) would, and reports
//! [`CancelReason::Signal`](crate::reporter::events::CancelReason::Signal).

use crate::errors::SignalHandlerSetupError;
use std::{fmt, future::poll_fn, task::Poll};

/// Whether a run listens for shutdown signals.
///
/// Passed to [`ManagerGroupBuilder::build`](crate::runner::ManagerGroupBuilder::build).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum SignalHandlerKind {
    /// Listen for `SIGINT`, `SIGTERM` and `SIGHUP` on Unix, and Ctrl-C on Windows.
    Standard,

    /// Don't listen for anything. Embedders and tests that stop runs through a
    /// [`StopHandle`](crate::runner::StopHandle) use this.
    Noop,
}

impl SignalHandlerKind {
    /// Installs the listeners. Must be called from within a Tokio runtime.
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        let listeners = match self {
            Self::Standard => platform::install()?,
            Self::Noop => Vec::new(),
        };
        Ok(SignalHandler { listeners })
    }
}

#[derive(Debug)]
pub(crate) struct SignalHandler {
    // A listener is dropped once its stream ends.
    listeners: Vec<(ShutdownEvent, platform::Listener)>,
}

impl SignalHandler {
    /// Waits for the next shutdown signal, or returns `None` once every listener has ended.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownEvent> {
        poll_fn(|cx| {
            let mut index = 0;
            while let Some((event, listener)) = self.listeners.get_mut(index) {
                match listener.poll_recv(cx) {
                    Poll::Ready(Some(())) => return Poll::Ready(Some(*event)),
                    Poll::Ready(None) => {
                        self.listeners.remove(index);
                    }
                    Poll::Pending => index += 1,
                }
            }
            if self.listeners.is_empty() {
                Poll::Ready(None)
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

#[cfg(unix)]
mod platform {
    use super::ShutdownEvent;
    use tokio::signal::unix::{SignalKind, signal};

    pub(super) type Listener = tokio::signal::unix::Signal;

    pub(super) fn install() -> std::io::Result<Vec<(ShutdownEvent, Listener)>> {
        [
            (ShutdownEvent::Interrupt, SignalKind::interrupt()),
            (ShutdownEvent::Term, SignalKind::terminate()),
            (ShutdownEvent::Hangup, SignalKind::hangup()),
        ]
        .into_iter()
        .map(|(event, kind)| Ok((event, signal(kind)?)))
        .collect()
    }
}

#[cfg(windows)]
mod platform {
    use super::ShutdownEvent;

    pub(super) type Listener = tokio::signal::windows::CtrlC;

    pub(super) fn install() -> std::io::Result<Vec<(ShutdownEvent, Listener)>> {
        Ok(vec![(
            ShutdownEvent::Interrupt,
            tokio::signal::windows::ctrl_c()?,
        )])
    }
}

/// A shutdown signal that cancelled a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// `SIGINT`, or Ctrl-C on Windows.
    Interrupt,

    /// `SIGTERM`.
    #[cfg(unix)]
    Term,

    /// `SIGHUP`.
    #[cfg(unix)]
    Hangup,
}

impl fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "interrupt",
            #[cfg(unix)]
            Self::Term => "SIGTERM",
            #[cfg(unix)]
            Self::Hangup => "SIGHUP",
        };
        f.write_str(name)
    }
}
