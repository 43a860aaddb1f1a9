// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatches for test runs and individual tests.
//!
//! A stopwatch records the wall-clock time it was started at, for display and for the structured
//! log, along with a monotonic `Instant` used to compute elapsed durations.

use chrono::{DateTime, FixedOffset, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// A running stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn start_time(&self) -> DateTime<FixedOffset> {
        self.start_time.fixed_offset()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time(),
            duration: self.elapsed(),
        }
    }
}

/// The state of a stopwatch at a point in time.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<FixedOffset>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    /// The wall-clock time corresponding to this snapshot.
    pub(crate) fn now(&self) -> DateTime<FixedOffset> {
        self.start_time + self.duration
    }
}
