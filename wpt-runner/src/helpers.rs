// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for wpt-runner.

use std::{process::ExitStatus, time::Duration};
use swrite::{SWrite, swrite};

/// Utilities for pluralizing various words based on count or plurality.
pub(crate) mod plural {
    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "subtest" if `count` is 1, otherwise "subtests".
    pub(crate) fn subtests_str(count: usize) -> &'static str {
        if count == 1 { "subtest" } else { "subtests" }
    }

    /// Returns "runner" if `count` is 1, otherwise "runners".
    pub(crate) fn runners_str(count: usize) -> &'static str {
        if count == 1 { "runner" } else { "runners" }
    }

    /// Returns "was" if `count` is 1, otherwise "were".
    pub(crate) fn were_str(count: usize) -> &'static str {
        if count == 1 { "was" } else { "were" }
    }
}

/// Describes how a child process exited, for log messages.
pub(crate) fn display_exit_status(status: ExitStatus) -> String {
    let mut out = String::new();
    match status.code() {
        Some(code) => swrite!(out, "exit code {code}"),
        None => {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                match status.signal() {
                    Some(signal) => swrite!(out, "signal {signal}"),
                    None => out.push_str("unknown status"),
                }
            }
            #[cfg(not(unix))]
            out.push_str("unknown status");
        }
    }
    out
}

/// Returns true if the process was terminated by a signal rather than exiting on its own.
pub(crate) fn terminated_by_signal(status: ExitStatus) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal().is_some()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        false
    }
}

/// Formats a duration as seconds with three decimal places, e.g. `1.250s`.
pub(crate) fn format_duration(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

/// Multiplies a duration by a non-negative factor, saturating on overflow.
pub(crate) fn scale_duration(duration: Duration, multiplier: f64) -> Duration {
    Duration::try_from_secs_f64(duration.as_secs_f64() * multiplier.max(0.0))
        .unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Duration::from_secs(10), 1.0, Duration::from_secs(10); "identity")]
    #[test_case(Duration::from_secs(10), 2.5, Duration::from_secs(25); "scaled up")]
    #[test_case(Duration::from_secs(10), -1.0, Duration::ZERO; "negative clamps to zero")]
    #[test_case(Duration::MAX, 4.0, Duration::MAX; "saturates")]
    fn scale(duration: Duration, multiplier: f64, expected: Duration) {
        assert_eq!(scale_duration(duration, multiplier), expected);
    }

    #[test]
    fn format() {
        assert_eq!(format_duration(Duration::from_millis(1250)), "1.250s");
    }
}
