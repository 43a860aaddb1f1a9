// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker failures: panics, init timeouts, error messages and exits while paused.

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use std::time::Duration;
use wpt_metadata::{Status, WptExitCode};
use wpt_runner::{
    reporter::events::RunnerEventKind, results::HarnessStatus, runner::ManagerStateKind,
};

#[test]
fn test_worker_panic_mid_test() -> Result<()> {
    test_init();

    let fake = Fake::default().with_behavior("/b.html", Behavior::Panic);
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html"), testharness("/c.html")],
        |_| {},
    )?;

    assert_eq!(fake.runs(), vec!["/a.html", "/b.html"], "/c.html never ran");
    assert_eq!(
        output.states(0),
        vec![
            ManagerStateKind::BeforeInit,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Running,
            ManagerStateKind::Error,
        ]
    );
    assert_eq!(output.criticals(), vec!["last test did not complete: /b.html"]);
    assert_eq!(
        output
            .finished()
            .into_iter()
            .map(|finished| finished.id)
            .collect::<Vec<_>>(),
        vec!["/a.html"]
    );
    assert_eq!(output.stats.runner_errors, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::HARNESS_ERROR);
    Ok(())
}

#[test]
fn test_init_timeout() -> Result<()> {
    test_init();

    // Setup outlasts the 10s init timeout scaled down to 100ms.
    let fake = Fake::default().with_setup_delay(Duration::from_secs(1));
    let output = run(&fake, vec![testharness("/a.html")], |builder| {
        builder.set_timeout_multiplier(0.01).set_max_restarts(1);
    })?;

    assert_eq!(fake.starts(), 2, "initial start plus one restart");
    assert!(fake.runs().is_empty());
    assert_eq!(
        output.states(0),
        vec![
            ManagerStateKind::BeforeInit,
            ManagerStateKind::Initializing,
            ManagerStateKind::Initializing,
            ManagerStateKind::Initializing,
            ManagerStateKind::Error,
        ]
    );
    assert_eq!(
        output.criticals(),
        vec!["max restarts exceeded (2 consecutive initialization failures)"]
    );
    assert_eq!(output.stats.exit_code(), WptExitCode::HARNESS_ERROR);
    Ok(())
}

#[test]
fn test_worker_exit_while_paused_restarts() -> Result<()> {
    test_init();

    let fake = Fake::default().panicking_wait();
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html")],
        |builder| {
            builder.set_pause_after_test(true);
        },
    )?;

    // Losing the worker between tests counts as the browser being closed.
    assert_eq!(fake.runs(), vec!["/a.html", "/b.html"]);
    assert_eq!(fake.starts(), 2);
    assert!(output.criticals().is_empty());
    assert_eq!(output.state_count(ManagerStateKind::Error), 0);
    assert_eq!(output.state_count(ManagerStateKind::Restarting), 1);
    assert_eq!(output.stats.expected, 2);
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_worker_error_message_mid_test() -> Result<()> {
    use wpt_runner::worker::WorkerLauncher;

    test_init();

    // Answers setup and reports an error instead of running the test. It then records every stop
    // command in the file named by $0 until stdin closes.
    let script = concat!(
        "read -r line\n",
        "echo '{\"type\":\"init_succeeded\"}'\n",
        "read -r line\n",
        "echo '{\"type\":\"error\",\"message\":\"lost connection to the browser\"}'\n",
        "while read -r line; do\n",
        "  case \"$line\" in *'\"command\":\"stop\"'*) echo stop >> \"$0\";; esac\n",
        "done\n",
    );
    let dir = camino_tempfile::tempdir()?;
    let stops_path = dir.path().join("stops");
    let launcher = WorkerLauncher::process(
        "sh",
        vec!["-c".to_owned(), script.to_owned(), stops_path.to_string()],
    );

    let fake = Fake::default();
    let mut group = build_group_with_launcher(&fake, Some(launcher), |_| {})?;
    let output = run_group(&mut group, vec![testharness("/a.html")])?;

    assert_eq!(
        output.finished(),
        vec![Finished {
            id: "/a.html".to_owned(),
            status: Status::Error,
            harness_status: HarnessStatus::InternalError,
            unexpected: true,
        }]
    );
    let messages: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match event {
            RunnerEventKind::TestFinished { message, .. } => message.as_deref(),
            _ => None,
        })
        .collect();
    assert_eq!(messages, vec!["lost connection to the browser"]);
    assert!(output.criticals().is_empty());
    assert_eq!(output.states(0).last(), Some(&ManagerStateKind::Stop));
    assert_eq!(output.stats.exit_code(), WptExitCode::UNEXPECTED_RESULTS);

    let stops = std::fs::read_to_string(&stops_path)?;
    assert_eq!(stops.lines().count(), 1, "worker is told to stop exactly once");
    Ok(())
}
