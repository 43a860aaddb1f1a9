// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;
use wpt_metadata::{Status, WptExitCode};
use wpt_runner::{
    config::Processes,
    list::AssertionCountRange,
    reporter::events::{CancelReason, RunnerEventKind},
    results::HarnessStatus,
    runner::ManagerStateKind,
};

#[test]
fn test_expected_results() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html"), testharness("/c.html")],
        |_| {},
    )?;

    assert_eq!(fake.runs(), vec!["/a.html", "/b.html", "/c.html"]);
    assert_eq!(fake.starts(), 1, "browser started once");
    assert_eq!(fake.stops(), 1, "browser stopped once at the end");
    assert_eq!(
        output.states(0),
        vec![
            ManagerStateKind::BeforeInit,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Running,
            ManagerStateKind::Running,
            ManagerStateKind::Stop,
        ]
    );

    assert!(matches!(
        output.events.first(),
        Some(RunnerEventKind::RunStarted {
            test_count: 3,
            runner_count: 1,
            ..
        })
    ));
    assert!(matches!(
        output.events.last(),
        Some(RunnerEventKind::RunFinished { .. })
    ));

    assert_eq!(output.stats.finished_count, 3);
    assert_eq!(output.stats.expected, 3);
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}

#[test_case(true, 2; "restart on unexpected")]
#[test_case(false, 1; "keep browser on unexpected")]
fn test_unexpected_result(restart_on_unexpected: bool, starts: usize) -> Result<()> {
    test_init();

    let fake = Fake::default().with_behavior("/a.html", Behavior::Report(Status::Error));
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html")],
        |builder| {
            builder.set_restart_on_unexpected(restart_on_unexpected);
        },
    )?;

    assert_eq!(fake.starts(), starts);
    assert_eq!(
        output.finished(),
        vec![
            Finished {
                id: "/a.html".to_owned(),
                status: Status::Error,
                harness_status: HarnessStatus::Public(Status::Error),
                unexpected: true,
            },
            Finished {
                id: "/b.html".to_owned(),
                status: Status::Ok,
                harness_status: HarnessStatus::OK,
                unexpected: false,
            },
        ]
    );
    assert_eq!(output.stats.unexpected, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::UNEXPECTED_RESULTS);
    Ok(())
}

#[test]
fn test_disabled_tests_are_skipped() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(
        &fake,
        vec![
            testharness("/a.html").with_disabled("unstable"),
            testharness("/b.html"),
        ],
        |_| {},
    )?;

    assert_eq!(fake.runs(), vec!["/b.html"]);
    let skipped: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match event {
            RunnerEventKind::TestSkipped { test, reason } => {
                Some((test.id.as_str(), reason.as_str()))
            }
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec![("/a.html", "unstable")]);
    assert_eq!(output.stats.skipped, 1);
    assert_eq!(output.stats.initial_run_count, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}

#[test]
fn test_rerun() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html")],
        |builder| {
            builder.set_rerun(2);
        },
    )?;

    assert_eq!(
        output.started_attempts(),
        vec![
            ("/a.html".to_owned(), 1),
            ("/a.html".to_owned(), 2),
            ("/b.html".to_owned(), 1),
            ("/b.html".to_owned(), 2),
        ]
    );
    assert_eq!(output.stats.initial_run_count, 4);
    assert_eq!(output.stats.finished_count, 4);
    assert_eq!(fake.starts(), 1);
    Ok(())
}

#[test]
fn test_multiple_runners() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let tests = (0..6)
        .map(|i| testharness(&format!("/dir/{i}.html")))
        .collect();
    let output = run(&fake, tests, |builder| {
        builder.set_processes(Processes::Count(2));
    })?;

    let mut runs = fake.runs();
    runs.sort();
    assert_eq!(
        runs,
        (0..6).map(|i| format!("/dir/{i}.html")).collect::<Vec<_>>()
    );
    // Tests are spread over groups by hash, so either one or two groups are non-empty.
    let runner_count = match output.events.first() {
        Some(RunnerEventKind::RunStarted { runner_count, .. }) => *runner_count,
        other => panic!("expected RunStarted, found {other:?}"),
    };
    assert!((1..=2).contains(&runner_count), "runner count: {runner_count}");
    assert!(fake.starts() <= runner_count, "at most one browser per runner");
    assert_eq!(output.state_count(ManagerStateKind::Stop), runner_count);
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}

#[test]
fn test_stop_before_run() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let mut group = build_group(&fake, |_| {})?;
    let stop_handle = group.stop_handle();
    stop_handle.stop();
    assert!(stop_handle.is_stopped());

    let output = run_group(&mut group, vec![testharness("/a.html")])?;

    assert_eq!(fake.starts(), 0);
    assert_eq!(fake.stops(), 1, "browser is stopped exactly once");
    assert!(fake.runs().is_empty());
    assert!(output.events.iter().any(|event| matches!(
        event,
        RunnerEventKind::RunBeginCancel {
            reason: CancelReason::StopRequested
        }
    )));
    assert!(output.stats.cancelled);
    assert_eq!(output.stats.exit_code(), WptExitCode::RUN_CANCELLED);
    Ok(())
}

#[test]
fn test_stop_mid_run() -> Result<()> {
    test_init();

    let fake = Fake::default().with_behavior("/a.html", Behavior::Hang(Duration::from_secs(5)));
    let mut group = build_group(&fake, |_| {})?;
    let stop_handle = group.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(300));
        stop_handle.stop();
    });

    let output = run_group(&mut group, vec![testharness("/a.html"), testharness("/b.html")])?;
    stopper.join().expect("stopper thread panicked");

    assert_eq!(fake.runs(), vec!["/a.html"], "/b.html never started");
    assert_eq!(fake.starts(), 1);
    assert_eq!(fake.stops(), 1, "browser is stopped exactly once");
    assert_eq!(
        output.states(0),
        vec![
            ManagerStateKind::BeforeInit,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Stop,
        ]
    );
    assert!(output.finished().is_empty());
    assert!(output.criticals().is_empty());
    assert_eq!(output.stats.exit_code(), WptExitCode::RUN_CANCELLED);
    Ok(())
}

#[test]
fn test_pause_after_test() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html")],
        |builder| {
            builder.set_pause_after_test(true);
        },
    )?;

    // The browser is restarted once the user has closed it.
    assert_eq!(fake.runs(), vec!["/a.html", "/b.html"]);
    assert_eq!(fake.starts(), 2);
    assert_eq!(
        output.states(0),
        vec![
            ManagerStateKind::BeforeInit,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Restarting,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Stop,
        ]
    );
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}

#[test]
fn test_assertion_count_reported() -> Result<()> {
    test_init();

    let range = AssertionCountRange { min: 0, max: 1 };
    let mut with_range = testharness("/a.html");
    with_range.assertion_count = Some(range);
    let mut without_count = testharness("/c.html");
    without_count.assertion_count = Some(range);

    let fake = Fake::default()
        .with_behavior("/a.html", Behavior::Assertions(3))
        .with_behavior("/b.html", Behavior::Assertions(2));
    let output = run(
        &fake,
        vec![with_range, testharness("/b.html"), without_count],
        |_| {},
    )?;

    // Only a test with a declared range that reported a count gets an event.
    let counts: Vec<_> = output
        .events
        .iter()
        .filter_map(|event| match event {
            RunnerEventKind::AssertionCount {
                test, count, range, ..
            } => Some((test.id.as_str(), *count, *range)),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![("/a.html", 3, range)]);
    assert_eq!(output.stats.finished_count, 3);
    Ok(())
}

#[test]
fn test_no_tests() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(&fake, Vec::new(), |_| {})?;

    assert_eq!(fake.starts(), 0);
    assert_eq!(
        output.states(0),
        vec![ManagerStateKind::BeforeInit, ManagerStateKind::Stop]
    );
    assert_eq!(output.stats.exit_code(), WptExitCode::NO_TESTS_RUN);
    Ok(())
}
