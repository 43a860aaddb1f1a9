// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::Result;
use pretty_assertions::assert_eq;
use std::time::Duration;
use test_case::test_case;
use wpt_metadata::{Status, TestType, WptExitCode};
use wpt_runner::{list::Test, results::HarnessStatus, runner::ManagerStateKind};

#[test]
fn test_restart_after() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(
        &fake,
        vec![
            testharness("/a.html").with_restart_after(),
            testharness("/b.html"),
            testharness("/c.html"),
        ],
        |_| {},
    )?;

    assert_eq!(fake.starts(), 2);
    assert_eq!(output.state_count(ManagerStateKind::Restarting), 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}

#[test]
fn test_settings_change_restarts() -> Result<()> {
    test_init();

    let fake = Fake::default();
    let output = run(
        &fake,
        vec![
            testharness("/a.html"),
            testharness("/b.html").with_pref("dom.feature", "true"),
            testharness("/c.html").with_pref("dom.feature", "true"),
        ],
        |_| {},
    )?;

    assert_eq!(fake.runs(), vec!["/a.html", "/b.html", "/c.html"]);
    assert_eq!(fake.starts(), 2, "only the change in prefs restarts");
    assert_eq!(
        output.states(0),
        vec![
            ManagerStateKind::BeforeInit,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Running,
            ManagerStateKind::Restarting,
            ManagerStateKind::Initializing,
            ManagerStateKind::Running,
            ManagerStateKind::Running,
            ManagerStateKind::Stop,
        ]
    );
    Ok(())
}

#[test_case(5, 6; "default max restarts")]
#[test_case(0, 1; "no restarts")]
fn test_max_restarts(max_restarts: usize, starts: usize) -> Result<()> {
    test_init();

    let fake = Fake::default().failing_start();
    let output = run(&fake, vec![testharness("/a.html")], |builder| {
        builder.set_max_restarts(max_restarts);
    })?;

    assert_eq!(fake.starts(), starts);
    assert!(fake.runs().is_empty());
    assert_eq!(output.states(0).last(), Some(&ManagerStateKind::Error));
    let criticals = output.criticals();
    assert_eq!(criticals.len(), 1);
    assert!(
        criticals[0].starts_with("max restarts exceeded"),
        "critical: {}",
        criticals[0]
    );
    assert_eq!(output.stats.runner_errors, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::HARNESS_ERROR);
    Ok(())
}

#[test]
fn test_crash_overrides_status() -> Result<()> {
    test_init();

    let fake = Fake::default().with_behavior("/b.html", Behavior::CrashBrowser);
    let output = run(
        &fake,
        vec![testharness("/a.html"), testharness("/b.html"), testharness("/c.html")],
        |_| {},
    )?;

    assert_eq!(
        output.finished(),
        vec![
            Finished {
                id: "/a.html".to_owned(),
                status: Status::Ok,
                harness_status: HarnessStatus::OK,
                unexpected: false,
            },
            Finished {
                id: "/b.html".to_owned(),
                status: Status::Crash,
                harness_status: HarnessStatus::CRASH,
                unexpected: true,
            },
            Finished {
                id: "/c.html".to_owned(),
                status: Status::Ok,
                harness_status: HarnessStatus::OK,
                unexpected: false,
            },
        ]
    );
    assert_eq!(output.state_count(ManagerStateKind::Initializing), 2);
    assert_eq!(output.state_count(ManagerStateKind::Restarting), 1);
    assert_eq!(output.stats.crashed, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::UNEXPECTED_RESULTS);
    Ok(())
}

#[test]
fn test_external_timeout() -> Result<()> {
    test_init();

    let fake =
        Fake::default().with_behavior("/slow.html", Behavior::Hang(Duration::from_secs(2)));
    let output = run(
        &fake,
        vec![
            testharness("/slow.html").with_timeout(Duration::from_millis(50)),
            testharness("/b.html"),
        ],
        |_| {},
    )?;

    assert_eq!(
        output.finished(),
        vec![
            Finished {
                id: "/slow.html".to_owned(),
                status: Status::Timeout,
                harness_status: HarnessStatus::ExternalTimeout,
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
    assert_eq!(fake.starts(), 2, "browser restarted after the timeout");
    assert_eq!(output.stats.timed_out, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::UNEXPECTED_RESULTS);
    Ok(())
}

#[test_case(TestType::Wdspec, vec![true, true, false]; "wdspec forces the restart stop")]
#[test_case(TestType::Testharness, vec![true, false, false]; "testharness stops gracefully")]
fn test_external_timeout_force_stop(test_type: TestType, forces: Vec<bool>) -> Result<()> {
    test_init();

    let fake = Fake::default().with_behavior("/slow", Behavior::Hang(Duration::from_secs(2)));
    let mut group = build_group(&fake, |_| {})?;
    let tests = vec![
        Test::new("/slow", test_type).with_timeout(Duration::from_millis(50)),
        Test::new("/b", test_type),
    ];
    let output = run_group_typed(&mut group, test_type, tests)?;

    // The timeout kills the browser, the restart stops it again, and the final stop is graceful.
    assert_eq!(fake.stop_forces(), forces);
    assert_eq!(fake.starts(), 2);
    assert_eq!(
        output
            .finished()
            .into_iter()
            .map(|finished| finished.harness_status)
            .collect::<Vec<_>>(),
        vec![HarnessStatus::ExternalTimeout, HarnessStatus::OK]
    );
    Ok(())
}

#[test]
fn test_huge_timeout_multiplier() -> Result<()> {
    test_init();

    // Deadlines past the end of time mean no deadline at all.
    let fake = Fake::default();
    let output = run(&fake, vec![testharness("/a.html")], |builder| {
        builder.set_timeout_multiplier(1e19);
    })?;

    assert_eq!(fake.runs(), vec!["/a.html"]);
    assert!(output.criticals().is_empty());
    assert_eq!(output.stats.expected, 1);
    assert_eq!(output.stats.exit_code(), WptExitCode::OK);
    Ok(())
}
