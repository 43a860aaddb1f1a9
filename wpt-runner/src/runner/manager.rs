// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-runner state machine.
//!
//! A [`RunnerManager`] owns one browser and at most one worker. It takes groups of tests from the
//! shared queue and feeds them to the worker one test at a time, restarting the browser and worker
//! when a test crashes, hangs, produces an unexpected result or needs different browser settings.

use super::{
    RunnerSettings,
    state::{ManagerState, Transition},
};
use crate::{
    browser::BrowserManager,
    errors::DisplayErrorChain,
    helpers::format_duration,
    list::{GroupMetadata, Test, TestGroup, TestQueue},
    reporter::events::{ManagerId, RunnerEventKind},
    results::{HarnessStatus, TestOutcome},
    worker::{Worker, WorkerCommand, WorkerLauncher, WorkerMessage},
};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tracing::{debug, info, warn};
use wpt_metadata::{Status, TestType};

/// Something the runner reacts to while waiting.
#[derive(Debug)]
enum ManagerEvent {
    /// The stop flag was set.
    Stop,

    /// The worker sent a message.
    Message(WorkerMessage),

    /// The worker's channel closed, or the worker was found dead at a poll tick.
    WorkerGone,

    /// Initialization didn't finish in time.
    InitTimeout,

    /// The in-flight test didn't finish within its timeout plus the grace period.
    TestTimeout,
}

#[derive(Debug)]
struct InFlight {
    started: Instant,
    // None if the scaled timeout overflows.
    deadline: Option<Instant>,
}

/// Runs tests for one browser and worker pair.
#[derive(Debug)]
pub(super) struct RunnerManager {
    id: ManagerId,
    test_type: TestType,
    settings: Arc<RunnerSettings>,
    launcher: WorkerLauncher,
    queue: TestQueue,
    events: mpsc::UnboundedSender<RunnerEventKind>,
    stop_rx: watch::Receiver<bool>,
    stop_closed: bool,
    browser: BrowserManager,
    worker: Option<Worker>,
    run_count: usize,
    in_flight: Option<InFlight>,
    paused: bool,
}

impl RunnerManager {
    #[expect(clippy::too_many_arguments)]
    pub(super) fn new(
        id: ManagerId,
        test_type: TestType,
        settings: Arc<RunnerSettings>,
        launcher: WorkerLauncher,
        queue: TestQueue,
        browser: BrowserManager,
        events: mpsc::UnboundedSender<RunnerEventKind>,
        stop_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            test_type,
            settings,
            launcher,
            queue,
            events,
            stop_rx,
            stop_closed: false,
            browser,
            worker: None,
            run_count: 0,
            in_flight: None,
            paused: false,
        }
    }

    /// Runs until every test this runner can take has been run, the runner gives up, or the stop
    /// flag is set. The browser and worker are always stopped before this returns.
    pub(super) async fn run(mut self) {
        let mut state = self.enter_state(ManagerState::BeforeInit).await;
        while !state.is_terminal() && !self.stop_requested() {
            let event = self.next_event().await;
            state = match self.on_event(state, event).await {
                Transition::Stay(state) => state,
                Transition::Enter(next) => self.enter_state(next).await,
            };
        }
        self.teardown(state).await;
    }

    // ---
    // State entry
    // ---

    /// Enters `state`, following any transitions its entry actions make.
    async fn enter_state(&mut self, mut state: ManagerState) -> ManagerState {
        loop {
            debug!(manager = %self.id, state = %state.kind(), "entering state");
            self.emit(RunnerEventKind::ManagerStateChanged {
                manager: self.id,
                state: state.kind(),
            });
            if self.stop_requested() {
                return state;
            }
            match self.on_enter(state).await {
                Transition::Stay(state) => return state,
                Transition::Enter(next) => state = next,
            }
        }
    }

    async fn on_enter(&mut self, state: ManagerState) -> Transition {
        match state {
            ManagerState::BeforeInit => match self.next_group() {
                Some((test, group, group_metadata)) => Transition::Enter(ManagerState::Initializing {
                    test,
                    group,
                    group_metadata,
                    failure_count: 0,
                }),
                None => Transition::Enter(ManagerState::Stop { force_stop: false }),
            },
            ManagerState::Initializing {
                test,
                group,
                group_metadata,
                failure_count,
            } => {
                self.start_runner(test, group, group_metadata, failure_count)
                    .await
            }
            ManagerState::Running {
                test,
                group,
                group_metadata,
            } => self.start_next_test(test, group, group_metadata),
            ManagerState::Restarting {
                test,
                group,
                group_metadata,
                force_stop,
            } => {
                self.stop_runner(force_stop).await;
                Transition::Enter(ManagerState::Initializing {
                    test,
                    group,
                    group_metadata,
                    failure_count: 0,
                })
            }
            ManagerState::Error | ManagerState::Stop { .. } => Transition::Stay(state),
        }
    }

    async fn start_runner(
        &mut self,
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
        failure_count: usize,
    ) -> Transition {
        if failure_count > self.settings.max_restarts() {
            self.critical(format!(
                "max restarts exceeded ({failure_count} consecutive initialization failures)"
            ));
            return Transition::Enter(ManagerState::Error);
        }

        self.browser.update_settings(&test);
        if let Err(error) = self.browser.init(&group_metadata) {
            warn!(manager = %self.id, "{}", DisplayErrorChain::new(error));
            return self
                .init_failed(test, group, group_metadata, failure_count)
                .await;
        }

        let worker = match self.launcher.launch(self.id) {
            Ok(worker) => worker,
            Err(error) => {
                warn!(manager = %self.id, "{}", DisplayErrorChain::new(error));
                return self
                    .init_failed(test, group, group_metadata, failure_count)
                    .await;
            }
        };
        let setup = WorkerCommand::Setup {
            test_type: self.test_type,
            browser: self.browser.executor_browser(),
            timeout_multiplier: self.settings.timeout_multiplier(),
            group_metadata: group_metadata.clone(),
        };
        let sent = worker.send(setup);
        self.worker = Some(worker);
        if sent.is_err() {
            warn!(manager = %self.id, "worker exited before setup");
            return self
                .init_failed(test, group, group_metadata, failure_count)
                .await;
        }

        Transition::Stay(ManagerState::Initializing {
            test,
            group,
            group_metadata,
            failure_count,
        })
    }

    fn start_next_test(
        &mut self,
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
    ) -> Transition {
        if self.browser.update_settings(&test) {
            info!(manager = %self.id, test_id = %test.id, "browser settings changed, restarting");
            return Transition::Enter(ManagerState::Restarting {
                test,
                group,
                group_metadata,
                force_stop: false,
            });
        }

        let command = WorkerCommand::RunTest {
            test: Test::clone(&test),
        };
        let sent = self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.send(command).is_ok());
        if !sent {
            warn!(manager = %self.id, test_id = %test.id, "worker went away before test started");
            return Transition::Enter(ManagerState::Restarting {
                test,
                group,
                group_metadata,
                force_stop: false,
            });
        }

        self.run_count += 1;
        let started = Instant::now();
        self.in_flight = Some(InFlight {
            started,
            deadline: started.checked_add(self.settings.external_timeout(&test)),
        });
        self.emit(RunnerEventKind::TestStarted {
            manager: self.id,
            test: test.clone(),
            attempt: self.run_count,
        });

        Transition::Stay(ManagerState::Running {
            test,
            group,
            group_metadata,
        })
    }

    // ---
    // Events
    // ---

    async fn next_event(&mut self) -> ManagerEvent {
        enum Wake {
            Event(ManagerEvent),
            StopChanged(bool),
            Tick,
        }

        let init_deadline = self.browser.init_deadline();
        let test_deadline = self
            .in_flight
            .as_ref()
            .and_then(|in_flight| in_flight.deadline);
        let poll_interval = self.settings.poll_interval();
        let mut poll = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);

        loop {
            let wake = tokio::select! {
                changed = self.stop_rx.changed(), if !self.stop_closed => {
                    Wake::StopChanged(changed.is_ok())
                }
                message = recv_message(self.worker.as_mut()) => {
                    Wake::Event(message.map_or(ManagerEvent::WorkerGone, ManagerEvent::Message))
                }
                () = sleep_until(init_deadline) => Wake::Event(ManagerEvent::InitTimeout),
                () = sleep_until(test_deadline) => Wake::Event(ManagerEvent::TestTimeout),
                _ = poll.tick() => Wake::Tick,
            };

            match wake {
                Wake::Event(event) => return event,
                Wake::StopChanged(true) => {
                    if self.stop_requested() {
                        return ManagerEvent::Stop;
                    }
                }
                Wake::StopChanged(false) => {
                    // Nobody can set the flag any more.
                    self.stop_closed = true;
                }
                Wake::Tick => {
                    if let Some(worker) = &mut self.worker {
                        if !worker.is_alive() {
                            // Messages sent before the worker exited are handled first.
                            return worker
                                .try_recv()
                                .map_or(ManagerEvent::WorkerGone, ManagerEvent::Message);
                        }
                    }
                }
            }
        }
    }

    async fn on_event(&mut self, state: ManagerState, event: ManagerEvent) -> Transition {
        match event {
            ManagerEvent::Stop => Transition::Stay(state),
            ManagerEvent::Message(message) => self.on_message(state, message).await,
            ManagerEvent::WorkerGone => self.worker_gone(state).await,
            ManagerEvent::InitTimeout => match state {
                ManagerState::Initializing {
                    test,
                    group,
                    group_metadata,
                    failure_count,
                } => {
                    warn!(
                        manager = %self.id,
                        "initialization did not finish within {}",
                        format_duration(self.settings.init_timeout()),
                    );
                    self.init_failed(test, group, group_metadata, failure_count)
                        .await
                }
                other => {
                    self.browser.after_init();
                    Transition::Stay(other)
                }
            },
            ManagerEvent::TestTimeout => match state {
                ManagerState::Running { ref test, .. } if self.in_flight.is_some() => {
                    let timeout = self.settings.external_timeout(test);
                    warn!(
                        manager = %self.id,
                        test_id = %test.id,
                        "test did not finish within {}, killing browser",
                        format_duration(timeout),
                    );
                    self.browser.stop(true);
                    let outcome = TestOutcome::external_timeout(format!(
                        "test did not respond within {}",
                        format_duration(timeout)
                    ));
                    self.test_ended(state, outcome).await
                }
                other => {
                    self.in_flight = None;
                    Transition::Stay(other)
                }
            },
        }
    }

    async fn on_message(&mut self, state: ManagerState, message: WorkerMessage) -> Transition {
        match message {
            WorkerMessage::InitSucceeded => match state {
                ManagerState::Initializing {
                    test,
                    group,
                    group_metadata,
                    ..
                } => {
                    self.browser.after_init();
                    Transition::Enter(ManagerState::Running {
                        test,
                        group,
                        group_metadata,
                    })
                }
                other => self.ignore_message(other, "init_succeeded"),
            },
            WorkerMessage::InitFailed { message } => match state {
                ManagerState::Initializing {
                    test,
                    group,
                    group_metadata,
                    failure_count,
                } => {
                    warn!(manager = %self.id, "worker failed to initialize: {message}");
                    self.init_failed(test, group, group_metadata, failure_count)
                        .await
                }
                other => self.ignore_message(other, "init_failed"),
            },
            WorkerMessage::TestEnded { test_id, outcome } => match state {
                ManagerState::Running { ref test, .. }
                    if self.in_flight.is_some() && test.id == test_id =>
                {
                    self.test_ended(state, outcome).await
                }
                other => self.ignore_message(other, "test_ended"),
            },
            WorkerMessage::WaitFinished => {
                if self.paused {
                    self.wait_finished(state)
                } else {
                    self.ignore_message(state, "wait_finished")
                }
            }
            WorkerMessage::Error { message } => self.worker_error(state, message).await,
            WorkerMessage::Log { level, message } => {
                self.emit(RunnerEventKind::WorkerLog {
                    manager: self.id,
                    level,
                    message,
                });
                Transition::Stay(state)
            }
        }
    }

    fn ignore_message(&self, state: ManagerState, message: &str) -> Transition {
        debug!(manager = %self.id, state = %state.kind(), "ignoring unexpected {message} message");
        Transition::Stay(state)
    }

    async fn worker_error(&mut self, state: ManagerState, message: String) -> Transition {
        warn!(manager = %self.id, "worker error: {message}");
        match state {
            ManagerState::Initializing {
                test,
                group,
                group_metadata,
                failure_count,
            } => {
                self.init_failed(test, group, group_metadata, failure_count)
                    .await
            }
            ManagerState::Running { .. } if self.in_flight.is_some() => {
                self.test_ended(state, TestOutcome::internal_error(message))
                    .await
            }
            ManagerState::Running { .. } if self.paused => self.wait_finished(state),
            ManagerState::Running {
                test,
                group,
                group_metadata,
            } => Transition::Enter(ManagerState::Restarting {
                test,
                group,
                group_metadata,
                force_stop: false,
            }),
            other => Transition::Stay(other),
        }
    }

    async fn worker_gone(&mut self, state: ManagerState) -> Transition {
        match state {
            ManagerState::Initializing {
                test,
                group,
                group_metadata,
                failure_count,
            } => {
                warn!(manager = %self.id, "worker exited during initialization");
                self.init_failed(test, group, group_metadata, failure_count)
                    .await
            }
            ManagerState::Running { ref test, .. } if self.in_flight.is_some() => {
                self.in_flight = None;
                self.critical(format!("last test did not complete: {}", test.id));
                Transition::Enter(ManagerState::Error)
            }
            ManagerState::Running { .. } if self.paused => self.wait_finished(state),
            ManagerState::Running {
                test,
                group,
                group_metadata,
            } => {
                info!(manager = %self.id, "worker exited between tests, restarting");
                Transition::Enter(ManagerState::Restarting {
                    test,
                    group,
                    group_metadata,
                    force_stop: false,
                })
            }
            other => {
                // Nothing is waiting on this worker any more.
                self.worker = None;
                Transition::Stay(other)
            }
        }
    }

    async fn init_failed(
        &mut self,
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
        failure_count: usize,
    ) -> Transition {
        if self.browser.check_crash(None) {
            warn!(manager = %self.id, "browser crashed during initialization");
        }
        self.browser.after_init();
        self.stop_runner(true).await;
        Transition::Enter(ManagerState::Initializing {
            test,
            group,
            group_metadata,
            failure_count: failure_count + 1,
        })
    }

    // ---
    // Test results
    // ---

    async fn test_ended(&mut self, state: ManagerState, outcome: TestOutcome) -> Transition {
        let (test, group, group_metadata) = match state {
            ManagerState::Running {
                test,
                group,
                group_metadata,
            } => (test, group, group_metadata),
            other => return Transition::Stay(other),
        };
        let duration = self
            .in_flight
            .take()
            .map(|in_flight| in_flight.started.elapsed())
            .unwrap_or_default();

        let mut subtests_unexpected = 0;
        for result in &outcome.subtests {
            if test.is_subtest_disabled(&result.name) {
                continue;
            }
            let unexpected = test.is_unexpected(Some(&result.name), result.status);
            subtests_unexpected += usize::from(unexpected);
            self.emit(RunnerEventKind::SubtestFinished {
                manager: self.id,
                test: test.clone(),
                result: result.clone(),
                expected: test.expected(Some(&result.name)),
                unexpected,
            });
        }

        let mut harness_status = outcome.status;
        if self.browser.check_crash(Some(&test)) && harness_status != HarnessStatus::CRASH {
            warn!(
                manager = %self.id,
                test_id = %test.id,
                "browser crashed, changing status from {harness_status} to CRASH",
            );
            harness_status = HarnessStatus::CRASH;
        }
        let status = harness_status.to_public();
        let unexpected = test.is_unexpected(None, status);

        if let (Some(range), Some(count)) = (test.assertion_count, outcome.extra.assertion_count) {
            self.emit(RunnerEventKind::AssertionCount {
                manager: self.id,
                test: test.clone(),
                count,
                range,
            });
        }

        self.emit(RunnerEventKind::TestFinished {
            manager: self.id,
            test: test.clone(),
            status,
            harness_status,
            expected: test.expected(None),
            message: outcome.message,
            stack: outcome.stack,
            unexpected,
            subtests_unexpected,
            duration,
        });

        let any_unexpected = unexpected || subtests_unexpected > 0;
        let restart = test.restart_after
            || harness_status.forces_restart()
            || (any_unexpected && self.settings.restart_on_unexpected());
        let force_stop =
            test.test_type == TestType::Wdspec && harness_status == HarnessStatus::ExternalTimeout;

        let pause = (self.settings.pause_after_test()
            && !matches!(
                harness_status,
                HarnessStatus::Public(Status::Crash) | HarnessStatus::ExternalTimeout
            ))
            || (self.settings.pause_on_unexpected() && any_unexpected);
        if pause {
            let waiting = self
                .worker
                .as_ref()
                .is_some_and(|worker| worker.send(WorkerCommand::Wait).is_ok());
            if waiting {
                info!(manager = %self.id, "pausing until the browser is closed");
                self.paused = true;
                return Transition::Stay(ManagerState::Running {
                    test,
                    group,
                    group_metadata,
                });
            }
        }

        self.after_test_end(test, group, group_metadata, restart, force_stop)
    }

    fn wait_finished(&mut self, state: ManagerState) -> Transition {
        self.paused = false;
        match state {
            ManagerState::Running {
                test,
                group,
                group_metadata,
            } => self.after_test_end(test, group, group_metadata, true, false),
            other => Transition::Stay(other),
        }
    }

    fn after_test_end(
        &mut self,
        test: Arc<Test>,
        group: TestGroup,
        group_metadata: GroupMetadata,
        restart: bool,
        force_stop: bool,
    ) -> Transition {
        let (test, group, group_metadata, restart) = if self.run_count >= self.settings.rerun() {
            self.run_count = 0;
            match self.next_test(group, group_metadata) {
                Some((next, group, group_metadata, new_group)) => {
                    (next, group, group_metadata, restart || new_group)
                }
                None => return Transition::Enter(ManagerState::Stop { force_stop }),
            }
        } else {
            (test, group, group_metadata, restart)
        };

        if restart {
            Transition::Enter(ManagerState::Restarting {
                test,
                group,
                group_metadata,
                force_stop,
            })
        } else {
            Transition::Enter(ManagerState::Running {
                test,
                group,
                group_metadata,
            })
        }
    }

    // ---
    // Helpers
    // ---

    /// Returns the next test, from the current group if possible. The final element is true if
    /// the test comes from a new group.
    fn next_test(
        &mut self,
        mut group: TestGroup,
        group_metadata: GroupMetadata,
    ) -> Option<(Arc<Test>, TestGroup, GroupMetadata, bool)> {
        if let Some(test) = group.pop_front() {
            return Some((test, group, group_metadata, false));
        }
        let (test, group, group_metadata) = self.next_group()?;
        Some((test, group, group_metadata, true))
    }

    fn next_group(&mut self) -> Option<(Arc<Test>, TestGroup, GroupMetadata)> {
        while let Some((mut group, group_metadata)) = self.queue.pop() {
            if let Some(test) = group.pop_front() {
                debug!(
                    manager = %self.id,
                    group = %group.id(),
                    scope = %group_metadata.scope,
                    remaining = group.len(),
                    "took group",
                );
                return Some((test, group, group_metadata));
            }
        }
        None
    }

    /// Stops the worker and the browser.
    async fn stop_runner(&mut self, force: bool) {
        self.in_flight = None;
        self.paused = false;
        let worker = self.worker.take();
        self.browser.stop(force);
        if let Some(worker) = worker {
            worker.shutdown(self.settings.stop_grace_period()).await;
        }
    }

    async fn teardown(&mut self, state: ManagerState) {
        let force = !matches!(state, ManagerState::Stop { force_stop: false });
        if !state.is_terminal() {
            info!(manager = %self.id, state = %state.kind(), "stop requested, shutting down");
        }
        self.stop_runner(force).await;
        self.browser.cleanup();
        if !state.is_terminal() {
            self.emit(RunnerEventKind::ManagerStateChanged {
                manager: self.id,
                state: super::ManagerStateKind::Stop,
            });
        }
    }

    fn stop_requested(&self) -> bool {
        *self.stop_rx.borrow()
    }

    fn critical(&self, message: String) {
        warn!(manager = %self.id, "{message}");
        self.emit(RunnerEventKind::ManagerCritical {
            manager: self.id,
            message,
        });
    }

    fn emit(&self, kind: RunnerEventKind) {
        // The receiver only goes away once the run is over.
        let _ = self.events.send(kind);
    }
}

async fn recv_message(worker: Option<&mut Worker>) -> Option<WorkerMessage> {
    match worker {
        Some(worker) => worker.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
