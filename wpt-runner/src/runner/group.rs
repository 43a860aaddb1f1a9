// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunnerManager, RunnerSettings, SettingsOverrides};
use crate::{
    browser::BrowserManager,
    config::{Processes, TestGrouping, WptProfile},
    errors::{ManagerGroupBuildError, ManagerGroupRunError},
    list::Test,
    product::{BrowserProduct, ProductArgs},
    reporter::events::{CancelReason, ManagerId, RunStats, RunnerEvent, RunnerEventKind},
    signal::{SignalHandler, SignalHandlerKind},
    time::{StopwatchStart, stopwatch},
    worker::WorkerLauncher,
};
use std::sync::Arc;
use tokio::{
    runtime::Runtime,
    sync::{mpsc, watch},
};
use tracing::debug;
use wpt_metadata::TestType;

/// Builder for a [`ManagerGroup`].
///
/// Values set here override the profile passed to [`Self::build`].
#[derive(Debug, Default)]
pub struct ManagerGroupBuilder {
    overrides: SettingsOverrides,
}

impl ManagerGroupBuilder {
    /// Sets the number of runners.
    pub fn set_processes(&mut self, processes: Processes) -> &mut Self {
        self.overrides.processes = Some(processes);
        self
    }

    /// Sets the number of consecutive initialization failures tolerated per runner.
    pub fn set_max_restarts(&mut self, max_restarts: usize) -> &mut Self {
        self.overrides.max_restarts = Some(max_restarts);
        self
    }

    /// Sets whether unexpected results restart the browser.
    pub fn set_restart_on_unexpected(&mut self, restart_on_unexpected: bool) -> &mut Self {
        self.overrides.restart_on_unexpected = Some(restart_on_unexpected);
        self
    }

    /// Sets the number of times each test is run.
    pub fn set_rerun(&mut self, rerun: usize) -> &mut Self {
        self.overrides.rerun = Some(rerun);
        self
    }

    /// Sets the factor applied to timeouts.
    pub fn set_timeout_multiplier(&mut self, timeout_multiplier: f64) -> &mut Self {
        self.overrides.timeout_multiplier = Some(timeout_multiplier);
        self
    }

    /// Sets whether to wait for the browser to be closed after each test.
    pub fn set_pause_after_test(&mut self, pause_after_test: bool) -> &mut Self {
        self.overrides.pause_after_test = Some(pause_after_test);
        self
    }

    /// Sets whether to wait for the browser to be closed after unexpected results.
    pub fn set_pause_on_unexpected(&mut self, pause_on_unexpected: bool) -> &mut Self {
        self.overrides.pause_on_unexpected = Some(pause_on_unexpected);
        self
    }

    /// Sets how tests are split into groups.
    pub fn set_test_grouping(&mut self, test_grouping: TestGrouping) -> &mut Self {
        self.overrides.test_grouping = Some(test_grouping);
        self
    }

    /// Creates a new manager group.
    pub fn build(
        &self,
        profile: &WptProfile<'_>,
        product: Arc<dyn BrowserProduct>,
        product_args: ProductArgs,
        launcher: WorkerLauncher,
        signal_handler: SignalHandlerKind,
    ) -> Result<ManagerGroup, ManagerGroupBuildError> {
        let mut settings = RunnerSettings::from_profile(profile);
        self.overrides.apply(&mut settings);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("wptrunner-manager")
            .build()
            .map_err(ManagerGroupBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        let (stop_tx, _) = watch::channel(false);
        Ok(ManagerGroup {
            settings: Arc::new(settings),
            product,
            product_args,
            launcher,
            runtime,
            stop_tx: Arc::new(stop_tx),
            signal_handler,
        })
    }
}

/// Runs tests of one type at a time across a set of runners.
///
/// Created using [`ManagerGroupBuilder::build`].
#[derive(Debug)]
pub struct ManagerGroup {
    settings: Arc<RunnerSettings>,
    product: Arc<dyn BrowserProduct>,
    product_args: ProductArgs,
    launcher: WorkerLauncher,
    runtime: Runtime,
    stop_tx: Arc<watch::Sender<bool>>,
    signal_handler: SignalHandler,
}

impl ManagerGroup {
    /// Returns the resolved settings.
    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Returns a handle that can be used to stop every runner.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            sender: self.stop_tx.clone(),
        }
    }

    /// Runs `tests`, all of which must be of type `test_type`.
    ///
    /// Disabled tests are reported as skipped. The remaining tests are split into groups, and up to
    /// `processes` runners take groups from the queue until it's empty. The callback is called with
    /// every event, in order, on the current thread.
    ///
    /// Returns once every runner has exited. Returns an error if a browser couldn't be created, in
    /// which case no runner was started, or if any runner panicked.
    pub fn run<F>(
        &mut self,
        test_type: TestType,
        tests: Vec<Arc<Test>>,
        callback: F,
    ) -> Result<RunStats, ManagerGroupRunError>
    where
        F: FnMut(RunnerEvent),
    {
        let (enabled, disabled): (Vec<_>, Vec<_>) =
            tests.into_iter().partition(|test| test.disabled.is_none());
        let test_count = enabled.len();

        let source = self
            .settings
            .test_grouping()
            .make_source(self.settings.processes());
        let queue = source.make_queue(enabled);
        let runner_count = queue.len().min(self.settings.processes()).max(1);

        // Create every browser before starting anything, so bad arguments fail the run cleanly.
        let mut browsers = Vec::with_capacity(runner_count);
        for index in 0..runner_count {
            let manager = ManagerId::new(index);
            let browser = self
                .product
                .browser(&self.product_args, manager)
                .map_err(|error| ManagerGroupRunError::CreateBrowser { manager, error })?;
            browsers.push((manager, browser));
        }

        let mut cx = EventContext {
            callback,
            stopwatch: stopwatch(),
            stats: RunStats {
                initial_run_count: test_count * self.settings.rerun(),
                ..RunStats::default()
            },
        };
        cx.emit(RunnerEventKind::RunStarted {
            test_type,
            test_count,
            runner_count,
        });
        for test in disabled {
            let reason = test.disabled.clone().unwrap_or_default();
            cx.emit(RunnerEventKind::TestSkipped { test, reason });
        }

        let mut stop_rx = self.stop_tx.subscribe();
        let mut cancelled = *stop_rx.borrow();
        if cancelled {
            cx.emit(RunnerEventKind::RunBeginCancel {
                reason: CancelReason::StopRequested,
            });
        }

        debug!(%test_type, test_count, runner_count, groups = queue.len(), "starting runners");
        let _guard = self.runtime.enter();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let handles: Vec<_> = browsers
            .into_iter()
            .map(|(id, browser)| {
                let manager = RunnerManager::new(
                    id,
                    test_type,
                    self.settings.clone(),
                    self.launcher.clone(),
                    queue.clone(),
                    BrowserManager::new(browser, self.settings.init_timeout()),
                    event_tx.clone(),
                    self.stop_tx.subscribe(),
                );
                self.runtime.spawn(manager.run())
            })
            .collect();
        drop(event_tx);

        let stop_tx = &self.stop_tx;
        let signal_handler = &mut self.signal_handler;
        let cx_mut = &mut cx;
        let panicked = self.runtime.block_on(async move {
            let mut signals_done = false;
            let mut stop_closed = false;
            loop {
                tokio::select! {
                    event = event_rx.recv() => match event {
                        Some(kind) => cx_mut.emit(kind),
                        None => break,
                    },
                    signal = signal_handler.recv(), if !signals_done => match signal {
                        Some(event) => {
                            if !cancelled {
                                cancelled = true;
                                cx_mut.emit(RunnerEventKind::RunBeginCancel {
                                    reason: CancelReason::Signal(event),
                                });
                            }
                            stop_tx.send_replace(true);
                        }
                        None => signals_done = true,
                    },
                    changed = stop_rx.changed(), if !stop_closed => {
                        if changed.is_err() {
                            stop_closed = true;
                        } else if *stop_rx.borrow_and_update() && !cancelled {
                            cancelled = true;
                            cx_mut.emit(RunnerEventKind::RunBeginCancel {
                                reason: CancelReason::StopRequested,
                            });
                        }
                    }
                }
            }

            let mut panicked = 0;
            for handle in handles {
                if let Err(error) = handle.await {
                    if error.is_panic() {
                        panicked += 1;
                    }
                }
            }
            panicked
        });

        let stats = cx.stats;
        cx.emit(RunnerEventKind::RunFinished { test_type, stats });

        if panicked > 0 {
            Err(ManagerGroupRunError::RunnerPanicked { count: panicked })
        } else {
            Ok(stats)
        }
    }
}

struct EventContext<F> {
    callback: F,
    stopwatch: StopwatchStart,
    stats: RunStats,
}

impl<F: FnMut(RunnerEvent)> EventContext<F> {
    fn emit(&mut self, kind: RunnerEventKind) {
        self.stats.on_event(&kind);
        let snapshot = self.stopwatch.snapshot();
        (self.callback)(RunnerEvent {
            timestamp: snapshot.now(),
            elapsed: snapshot.duration,
            kind,
        });
    }
}

/// A handle that stops every runner in a [`ManagerGroup`].
///
/// Runners notice the flag at their next event, stop their browser and worker, and exit. Tests
/// that haven't started are not run.
#[derive(Clone, Debug)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Sets the stop flag.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    /// Returns true if the stop flag is set.
    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }
}
