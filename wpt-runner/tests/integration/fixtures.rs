// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use color_eyre::eyre::Result;
use indoc::indoc;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use wpt_metadata::{Status, TestType};
use wpt_runner::{
    browser::{Browser, BrowserSettings, ExecutorBrowser},
    config::WptConfig,
    errors::{BrowserError, ExecutorError, ProductArgsError},
    list::{GroupMetadata, Test},
    product::{BrowserProduct, ProductArgs},
    reporter::events::{ManagerId, RunStats, RunnerEventKind},
    results::{HarnessStatus, TestOutcome},
    runner::{ManagerGroup, ManagerGroupBuilder, ManagerStateKind},
    signal::SignalHandlerKind,
    worker::{Executor, ExecutorContext, ExecutorFactory, WorkerLauncher},
};

/// Short timeouts so that failure scenarios finish quickly.
pub(crate) const TEST_CONFIG: &str = indoc! {r#"
    [profile.default]
    init-timeout = "10s"
    external-timeout-grace = "100ms"
    stop-grace-period = "200ms"
    poll-interval = "20ms"
"#};

pub(crate) fn test_init() {
    // Ignore the result: another test may have installed the handler already.
    let _ = color_eyre::install();
}

/// What the fake executor does when asked to run a test.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Behavior {
    /// Report this status.
    Report(Status),

    /// Report `OK`, but leave the browser crashed.
    CrashBrowser,

    /// Sleep this long before reporting the expected status.
    Hang(Duration),

    /// Panic, taking the worker down with the test in flight.
    Panic,

    /// Report the expected status, with this many assertions hit.
    Assertions(u32),
}

#[derive(Debug, Default)]
struct FakeState {
    behaviors: BTreeMap<String, Behavior>,
    fail_start: bool,
    setup_delay: Option<Duration>,
    panic_on_wait: bool,
    crashed: bool,
    starts: usize,
    stops: Vec<bool>,
    runs: Vec<String>,
}

/// Shared state between the fake browsers, the fake executors and the test.
#[derive(Clone, Debug, Default)]
pub(crate) struct Fake(Arc<Mutex<FakeState>>);

impl Fake {
    pub(crate) fn with_behavior(self, test_id: &str, behavior: Behavior) -> Self {
        self.lock().behaviors.insert(test_id.to_owned(), behavior);
        self
    }

    pub(crate) fn failing_start(self) -> Self {
        self.lock().fail_start = true;
        self
    }

    /// Makes executor setup take `delay`.
    pub(crate) fn with_setup_delay(self, delay: Duration) -> Self {
        self.lock().setup_delay = Some(delay);
        self
    }

    /// Makes the executor panic while waiting for the browser to be closed.
    pub(crate) fn panicking_wait(self) -> Self {
        self.lock().panic_on_wait = true;
        self
    }

    pub(crate) fn starts(&self) -> usize {
        self.lock().starts
    }

    pub(crate) fn stops(&self) -> usize {
        self.lock().stops.len()
    }

    /// The `force` argument of every browser stop, in order.
    pub(crate) fn stop_forces(&self) -> Vec<bool> {
        self.lock().stops.clone()
    }

    pub(crate) fn runs(&self) -> Vec<String> {
        self.lock().runs.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.0.lock().unwrap()
    }
}

#[derive(Debug)]
pub(crate) struct FakeProduct {
    fake: Fake,
}

impl BrowserProduct for FakeProduct {
    fn name(&self) -> &str {
        "fake"
    }

    fn supported_test_types(&self) -> &[TestType] {
        &TestType::ALL
    }

    fn check_args(&self, _args: &ProductArgs) -> Result<(), ProductArgsError> {
        Ok(())
    }

    fn browser(
        &self,
        _args: &ProductArgs,
        _manager: ManagerId,
    ) -> Result<Box<dyn Browser>, ProductArgsError> {
        Ok(Box::new(FakeBrowser {
            fake: self.fake.clone(),
            running: false,
        }))
    }

    fn executor_factory(
        &self,
        _args: &ProductArgs,
    ) -> Result<Arc<dyn ExecutorFactory>, ProductArgsError> {
        Ok(Arc::new(FakeExecutorFactory {
            fake: self.fake.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeBrowser {
    fake: Fake,
    running: bool,
}

impl Browser for FakeBrowser {
    fn start(
        &mut self,
        _group_metadata: &GroupMetadata,
        _settings: &BrowserSettings,
    ) -> Result<(), BrowserError> {
        let mut state = self.fake.lock();
        state.starts += 1;
        if state.fail_start {
            return Err(BrowserError::other("refused to start"));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self, force: bool) -> bool {
        self.fake.lock().stops.push(force);
        self.running = false;
        true
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    fn is_alive(&mut self) -> bool {
        self.running
    }

    fn check_crash(&mut self, _test: Option<&Test>) -> bool {
        std::mem::take(&mut self.fake.lock().crashed)
    }

    fn settings(&self, test: &Test) -> BrowserSettings {
        test.prefs
            .iter()
            .fold(BrowserSettings::new(), |settings, (name, value)| {
                settings.with(name.clone(), value.clone())
            })
    }

    fn executor_browser(&self) -> ExecutorBrowser {
        ExecutorBrowser::new("fake")
    }
}

#[derive(Debug)]
struct FakeExecutorFactory {
    fake: Fake,
}

impl ExecutorFactory for FakeExecutorFactory {
    fn create(&self, _test_type: TestType) -> Result<Box<dyn Executor>, ExecutorError> {
        Ok(Box::new(FakeExecutor {
            fake: self.fake.clone(),
        }))
    }
}

struct FakeExecutor {
    fake: Fake,
}

impl Executor for FakeExecutor {
    fn setup(
        &mut self,
        _browser: &ExecutorBrowser,
        _context: &ExecutorContext,
    ) -> Result<(), ExecutorError> {
        let delay = self.fake.lock().setup_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<(), ExecutorError> {
        if self.fake.lock().panic_on_wait {
            panic!("executor panicked while waiting");
        }
        Ok(())
    }

    fn run_test(&mut self, test: &Test) -> Result<TestOutcome, ExecutorError> {
        // The lock must not be held while hanging.
        let behavior = {
            let mut state = self.fake.lock();
            state.runs.push(test.id.clone());
            state.behaviors.get(&test.id).copied()
        };
        match behavior.unwrap_or(Behavior::Report(test.expected)) {
            Behavior::Report(status) => Ok(TestOutcome::new(status)),
            Behavior::CrashBrowser => {
                self.fake.lock().crashed = true;
                Ok(TestOutcome::new(Status::Ok))
            }
            Behavior::Hang(duration) => {
                std::thread::sleep(duration);
                Ok(TestOutcome::new(test.expected))
            }
            Behavior::Panic => panic!("executor panicked running {}", test.id),
            Behavior::Assertions(count) => {
                Ok(TestOutcome::new(test.expected).with_assertion_count(count))
            }
        }
    }
}

pub(crate) fn testharness(id: &str) -> Test {
    Test::new(id, TestType::Testharness)
}

/// Builds a manager group for the fake product, with [`TEST_CONFIG`] as the configuration.
pub(crate) fn build_group(
    fake: &Fake,
    configure: impl FnOnce(&mut ManagerGroupBuilder),
) -> Result<ManagerGroup> {
    build_group_with_launcher(fake, None, configure)
}

/// Like [`build_group`], but with workers started by `launcher` instead of in-process fake
/// executors.
pub(crate) fn build_group_with_launcher(
    fake: &Fake,
    launcher: Option<WorkerLauncher>,
    configure: impl FnOnce(&mut ManagerGroupBuilder),
) -> Result<ManagerGroup> {
    let dir = camino_tempfile::tempdir()?;
    std::fs::write(dir.path().join(WptConfig::CONFIG_PATH), TEST_CONFIG)?;
    let config = WptConfig::from_sources(dir.path(), None)?;
    let profile = config.profile(WptConfig::DEFAULT_PROFILE)?;

    let product = Arc::new(FakeProduct { fake: fake.clone() });
    let args = ProductArgs::default();
    let launcher = match launcher {
        Some(launcher) => launcher,
        None => WorkerLauncher::thread(product.executor_factory(&args)?),
    };

    let mut builder = ManagerGroupBuilder::default();
    configure(&mut builder);
    let group = builder.build(&profile, product, args, launcher, SignalHandlerKind::Noop)?;
    Ok(group)
}

pub(crate) fn run_group(group: &mut ManagerGroup, tests: Vec<Test>) -> Result<RunOutput> {
    run_group_typed(group, TestType::Testharness, tests)
}

pub(crate) fn run_group_typed(
    group: &mut ManagerGroup,
    test_type: TestType,
    tests: Vec<Test>,
) -> Result<RunOutput> {
    let mut events = Vec::new();
    let tests = tests.into_iter().map(Arc::new).collect();
    let stats = group.run(test_type, tests, |event| events.push(event.kind))?;
    Ok(RunOutput { stats, events })
}

/// Runs `tests` in a fresh manager group.
pub(crate) fn run(
    fake: &Fake,
    tests: Vec<Test>,
    configure: impl FnOnce(&mut ManagerGroupBuilder),
) -> Result<RunOutput> {
    let mut group = build_group(fake, configure)?;
    run_group(&mut group, tests)
}

#[derive(Debug)]
pub(crate) struct RunOutput {
    pub(crate) stats: RunStats,
    pub(crate) events: Vec<RunnerEventKind>,
}

/// The final result of one execution, as reported by [`RunnerEventKind::TestFinished`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Finished {
    pub(crate) id: String,
    pub(crate) status: Status,
    pub(crate) harness_status: HarnessStatus,
    pub(crate) unexpected: bool,
}

impl RunOutput {
    /// The states entered by the given runner, in order.
    pub(crate) fn states(&self, manager: usize) -> Vec<ManagerStateKind> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunnerEventKind::ManagerStateChanged { manager: id, state }
                    if id.index() == manager =>
                {
                    Some(*state)
                }
                _ => None,
            })
            .collect()
    }

    /// The number of times any runner entered `kind`.
    pub(crate) fn state_count(&self, kind: ManagerStateKind) -> usize {
        self.events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    RunnerEventKind::ManagerStateChanged { state, .. } if *state == kind
                )
            })
            .count()
    }

    pub(crate) fn finished(&self) -> Vec<Finished> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunnerEventKind::TestFinished {
                    test,
                    status,
                    harness_status,
                    unexpected,
                    ..
                } => Some(Finished {
                    id: test.id.clone(),
                    status: *status,
                    harness_status: *harness_status,
                    unexpected: *unexpected,
                }),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn started_attempts(&self) -> Vec<(String, usize)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunnerEventKind::TestStarted { test, attempt, .. } => {
                    Some((test.id.clone(), *attempt))
                }
                _ => None,
            })
            .collect()
    }

    pub(crate) fn criticals(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RunnerEventKind::ManagerCritical { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}
