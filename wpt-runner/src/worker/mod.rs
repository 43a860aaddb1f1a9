// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workers run tests on behalf of a runner.
//!
//! A worker owns an [`Executor`], and talks to its runner through [`WorkerCommand`]s and
//! [`WorkerMessage`]s. Workers are started through a [`WorkerLauncher`], either on a thread in the
//! current process or as a separate process speaking JSON lines over its standard streams.

mod executor;
mod process;
mod protocol;
mod thread;

pub use executor::*;
pub use process::serve_stdio;
pub use protocol::*;

use crate::{
    errors::{WorkerSendError, WorkerSpawnError},
    reporter::events::ManagerId,
};
use std::{fmt, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How workers are started.
#[derive(Clone)]
pub enum WorkerLauncher {
    /// Run each worker on a dedicated thread.
    Thread {
        /// Creates executors inside the worker.
        factory: Arc<dyn ExecutorFactory>,
    },

    /// Run each worker as a separate process, which should call [`serve_stdio`].
    Process {
        /// The program to run.
        program: String,

        /// Arguments to the program.
        args: Vec<String>,
    },
}

impl WorkerLauncher {
    /// Creates a launcher running workers on threads.
    pub fn thread(factory: Arc<dyn ExecutorFactory>) -> Self {
        Self::Thread { factory }
    }

    /// Creates a launcher running workers as processes.
    pub fn process(program: impl Into<String>, args: Vec<String>) -> Self {
        Self::Process {
            program: program.into(),
            args,
        }
    }

    /// Starts a worker for the given runner.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn launch(&self, manager: ManagerId) -> Result<Worker, WorkerSpawnError> {
        match self {
            Self::Thread { factory } => thread::launch(factory.clone(), manager),
            Self::Process { program, args } => process::launch(program, args, manager),
        }
    }
}

impl fmt::Debug for WorkerLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread { factory } => f.debug_struct("Thread").field("factory", factory).finish(),
            Self::Process { program, args } => f
                .debug_struct("Process")
                .field("program", program)
                .field("args", args)
                .finish(),
        }
    }
}

/// A running worker, as seen by its runner.
#[derive(Debug)]
pub struct Worker {
    manager: ManagerId,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    messages: mpsc::UnboundedReceiver<WorkerMessage>,
    handle: WorkerHandle,
}

#[derive(Debug)]
enum WorkerHandle {
    Thread(std::thread::JoinHandle<()>),
    Process(tokio::process::Child),
}

impl Worker {
    fn new(
        manager: ManagerId,
        commands: mpsc::UnboundedSender<WorkerCommand>,
        messages: mpsc::UnboundedReceiver<WorkerMessage>,
        handle: WorkerHandle,
    ) -> Self {
        Self {
            manager,
            commands,
            messages,
            handle,
        }
    }

    /// Sends a command to the worker.
    pub fn send(&self, command: WorkerCommand) -> Result<(), WorkerSendError> {
        self.commands.send(command).map_err(|_| WorkerSendError)
    }

    /// Waits for the next message. Returns `None` once the worker has exited.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.messages.recv().await
    }

    /// Returns a message that has already arrived, without waiting.
    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.messages.try_recv().ok()
    }

    /// Returns true if the worker thread or process is still running.
    pub fn is_alive(&mut self) -> bool {
        match &mut self.handle {
            WorkerHandle::Thread(handle) => !handle.is_finished(),
            WorkerHandle::Process(child) => matches!(child.try_wait(), Ok(None)),
        }
    }

    /// Asks the worker to stop and waits up to `grace` for it to exit.
    ///
    /// A process that doesn't exit in time is killed. A thread can't be killed, so it's detached
    /// instead.
    pub async fn shutdown(self, grace: Duration) {
        let Self {
            manager,
            commands,
            messages,
            handle,
        } = self;
        // The worker may already be gone, in which case there's nobody to tell.
        let _ = commands.send(WorkerCommand::Stop);
        drop(commands);
        drop(messages);

        match handle {
            WorkerHandle::Thread(handle) => {
                let deadline = tokio::time::Instant::now().checked_add(grace);
                while !handle.is_finished() {
                    if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
                        warn!(%manager, "worker thread did not exit within {grace:?}, detaching it");
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                if handle.join().is_err() {
                    warn!(%manager, "worker thread panicked");
                } else {
                    debug!(%manager, "worker thread exited");
                }
            }
            WorkerHandle::Process(mut child) => {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => debug!(%manager, %status, "worker process exited"),
                    Ok(Err(error)) => warn!(%manager, %error, "error waiting for worker process"),
                    Err(_) => {
                        warn!(%manager, "worker process did not exit within {grace:?}, killing it");
                        if let Err(error) = child.kill().await {
                            warn!(%manager, %error, "error killing worker process");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        browser::ExecutorBrowser,
        errors::ExecutorError,
        list::{GroupMetadata, Test},
        results::TestOutcome,
    };
    use wpt_metadata::{Status, TestType};

    #[derive(Debug)]
    struct PanickingFactory;

    impl ExecutorFactory for PanickingFactory {
        fn create(&self, _test_type: TestType) -> Result<Box<dyn Executor>, ExecutorError> {
            Ok(Box::new(PanickingExecutor))
        }
    }

    struct PanickingExecutor;

    impl Executor for PanickingExecutor {
        fn setup(
            &mut self,
            _browser: &ExecutorBrowser,
            _context: &ExecutorContext,
        ) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn run_test(&mut self, test: &Test) -> Result<TestOutcome, ExecutorError> {
            if test.id.contains("panic") {
                panic!("executor panicked");
            }
            Ok(TestOutcome::new(Status::Pass))
        }
    }

    fn setup_command() -> WorkerCommand {
        WorkerCommand::Setup {
            test_type: TestType::Crashtest,
            browser: ExecutorBrowser::new("null"),
            timeout_multiplier: 1.0,
            group_metadata: GroupMetadata::new("/"),
        }
    }

    #[tokio::test]
    async fn thread_worker_runs_tests() {
        let launcher = WorkerLauncher::thread(Arc::new(PanickingFactory));
        let mut worker = launcher.launch(ManagerId::new(0)).expect("thread spawns");
        assert!(worker.is_alive());

        worker.send(setup_command()).unwrap();
        assert_eq!(worker.recv().await, Some(WorkerMessage::InitSucceeded));

        worker
            .send(WorkerCommand::RunTest {
                test: Test::new("/a.html", TestType::Crashtest),
            })
            .unwrap();
        assert!(matches!(
            worker.recv().await,
            Some(WorkerMessage::TestEnded { .. })
        ));

        worker.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn messages_outlive_exited_worker() {
        let launcher = WorkerLauncher::thread(Arc::new(PanickingFactory));
        let mut worker = launcher.launch(ManagerId::new(2)).expect("thread spawns");

        worker.send(setup_command()).unwrap();
        worker
            .send(WorkerCommand::RunTest {
                test: Test::new("/a.html", TestType::Crashtest),
            })
            .unwrap();
        worker.send(WorkerCommand::Stop).unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while worker.is_alive() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "worker thread should exit after stop"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(worker.try_recv(), Some(WorkerMessage::InitSucceeded));
        assert!(matches!(
            worker.try_recv(),
            Some(WorkerMessage::TestEnded { .. })
        ));
        assert_eq!(worker.try_recv(), None);
        worker.shutdown(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn thread_worker_panic_closes_channel() {
        let launcher = WorkerLauncher::thread(Arc::new(PanickingFactory));
        let mut worker = launcher.launch(ManagerId::new(1)).expect("thread spawns");

        worker.send(setup_command()).unwrap();
        assert_eq!(worker.recv().await, Some(WorkerMessage::InitSucceeded));
        worker
            .send(WorkerCommand::RunTest {
                test: Test::new("/panic.html", TestType::Crashtest),
            })
            .unwrap();

        // The panic unwinds the worker thread, dropping its end of the channel.
        assert_eq!(worker.recv().await, None);
        worker.shutdown(Duration::from_secs(5)).await;
    }
}
