// Copyright (c) The wptrunner-rs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    ExecutorFactory, Worker, WorkerCommand, WorkerHandle, WorkerMessage, WorkerTransport,
    run_worker,
};
use crate::{
    errors::{WorkerSendError, WorkerSpawnError},
    reporter::events::ManagerId,
};
use std::sync::Arc;
use tokio::sync::mpsc;

struct ChannelTransport {
    commands: mpsc::UnboundedReceiver<WorkerCommand>,
    messages: mpsc::UnboundedSender<WorkerMessage>,
}

impl WorkerTransport for ChannelTransport {
    fn recv(&mut self) -> Option<WorkerCommand> {
        self.commands.blocking_recv()
    }

    fn send(&mut self, message: WorkerMessage) -> Result<(), WorkerSendError> {
        self.messages.send(message).map_err(|_| WorkerSendError)
    }
}

/// Runs the worker loop on a dedicated OS thread.
///
/// If the executor panics, the thread exits and its end of the message channel is dropped, which
/// the runner sees as the worker dying.
pub(super) fn launch(
    factory: Arc<dyn ExecutorFactory>,
    manager: ManagerId,
) -> Result<Worker, WorkerSpawnError> {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (message_tx, message_rx) = mpsc::unbounded_channel();
    let mut transport = ChannelTransport {
        commands: command_rx,
        messages: message_tx,
    };

    let handle = std::thread::Builder::new()
        .name(format!("wptrunner-worker-{}", manager.index()))
        .spawn(move || run_worker(&*factory, &mut transport))
        .map_err(|error| WorkerSpawnError::Thread { manager, error })?;

    Ok(Worker::new(
        manager,
        command_tx,
        message_rx,
        WorkerHandle::Thread(handle),
    ))
}
