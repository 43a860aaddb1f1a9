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
use std::{
    io::{self, BufRead, Write},
    process::Stdio,
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
    sync::mpsc,
};
use tracing::{debug, warn};

/// Spawns a worker process speaking the JSON-lines protocol over stdin and stdout.
///
/// Must be called from within a Tokio runtime.
pub(super) fn launch(
    program: &str,
    args: &[String],
    manager: ManagerId,
) -> Result<Worker, WorkerSpawnError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|error| WorkerSpawnError::Process {
            manager,
            program: program.to_owned(),
            error,
        })?;

    let mut stdin = child.stdin.take().ok_or(WorkerSpawnError::MissingPipe {
        manager,
        stream: "stdin",
    })?;
    let stdout = child.stdout.take().ok_or(WorkerSpawnError::MissingPipe {
        manager,
        stream: "stdout",
    })?;

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<WorkerCommand>();
    let (message_tx, message_rx) = mpsc::unbounded_channel();

    // Writer: ends when the runner drops its sender, which closes the child's stdin.
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            let mut line = match serde_json::to_vec(&command) {
                Ok(line) => line,
                Err(error) => {
                    warn!(%manager, %error, "failed to serialize worker command");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(error) = stdin.write_all(&line).await {
                debug!(%manager, %error, "worker stdin closed");
                break;
            }
            if stdin.flush().await.is_err() {
                break;
            }
        }
    });

    // Reader: ends at EOF, which drops the message sender and tells the runner the worker is gone.
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match serde_json::from_str::<WorkerMessage>(&line) {
                    Ok(message) => {
                        if message_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(%manager, %error, line = %line, "ignoring malformed worker output")
                    }
                },
                Ok(None) => break,
                Err(error) => {
                    warn!(%manager, %error, "error reading worker output");
                    break;
                }
            }
        }
    });

    Ok(Worker::new(
        manager,
        command_tx,
        message_rx,
        WorkerHandle::Process(child),
    ))
}

struct StdioTransport<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> WorkerTransport for StdioTransport<R, W> {
    fn recv(&mut self) -> Option<WorkerCommand> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) if line.trim().is_empty() => {}
                Ok(_) => match serde_json::from_str(&line) {
                    Ok(command) => return Some(command),
                    Err(error) => warn!(%error, line = line.trim_end(), "ignoring malformed command"),
                },
                Err(error) => {
                    warn!(%error, "error reading commands");
                    return None;
                }
            }
        }
    }

    fn send(&mut self, message: WorkerMessage) -> Result<(), WorkerSendError> {
        serde_json::to_writer(&mut self.writer, &message).map_err(|_| WorkerSendError)?;
        self.writer.write_all(b"\n").map_err(|_| WorkerSendError)?;
        self.writer.flush().map_err(|_| WorkerSendError)
    }
}

/// Runs the worker loop over this process's stdin and stdout.
///
/// This is the entry point for processes launched through
/// [`WorkerLauncher::process`](super::WorkerLauncher::process). Nothing else may write to stdout
/// while it runs.
pub fn serve_stdio(factory: &dyn ExecutorFactory) -> io::Result<()> {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    serve(factory, stdin, stdout);
    Ok(())
}

fn serve(factory: &dyn ExecutorFactory, reader: impl BufRead, writer: impl Write) {
    let mut transport = StdioTransport { reader, writer };
    run_worker(factory, &mut transport);
}
