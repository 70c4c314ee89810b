//! Sequential, cancellable execution of packager commands.
//!
//! A session runs its commands one at a time on a tokio task. Each child gets a
//! single OS pipe for both stdout and stderr, so lines reach the caller in the
//! exact order the child wrote them. A dedicated reader thread turns the pipe
//! into lines; the session task forwards them as [`SupervisorEvent`]s over an
//! unbounded channel that the coordination side drains on its own turn.
//!
//! The first failing command (spawn error, non-zero exit, or cancellation)
//! stops the queue. [`SupervisorEvent::Completed`] is always the last event and
//! is sent exactly once.

use crate::models::{BuildCommand, BuildOutcome};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::{self, BufRead, BufReader, PipeReader};
use std::process::{ExitStatus, Stdio};
use std::thread;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Events delivered from a session to the coordination context, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Command `index` (1-based) of `total` is about to be spawned
    CommandStarted { index: usize, total: usize },

    /// One newline-stripped line of merged child output, or a supervisor notice
    OutputLine(String),

    /// The session is over; nothing follows this event
    Completed(BuildOutcome),
}

/// Why a single command stopped the queue
#[derive(Error, Debug)]
pub enum CommandFailure {
    #[error("command not found: {program}")]
    NotFound { program: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exited with code {0}")]
    NonZeroExit(i32),

    #[error("terminated by signal")]
    Signal,

    #[error("failed to read process output: {0}")]
    Output(#[source] io::Error),

    #[error("cancelled by user")]
    Cancelled,
}

impl CommandFailure {
    fn outcome(&self) -> BuildOutcome {
        match self {
            CommandFailure::Cancelled => BuildOutcome::Cancelled,
            _ => BuildOutcome::Failed,
        }
    }

    /// Line shown in the build log for this failure
    pub fn log_line(&self) -> String {
        match self {
            CommandFailure::NotFound { program } => format!(
                "[ERROR] command not found: {} (make sure it is installed and on PATH)",
                program
            ),
            CommandFailure::Cancelled => "[CANCELLED] build cancelled by user".to_string(),
            CommandFailure::Spawn { source, .. } => format!("[ERROR] {}", source),
            other => format!("[ERROR] {}", other),
        }
    }
}

/// Starts sessions on a tokio runtime.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    runtime: tokio::runtime::Handle,
}

impl ProcessSupervisor {
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }

    /// Supervisor on the runtime of the current tokio context.
    ///
    /// Panics outside a tokio runtime, like [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    /// Begin running `commands` in `cwd`. Returns immediately.
    pub fn start(&self, commands: Vec<BuildCommand>, cwd: &Utf8Path) -> ExecutionSession {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let state = SessionState {
            commands,
            current_index: 0,
            cwd: cwd.to_path_buf(),
        };

        tracing::info!(
            "Starting build session: {} command(s) in {}",
            state.commands.len(),
            state.cwd
        );

        let task = self.runtime.spawn(run_session(state, events_tx, cancel_rx));

        ExecutionSession {
            events: events_rx,
            cancel_tx,
            task,
            finished: false,
        }
    }
}

/// Handle to one running session.
///
/// Dropping the handle counts as a cancellation request.
#[derive(Debug)]
pub struct ExecutionSession {
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    cancel_tx: watch::Sender<bool>,
    task: JoinHandle<BuildOutcome>,
    finished: bool,
}

impl ExecutionSession {
    /// Ask the session to stop. The running child is killed at the next line
    /// boundary or while waiting on it, and no further commands start.
    pub fn request_cancel(&self) {
        if !self.cancel_tx.send_replace(true) {
            tracing::info!("Cancellation requested for build session");
        }
    }

    pub fn is_cancel_requested(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// True once [`SupervisorEvent::Completed`] has been received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Next event, waiting if none is queued. `None` after completion.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        self.observe(event)
    }

    /// Next queued event without waiting.
    ///
    /// `Empty` means the session is still running. `Disconnected` means no
    /// event will ever arrive: either `Completed` was already returned, or the
    /// session task died without sending it (runtime shut down, task aborted).
    pub fn try_next_event(&mut self) -> Result<SupervisorEvent, TryRecvError> {
        if self.finished {
            return Err(TryRecvError::Disconnected);
        }
        let event = self.events.try_recv()?;
        self.observe(Some(event)).ok_or(TryRecvError::Disconnected)
    }

    fn observe(&mut self, event: Option<SupervisorEvent>) -> Option<SupervisorEvent> {
        match event {
            Some(SupervisorEvent::Completed(outcome)) => {
                self.finished = true;
                Some(SupervisorEvent::Completed(outcome))
            }
            Some(event) => Some(event),
            None => None,
        }
    }

    /// Drain all remaining events and return the outcome.
    pub async fn wait(mut self) -> BuildOutcome {
        let mut outcome = None;
        while let Some(event) = self.next_event().await {
            if let SupervisorEvent::Completed(result) = event {
                outcome = Some(result);
            }
        }
        match outcome {
            Some(outcome) => outcome,
            // The channel closed without a completion event: only possible if the task died
            None => (&mut self.task).await.unwrap_or(BuildOutcome::Failed),
        }
    }
}

impl Drop for ExecutionSession {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.cancel_tx.send(true);
        }
    }
}

/// Mutable state of one run, owned by the session task.
struct SessionState {
    commands: Vec<BuildCommand>,
    current_index: usize,
    cwd: Utf8PathBuf,
}

/// Sends events; a closed channel just means nobody is listening any more.
struct EventSink {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl EventSink {
    fn line(&self, text: impl Into<String>) {
        let _ = self.tx.send(SupervisorEvent::OutputLine(text.into()));
    }

    fn send(&self, event: SupervisorEvent) {
        let _ = self.tx.send(event);
    }
}

async fn run_session(
    mut state: SessionState,
    events_tx: mpsc::UnboundedSender<SupervisorEvent>,
    mut cancel_rx: watch::Receiver<bool>,
) -> BuildOutcome {
    let sink = EventSink { tx: events_tx };
    let total = state.commands.len();
    let mut outcome = BuildOutcome::Succeeded;

    while state.current_index < total {
        let command = &state.commands[state.current_index];
        state.current_index += 1;

        let result = if *cancel_rx.borrow() {
            Err(CommandFailure::Cancelled)
        } else {
            sink.send(SupervisorEvent::CommandStarted {
                index: state.current_index,
                total,
            });
            sink.line(format!("=== Running: {} ===", command.display_line()));
            run_command(command, &state.cwd, &sink, &mut cancel_rx).await
        };

        if let Err(failure) = result {
            tracing::warn!(
                "Command {}/{} stopped the session: {}",
                state.current_index,
                total,
                failure
            );
            sink.line(failure.log_line());
            outcome = failure.outcome();
            break;
        }
    }

    tracing::info!("Build session {}", outcome);
    sink.send(SupervisorEvent::Completed(outcome));
    outcome
}

/// Resolves once cancellation is requested or the session handle is gone.
async fn cancellation(cancel_rx: &mut watch::Receiver<bool>) {
    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
}

enum Step {
    Line(Option<io::Result<String>>),
    Cancelled,
}

async fn run_command(
    command: &BuildCommand,
    cwd: &Utf8Path,
    sink: &EventSink,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Result<(), CommandFailure> {
    let program = command.program().to_string();
    let (mut child, mut lines) = spawn_merged(command, cwd).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            CommandFailure::NotFound {
                program: program.clone(),
            }
        } else {
            CommandFailure::Spawn {
                program: program.clone(),
                source,
            }
        }
    })?;

    loop {
        let step = tokio::select! {
            biased;
            () = cancellation(cancel_rx) => Step::Cancelled,
            line = lines.recv() => Step::Line(line),
        };

        match step {
            Step::Cancelled => return Err(terminate(&mut child).await),
            Step::Line(Some(Ok(line))) => {
                if *cancel_rx.borrow() {
                    return Err(terminate(&mut child).await);
                }
                sink.line(line);
            }
            Step::Line(Some(Err(e))) => {
                kill_child(&mut child).await;
                return Err(CommandFailure::Output(e));
            }
            Step::Line(None) => break,
        }
    }

    let exit = tokio::select! {
        biased;
        () = cancellation(cancel_rx) => Exit::Cancelled,
        status = child.wait() => Exit::Status(status),
    };

    match exit {
        Exit::Cancelled => Err(terminate(&mut child).await),
        Exit::Status(status) => check_status(status.map_err(CommandFailure::Output)?),
    }
}

enum Exit {
    Status(io::Result<ExitStatus>),
    Cancelled,
}

fn check_status(status: ExitStatus) -> Result<(), CommandFailure> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(CommandFailure::NonZeroExit(code)),
        None => Err(CommandFailure::Signal),
    }
}

/// Force-kill the child (no graceful shutdown) and report cancellation.
async fn terminate(child: &mut Child) -> CommandFailure {
    tracing::info!("Terminating child process {:?}", child.id());
    kill_child(child).await;
    CommandFailure::Cancelled
}

/// Kill and reap `child`. Returns false (after logging) if it could not be killed,
/// e.g. because it was already reaped.
async fn kill_child(child: &mut Child) -> bool {
    match child.kill().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Failed to kill child process: {}", e);
            false
        }
    }
}

/// Spawn `command` with stdout and stderr on one pipe.
fn spawn_merged(
    command: &BuildCommand,
    cwd: &Utf8Path,
) -> io::Result<(Child, mpsc::UnboundedReceiver<io::Result<String>>)> {
    if command.is_empty() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "empty command"));
    }

    let (reader, writer) = io::pipe()?;
    let writer_err = writer.try_clone()?;

    let mut cmd = Command::new(command.program());
    cmd.args(command.args())
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_err)
        .kill_on_drop(true);

    let child = cmd.spawn()?;
    // Our copies of the write end must close, or the reader never sees EOF
    drop(cmd);

    let (lines_tx, lines_rx) = mpsc::unbounded_channel();
    spawn_line_reader(reader, lines_tx)?;

    Ok((child, lines_rx))
}

/// Read lines on a plain OS thread so a cancelled session never waits on it.
///
/// A grandchild that inherited the pipe keeps this thread blocked until it
/// exits; the trace line on exit shows when that happens.
fn spawn_line_reader(
    reader: PipeReader,
    lines_tx: mpsc::UnboundedSender<io::Result<String>>,
) -> io::Result<()> {
    thread::Builder::new()
        .name("pytoexe-output".to_string())
        .spawn(move || {
            let exit = pump_lines(reader, &lines_tx);
            tracing::trace!("Output reader finished: {:?}", exit);
        })?;
    Ok(())
}

/// Why an output reader stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderExit {
    /// Every writer closed the pipe
    EndOfOutput,
    /// The session stopped listening
    ReceiverGone,
    /// The read failed; the error was forwarded
    ReadError,
}

fn pump_lines(
    reader: impl io::Read,
    lines_tx: &mpsc::UnboundedSender<io::Result<String>>,
) -> ReaderExit {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return ReaderExit::EndOfOutput,
            Ok(_) => {
                if lines_tx.send(Ok(decode_line(&buf))).is_err() {
                    return ReaderExit::ReceiverGone;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = lines_tx.send(Err(e));
                return ReaderExit::ReadError;
            }
        }
    }
}

/// Lossy UTF-8 with the trailing `\n` or `\r\n` removed.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_line_strips_line_endings() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[test]
    fn test_decode_line_is_lossy() {
        assert_eq!(decode_line(b"caf\xff\n"), "caf\u{FFFD}");
    }

    #[test]
    fn test_failure_log_lines() {
        assert_eq!(
            CommandFailure::NonZeroExit(2).log_line(),
            "[ERROR] exited with code 2"
        );
        assert!(
            CommandFailure::NotFound {
                program: "pyinstaller".to_string()
            }
            .log_line()
            .starts_with("[ERROR] command not found: pyinstaller")
        );
        assert_eq!(
            CommandFailure::Cancelled.log_line(),
            "[CANCELLED] build cancelled by user"
        );
    }

    #[test]
    fn test_failure_outcomes() {
        assert_eq!(CommandFailure::Cancelled.outcome(), BuildOutcome::Cancelled);
        assert_eq!(CommandFailure::Signal.outcome(), BuildOutcome::Failed);
        assert_eq!(CommandFailure::NonZeroExit(1).outcome(), BuildOutcome::Failed);
    }

    #[test]
    fn test_reader_stops_at_end_of_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let exit = pump_lines(&b"one\r\ntwo\nthree"[..], &tx);

        assert_eq!(exit, ReaderExit::EndOfOutput);
        let lines: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|line| line.unwrap())
            .collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_reader_stops_when_session_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        assert_eq!(pump_lines(&b"ignored\n"[..], &tx), ReaderExit::ReceiverGone);
    }

    #[test]
    fn test_reader_forwards_read_errors() {
        struct Broken;

        impl io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("pipe broke"))
            }
        }

        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(pump_lines(Broken, &tx), ReaderExit::ReadError);
        assert!(rx.try_recv().unwrap().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_child_reports_whether_it_killed() {
        let mut running = Command::new("sleep").arg("30").spawn().unwrap();
        assert!(kill_child(&mut running).await);
        assert_eq!(running.wait().await.unwrap().code(), None);

        let mut exited = Command::new("true").spawn().unwrap();
        exited.wait().await.unwrap();
        assert!(!kill_child(&mut exited).await);
    }

    #[tokio::test]
    async fn test_empty_queue_succeeds() {
        let session = ProcessSupervisor::current().start(Vec::new(), Utf8Path::new("."));
        assert_eq!(session.wait().await, BuildOutcome::Succeeded);
    }

    #[tokio::test]
    async fn test_empty_command_reports_not_found() {
        let mut session = ProcessSupervisor::current().start(
            vec![BuildCommand::new(Vec::<String>::new())],
            Utf8Path::new("."),
        );

        let mut lines = Vec::new();
        let mut outcome = None;
        while let Some(event) = session.next_event().await {
            match event {
                SupervisorEvent::OutputLine(line) => lines.push(line),
                SupervisorEvent::Completed(o) => outcome = Some(o),
                SupervisorEvent::CommandStarted { .. } => {}
            }
        }

        assert_eq!(outcome, Some(BuildOutcome::Failed));
        assert!(lines.last().unwrap().starts_with("[ERROR] command not found"));
    }
}
