//! Integration tests for ProcessSupervisor
//!
//! These tests run real child processes through `sh`, so they are Unix-only.
//! They verify:
//! - Commands run strictly in order and the queue halts on the first failure
//! - stdout and stderr arrive merged, in the order the child wrote them
//! - Cancellation kills a running child without waiting for it to finish
//! - `Completed` is emitted exactly once, as the final event
//! - A session whose runtime shuts down reports a disconnect instead of idling

#![cfg(unix)]

use camino::{Utf8Path, Utf8PathBuf};
use pytoexe::BuildOutcome;
use pytoexe::models::BuildCommand;
use pytoexe::services::{ExecutionSession, ProcessSupervisor, SupervisorEvent};
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Duration, timeout};

fn sh(script: &str) -> BuildCommand {
    BuildCommand::new(["sh", "-c", script])
}

fn start(commands: Vec<BuildCommand>) -> ExecutionSession {
    ProcessSupervisor::current().start(commands, Utf8Path::new("."))
}

/// Drain a session, failing the test if it takes longer than ten seconds.
async fn collect(mut session: ExecutionSession) -> Vec<SupervisorEvent> {
    let mut events = Vec::new();
    timeout(Duration::from_secs(10), async {
        while let Some(event) = session.next_event().await {
            events.push(event);
        }
    })
    .await
    .expect("Timeout waiting for session to complete");
    events
}

fn lines(events: &[SupervisorEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            SupervisorEvent::OutputLine(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

fn outcome(events: &[SupervisorEvent]) -> BuildOutcome {
    match events.last() {
        Some(SupervisorEvent::Completed(outcome)) => *outcome,
        other => panic!("Expected Completed as the last event, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_all_commands_succeed() {
    let events = collect(start(vec![sh("echo one"), sh("echo two")])).await;

    assert_eq!(outcome(&events), BuildOutcome::Succeeded);
    assert_eq!(
        lines(&events),
        vec![
            "=== Running: sh -c echo one ===",
            "one",
            "=== Running: sh -c echo two ===",
            "two",
        ]
    );
}

#[tokio::test]
async fn test_queue_halts_on_first_failure() {
    let events = collect(start(vec![
        sh("echo one"),
        sh("echo two; exit 1"),
        sh("echo three"),
    ]))
    .await;

    assert_eq!(outcome(&events), BuildOutcome::Failed);

    let output = lines(&events);
    assert!(output.contains(&"one"));
    assert!(output.contains(&"two"));
    assert!(!output.contains(&"three"));
    assert_eq!(output.last(), Some(&"[ERROR] exited with code 1"));

    let started: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SupervisorEvent::CommandStarted { index, total } => {
                assert_eq!(*total, 3);
                Some(*index)
            }
            _ => None,
        })
        .collect();
    assert_eq!(started, vec![1, 2]);
}

#[tokio::test]
async fn test_stdout_and_stderr_are_merged_in_order() {
    let events = collect(start(vec![sh("echo out1; echo err1 1>&2; echo out2; echo err2 1>&2")])).await;

    assert_eq!(outcome(&events), BuildOutcome::Succeeded);
    assert_eq!(&lines(&events)[1..], ["out1", "err1", "out2", "err2"]);
}

#[tokio::test]
async fn test_line_endings_are_stripped() {
    let events = collect(start(vec![sh(r"printf 'crlf\r\nplain\nno newline'")])).await;

    assert_eq!(&lines(&events)[1..], ["crlf", "plain", "no newline"]);
}

#[tokio::test]
async fn test_missing_program_reports_not_found() {
    let events = collect(start(vec![
        BuildCommand::new(["definitely-not-a-real-packager-4711", "app.py"]),
        sh("echo never"),
    ]))
    .await;

    assert_eq!(outcome(&events), BuildOutcome::Failed);

    let output = lines(&events);
    assert!(
        output
            .last()
            .unwrap()
            .starts_with("[ERROR] command not found: definitely-not-a-real-packager-4711")
    );
    assert!(!output.contains(&"never"));
}

#[tokio::test]
async fn test_cancel_during_output_kills_child() {
    let mut session = start(vec![
        sh("echo ready; exec sleep 30"),
        sh("echo second"),
    ]);

    // Wait until the child is definitely running
    timeout(Duration::from_secs(5), async {
        loop {
            match session.next_event().await {
                Some(SupervisorEvent::OutputLine(line)) if line == "ready" => break,
                Some(_) => {}
                None => panic!("Session ended before the child printed"),
            }
        }
    })
    .await
    .expect("Timeout waiting for child output");

    let cancelled_at = Instant::now();
    session.request_cancel();
    let events = collect(session).await;

    assert!(cancelled_at.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome(&events), BuildOutcome::Cancelled);

    let output = lines(&events);
    assert_eq!(output.last(), Some(&"[CANCELLED] build cancelled by user"));
    assert!(!output.contains(&"second"));
}

#[tokio::test]
async fn test_cancel_silent_child() {
    let session = start(vec![sh("exec sleep 30")]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    session.request_cancel();

    let cancelled_at = Instant::now();
    let outcome = timeout(Duration::from_secs(10), session.wait())
        .await
        .expect("Silent child was not killed");

    assert_eq!(outcome, BuildOutcome::Cancelled);
    assert!(cancelled_at.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_completed_is_final_and_unique() {
    let mut session = start(vec![sh("echo hi")]);

    let mut completions = 0;
    timeout(Duration::from_secs(10), async {
        while let Some(event) = session.next_event().await {
            if matches!(event, SupervisorEvent::Completed(_)) {
                completions += 1;
            }
        }
    })
    .await
    .expect("Timeout waiting for session");

    assert_eq!(completions, 1);
    assert!(session.is_finished());
    assert!(session.next_event().await.is_none());
    assert!(matches!(
        session.try_next_event(),
        Err(TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn test_commands_run_in_working_directory() {
    let temp_dir = TempDir::new().unwrap();
    let cwd = Utf8PathBuf::try_from(temp_dir.path().canonicalize().unwrap()).unwrap();

    let session = ProcessSupervisor::current().start(vec![sh("pwd -P")], &cwd);
    let events = collect(session).await;

    assert_eq!(lines(&events)[1], cwd.as_str());
}

#[tokio::test]
async fn test_dropping_session_stops_the_queue() {
    let temp_dir = TempDir::new().unwrap();
    let marker = temp_dir.path().join("marker");
    let script = format!("sleep 1; touch '{}'", marker.display());

    let session = start(vec![sh("exec sleep 30"), sh(&script)]);
    tokio::time::sleep(Duration::from_millis(200)).await;
    drop(session);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!marker.exists());
}

#[test]
fn test_runtime_shutdown_disconnects_session() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let supervisor = ProcessSupervisor::new(runtime.handle().clone());
    let mut session = supervisor.start(
        vec![sh("echo ready; exec sleep 30")],
        Utf8Path::new("."),
    );

    runtime.block_on(async {
        timeout(Duration::from_secs(10), async {
            loop {
                match session.next_event().await {
                    Some(SupervisorEvent::OutputLine(line)) if line == "ready" => break,
                    Some(_) => {}
                    None => panic!("Session ended before the child started"),
                }
            }
        })
        .await
        .expect("Timeout waiting for child output");
    });
    runtime.shutdown_timeout(Duration::from_secs(2));

    let mut saw_completed = false;
    loop {
        match session.try_next_event() {
            Ok(SupervisorEvent::Completed(_)) => saw_completed = true,
            Ok(_) => {}
            Err(TryRecvError::Empty) => panic!("Session still looks alive after shutdown"),
            Err(TryRecvError::Disconnected) => break,
        }
    }

    assert!(!saw_completed);
    assert!(!session.is_finished());
}
