// tests/runner_end_to_end.rs

use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use taskmux::exec::ScriptTask;
use taskmux::{
    Library, MemoryWriter, Runner, RunnerMode, Task, TaskError, TaskMetadata, TaskStatus, TaskType,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

mod common;
use common::{assert_contains_sequence, count_occurrences, long_task, task};

type TestResult = Result<(), Box<dyn Error>>;

fn script(id: &str, cmd: &str) -> Arc<dyn Task> {
    script_task(id, TaskType::Short, cmd, &[])
}

fn script_task(id: &str, kind: TaskType, cmd: &str, deps: &[&str]) -> Arc<dyn Task> {
    let mut meta = TaskMetadata::new(id, kind);
    meta.dependencies = deps.iter().map(|s| s.to_string()).collect();
    Arc::new(ScriptTask::new(meta, ".", BTreeMap::new(), cmd))
}

fn runner(mode: RunnerMode, tasks: Vec<Arc<dyn Task>>) -> (Runner, MemoryWriter) {
    let sink = MemoryWriter::new();
    let runner = Runner::new(mode, Library::new(tasks), ".", sink.clone());
    (runner, sink)
}

#[tokio::test]
async fn single_short_task_succeeds() -> TestResult {
    let (r, sink) = runner(RunnerMode::Exit, vec![script("a", "echo hi")]);

    r.run(CancellationToken::new(), &["a"]).await?;

    assert_contains_sequence(
        &sink.combined(),
        &["[a] starting", "[a] hi", "[a] exit ok", "[@interleaved] done"],
    );
    Ok(())
}

#[tokio::test]
async fn single_short_task_failure_terminates_the_run() -> TestResult {
    let (r, sink) = runner(RunnerMode::Exit, vec![script("a", "exit 7")]);

    let err = r.run(CancellationToken::new(), &["a"]).await.unwrap_err();

    assert_eq!(err.downcast_ref::<TaskError>(), Some(&TaskError::Exit(7)));
    assert_eq!(err.to_string(), "exit 7");
    assert_contains_sequence(&sink.combined(), &["[a] exit: exit 7", "[@interleaved] done"]);
    Ok(())
}

#[tokio::test]
async fn dependency_chain_runs_in_order() -> TestResult {
    let (r, sink) = runner(
        RunnerMode::Exit,
        vec![
            script_task("1", TaskType::Short, "echo 1", &[]),
            script_task("2", TaskType::Short, "echo 2", &["1"]),
            script_task("3", TaskType::Short, "echo 3", &["2", "1"]),
        ],
    );

    r.run(CancellationToken::new(), &["3"]).await?;

    assert_contains_sequence(&sink.combined(), &["[1] 1", "[2] 2", "[3] 3"]);
    Ok(())
}

#[tokio::test]
async fn failing_dependency_prevents_the_dependent_from_starting() -> TestResult {
    let (r, sink) = runner(
        RunnerMode::Exit,
        vec![
            task("failing-task").failing().build(),
            task("app").with_dependencies(&["failing-task"]).build(),
        ],
    );

    let err = r.run(CancellationToken::new(), &["app"]).await.unwrap_err();

    assert_eq!(err.to_string(), "fail");
    let combined = sink.combined();
    assert_contains_sequence(&combined, &["[failing-task] exit: fail"]);
    assert_eq!(count_occurrences(&combined, "! app: execute"), 0);
    Ok(())
}

#[tokio::test]
async fn exit_run_with_long_task_ends_on_cancel() -> TestResult {
    let (r, sink) = runner(RunnerMode::Exit, vec![long_task("long").build()]);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["long"]).await }
    });

    sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    let err = handle.await?.unwrap_err();
    assert_eq!(err.downcast_ref::<TaskError>(), Some(&TaskError::Canceled));
    assert_contains_sequence(
        &sink.combined(),
        &[
            "! long: start",
            "[@interleaved] run canceled",
            "! long: canceled",
            "[@interleaved] done",
        ],
    );
    Ok(())
}

#[tokio::test]
async fn unknown_root_fails_with_the_known_task_list() -> TestResult {
    let (r, _sink) = runner(RunnerMode::Exit, vec![script("a", "true")]);

    let err = r
        .run(CancellationToken::new(), &["nope"])
        .await
        .unwrap_err()
        .to_string();

    assert!(err.contains("Task 'nope' not found"), "unexpected error: {err}");
    assert!(err.contains("- a"), "unexpected error: {err}");
    Ok(())
}

#[tokio::test]
async fn keepalive_restarts_a_long_task_when_watched_files_change() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("trigger-file"), "before")?;

    let sink = MemoryWriter::new();
    let library = Library::new([long_task("long").with_watch(&["trigger-file"]).build()]);
    let r = Runner::new(RunnerMode::Keepalive, library, dir.path(), sink.clone());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["long"]).await }
    });

    // Let the watcher and the first start settle, then touch the file and
    // ride out the debounce window.
    sleep(Duration::from_millis(400)).await;
    fs::write(dir.path().join("trigger-file"), "after")?;
    sleep(Duration::from_millis(1200)).await;

    cancel.cancel();
    let err = handle.await?.unwrap_err();
    assert_eq!(err.downcast_ref::<TaskError>(), Some(&TaskError::Canceled));

    let combined = sink.combined();
    assert_eq!(count_occurrences(&combined, "! long: start"), 2, "{combined}");
    assert_eq!(count_occurrences(&combined, "! long: canceled"), 2, "{combined}");
    assert_contains_sequence(&combined, &["[@watch] invalidating {long}"]);
    Ok(())
}

#[tokio::test]
async fn triggers_are_not_started_automatically() -> TestResult {
    let (r, sink) = runner(
        RunnerMode::Keepalive,
        vec![
            long_task("a").with_triggers(&["b"]).build(),
            task("b").build(),
        ],
    );
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["a"]).await }
    });

    sleep(Duration::from_millis(300)).await;
    cancel.cancel();
    let _ = handle.await?;

    assert_eq!(count_occurrences(&sink.combined(), "! b: execute"), 0);
    Ok(())
}

#[tokio::test]
async fn a_trigger_completing_refires_the_long_dependent_once() -> TestResult {
    let (r, sink) = runner(
        RunnerMode::Keepalive,
        vec![
            long_task("a").with_triggers(&["b"]).build(),
            task("b").build(),
        ],
    );
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["a"]).await }
    });

    sleep(Duration::from_millis(300)).await;
    r.invalidate("b").await;
    sleep(Duration::from_millis(500)).await;

    cancel.cancel();
    let _ = handle.await?;

    let combined = sink.combined();
    assert_eq!(count_occurrences(&combined, "! b: execute"), 1, "{combined}");
    assert_eq!(count_occurrences(&combined, "! a: start"), 2, "{combined}");
    Ok(())
}

#[tokio::test]
async fn a_dependency_completing_does_not_refire_the_long_dependent() -> TestResult {
    let (r, sink) = runner(
        RunnerMode::Keepalive,
        vec![
            long_task("a").with_dependencies(&["b"]).build(),
            task("b").build(),
        ],
    );
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["a"]).await }
    });

    sleep(Duration::from_millis(300)).await;
    r.invalidate("b").await;
    sleep(Duration::from_millis(500)).await;

    cancel.cancel();
    let _ = handle.await?;

    let combined = sink.combined();
    assert_eq!(count_occurrences(&combined, "! b: execute"), 2, "{combined}");
    assert_eq!(count_occurrences(&combined, "! a: start"), 1, "{combined}");
    Ok(())
}

#[tokio::test]
async fn keepalive_retries_a_failed_task_after_a_pause() -> TestResult {
    let (r, sink) = runner(RunnerMode::Keepalive, vec![task("flaky").failing().build()]);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["flaky"]).await }
    });

    // First failure is immediate; the retry lands after RETRY_DELAY.
    sleep(Duration::from_millis(1400)).await;
    cancel.cancel();
    let err = handle.await?.unwrap_err();
    assert_eq!(err.downcast_ref::<TaskError>(), Some(&TaskError::Canceled));

    let combined = sink.combined();
    assert!(
        count_occurrences(&combined, "! flaky: execute") >= 2,
        "expected a retry in: {combined}"
    );
    assert_contains_sequence(&combined, &["[flaky] exit: fail", "[flaky] exit: fail"]);
    Ok(())
}

#[tokio::test]
async fn activating_an_already_requested_root_is_a_no_op() -> TestResult {
    let (r, sink) = runner(RunnerMode::Keepalive, vec![long_task("a").build()]);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["a"]).await }
    });

    sleep(Duration::from_millis(200)).await;
    r.add(&["a"]).await;
    sleep(Duration::from_millis(200)).await;

    cancel.cancel();
    let _ = handle.await?;

    assert_eq!(count_occurrences(&sink.combined(), "! a: start"), 1);
    Ok(())
}

#[tokio::test]
async fn deactivation_restores_the_pre_activation_state() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("watched-file"), "x")?;

    let sink = MemoryWriter::new();
    let library = Library::new([
        long_task("keep").build(),
        long_task("extra").with_watch(&["watched-file"]).build(),
    ]);
    let r = Runner::new(RunnerMode::Keepalive, library, dir.path(), sink.clone());
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let r = r.clone();
        let cancel = cancel.clone();
        async move { r.run(cancel, &["keep"]).await }
    });

    sleep(Duration::from_millis(200)).await;
    r.add(&["extra"]).await;
    sleep(Duration::from_millis(300)).await;

    let during = r.status();
    assert!(during.requested_tasks.contains(&"extra".to_string()));
    assert_eq!(during.task_status["extra"], TaskStatus::Running);

    r.remove("extra").await;
    sleep(Duration::from_millis(300)).await;

    let after = r.status();
    assert!(after.inactive_tasks.contains(&"extra".to_string()));
    assert_eq!(after.task_status["extra"], TaskStatus::NotStarted);
    assert_contains_sequence(
        &sink.combined(),
        &["! extra: start", "[@watch] stopping watcher on 'watched-file'", "! extra: canceled"],
    );

    cancel.cancel();
    let _ = handle.await?;
    Ok(())
}
