// tests/watcher_debounce.rs

use std::error::Error;
use std::fs;
use std::time::Duration;

use taskmux::watch::{watch, DEBOUNCE_WINDOW};
use tokio::time::timeout;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn rejects_absolute_paths() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = watch(dir.path(), "/etc").unwrap_err().to_string();
    assert!(err.contains("absolute"), "unexpected error: {err}");
    Ok(())
}

#[tokio::test]
async fn rejects_paths_that_escape_the_root() -> TestResult {
    let dir = tempfile::tempdir()?;
    let err = watch(dir.path(), "../sibling").unwrap_err().to_string();
    assert!(err.contains("escapes"), "unexpected error: {err}");
    Ok(())
}

#[tokio::test]
async fn a_burst_of_changes_becomes_one_batch() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("src"))?;

    let (mut batches, mut handle) = watch(dir.path(), "src/**/*.txt")?;

    // Give the OS watcher a beat to come up, then change two files within
    // the debounce window.
    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(dir.path().join("src/one.txt"), "1")?;
    fs::write(dir.path().join("src/two.txt"), "2")?;

    let batch = timeout(DEBOUNCE_WINDOW * 4, batches.recv())
        .await?
        .expect("watch channel closed early");

    let paths: Vec<&str> = batch.iter().map(|ev| ev.path.as_str()).collect();
    assert!(paths.contains(&"src/one.txt"), "got {paths:?}");
    assert!(paths.contains(&"src/two.txt"), "got {paths:?}");

    // Both changes were coalesced: no second batch is pending.
    let extra = timeout(DEBOUNCE_WINDOW * 2, batches.recv()).await;
    assert!(extra.is_err(), "expected a single debounced batch");

    handle.stop();
    Ok(())
}

#[tokio::test]
async fn glob_filters_non_matching_paths() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("src"))?;

    let (mut batches, mut handle) = watch(dir.path(), "src/**/*.txt")?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    fs::write(dir.path().join("src/notes.md"), "ignored")?;
    fs::write(dir.path().join("src/kept.txt"), "kept")?;

    let batch = timeout(DEBOUNCE_WINDOW * 4, batches.recv())
        .await?
        .expect("watch channel closed early");

    assert!(batch.iter().all(|ev| ev.path.ends_with(".txt")), "got {batch:?}");
    assert!(batch.iter().any(|ev| ev.path == "src/kept.txt"));

    handle.stop();
    Ok(())
}

#[tokio::test]
async fn stop_is_idempotent_and_closes_the_channel() -> TestResult {
    let dir = tempfile::tempdir()?;
    fs::create_dir_all(dir.path().join("src"))?;

    let (mut batches, mut handle) = watch(dir.path(), "src")?;
    handle.stop();
    handle.stop();

    let closed = timeout(Duration::from_secs(2), batches.recv()).await?;
    assert!(closed.is_none());
    Ok(())
}
