// src/watch/watcher.rs

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use globset::{Glob, GlobMatcher};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// How long to accumulate filesystem events after the first arrival in a
/// burst before emitting them as one batch.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// One filesystem change, relative to the watch's root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
    pub path: String,
    pub event: String,
}

/// Stop-handle for an active watch. Stopping is idempotent; dropping the
/// handle also stops the watch.
pub struct WatchHandle {
    watcher: Option<RecommendedWatcher>,
}

impl WatchHandle {
    pub fn stop(&mut self) {
        // Dropping the notify watcher closes the subscription; the debounce
        // loop then drains and ends.
        self.watcher.take();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("stopped", &self.watcher.is_none())
            .finish()
    }
}

/// Watch `input` (a relative path, optionally containing a glob) under the
/// root directory `dir`.
///
/// The leftmost path segment containing `*` delimits the watched directory:
/// everything left of it is watched recursively, and the full input becomes
/// the glob that filters events. `"src/website/**/*.js"` watches
/// `src/website` recursively and reports only matching javascript files.
///
/// Events are debounced: a burst of changes becomes one batch on the
/// returned channel, at most one batch per [`DEBOUNCE_WINDOW`]. Emission is
/// non-blocking; if no receiver is ready the batch is dropped.
pub fn watch(
    dir: &Path,
    input: &str,
) -> Result<(mpsc::Receiver<Vec<EventInfo>>, WatchHandle)> {
    let input_path = Path::new(input);
    if input_path.is_absolute() {
        return Err(anyhow!("cannot watch absolute path '{input}'"));
    }
    if input_path.components().any(|c| c == Component::ParentDir) {
        return Err(anyhow!("cannot watch '{input}': path escapes the working directory"));
    }

    let root = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
    let (watch_subdir, glob) = split(input)?;
    let watch_root = root.join(watch_subdir);

    // Channel from notify's callback thread into the async world.
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = raw_tx.send(event);
            }
            Err(err) => {
                warn!(error = %err, "file watch error");
            }
        },
        Config::default(),
    )?;
    watcher
        .watch(&watch_root, RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", watch_root.display()))?;

    debug!(root = %watch_root.display(), glob = ?glob.as_ref().map(|g| g.glob().glob()), "file watch started");

    let (batch_tx, batch_rx) = mpsc::channel::<Vec<EventInfo>>(1);

    tokio::spawn(async move {
        let mut pending: Vec<EventInfo> = Vec::new();
        'bursts: loop {
            // Wait for the first matching event of a burst.
            while pending.is_empty() {
                match raw_rx.recv().await {
                    Some(event) => collect(&root, glob.as_ref(), &event, &mut pending),
                    None => break 'bursts,
                }
            }

            // Accumulate for the debounce window, then emit one batch.
            let deadline = sleep(DEBOUNCE_WINDOW);
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = raw_rx.recv() => match event {
                        Some(event) => collect(&root, glob.as_ref(), &event, &mut pending),
                        None => break,
                    },
                }
            }

            let batch = std::mem::take(&mut pending);
            if batch_tx.try_send(batch).is_err() {
                debug!("dropping debounced event batch: no receiver ready");
            }
        }
        debug!("file watch loop ended");
    });

    Ok((batch_rx, WatchHandle { watcher: Some(watcher) }))
}

/// Break an input path into the directory to watch and an optional glob.
///
/// `"src/website/**/*.js"` becomes `("src/website", Some(glob))`; an input
/// without any `*` watches the input path itself with no filtering.
fn split(input: &str) -> Result<(PathBuf, Option<GlobMatcher>)> {
    let segments: Vec<&str> = input.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        if segment.contains('*') {
            let watch_root: PathBuf = segments[..i].iter().collect();
            let matcher = Glob::new(input)
                .with_context(|| format!("invalid watch glob '{input}'"))?
                .compile_matcher();
            return Ok((watch_root, Some(matcher)));
        }
    }
    Ok((PathBuf::from(input), None))
}

fn collect(root: &Path, glob: Option<&GlobMatcher>, event: &Event, pending: &mut Vec<EventInfo>) {
    for path in &event.paths {
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        if let Some(glob) = glob {
            if !glob.is_match(&rel_str) {
                continue;
            }
        }
        pending.push(EventInfo {
            path: rel_str,
            event: kind_label(&event.kind).to_string(),
        });
    }
}

fn kind_label(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::Create(_) => "create",
        EventKind::Modify(_) => "modify",
        EventKind::Remove(_) => "remove",
        EventKind::Access(_) => "access",
        EventKind::Any => "any",
        EventKind::Other => "other",
    }
}
