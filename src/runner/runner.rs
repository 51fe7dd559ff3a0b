// src/runner/runner.rs

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::TaskError;
use crate::exec::Executor;
use crate::library::{Library, TaskType};
use crate::output::{LineWriters, MultiWriter};
use crate::watch::{watch, EventInfo, WatchHandle};

/// Stream id for run-level log lines.
pub const INTERLEAVED_STREAM: &str = "@interleaved";

/// Stream id for file-watch diagnostics.
pub const WATCH_STREAM: &str = "@watch";

/// How long a failed task waits before being retried in keepalive mode.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// What a run does once its tasks settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMode {
    /// Keep going: restart long tasks when they exit, retry failed tasks
    /// after [`RETRY_DELAY`], honor file watches. Ends only on cancellation.
    Keepalive,
    /// Terminate as soon as every requested task is ready, and fail fast on
    /// any task error. File watches are not used.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Running,
    Restarting,
    Failed,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::NotStarted => "not started",
            TaskStatus::Running => "running",
            TaskStatus::Restarting => "restarting",
            TaskStatus::Failed => "failed",
            TaskStatus::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Every state transition in a run is driven by one of these, delivered over
/// the runner's single input channel and handled sequentially.
#[derive(Debug)]
enum Message {
    ActivateSubtree(String),
    DeactivateSubtree(String),
    Invalidate(String),
    RunTask(String),
    TaskReady(String),
    TaskExit {
        id: String,
        error: Option<TaskError>,
    },
    FsEvent {
        path: String,
        events: Vec<EventInfo>,
    },
    RunnerDone,
}

/// A consistent snapshot of a runner's task sets and statuses.
#[derive(Debug, Clone, Default)]
pub struct Status {
    pub all_tasks: Vec<String>,
    pub meta_tasks: Vec<String>,
    pub requested_tasks: Vec<String>,
    pub active_tasks: Vec<String>,
    pub inactive_tasks: Vec<String>,
    pub task_status: HashMap<String, TaskStatus>,
}

/// Executes a library's tasks, honoring their dependency, trigger, and
/// file-watch relationships.
///
/// All run-scoped state lives behind one mutex, mutated only while the event
/// loop processes a message; [`Runner::status`] takes the same mutex, so
/// observers never see a partially-applied transition. Watchers, executor
/// supervisors, and retry timers are producers into the input channel; the
/// loop in [`Runner::run`] is its only consumer.
#[derive(Clone)]
pub struct Runner {
    inner: Arc<Inner>,
}

struct Inner {
    mode: RunnerMode,
    library: Library,
    dir: PathBuf,
    out: LineWriters,

    input_tx: mpsc::Sender<Message>,
    input_rx: Mutex<Option<mpsc::Receiver<Message>>>,

    state: Mutex<RunState>,
}

#[derive(Default)]
struct RunState {
    requested: HashSet<String>,
    status: HashMap<String, TaskStatus>,
    ready: HashSet<String>,
    executors: HashMap<String, Arc<Executor>>,
    watchers: HashMap<String, WatchHandle>,
}

impl Runner {
    pub fn new(
        mode: RunnerMode,
        library: Library,
        dir: impl Into<PathBuf>,
        sink: impl MultiWriter + 'static,
    ) -> Self {
        let (input_tx, input_rx) = mpsc::channel(64);
        Self {
            inner: Arc::new(Inner {
                mode,
                library,
                dir: dir.into(),
                out: LineWriters::new(Box::new(sink)),
                input_tx,
                input_rx: Mutex::new(Some(input_rx)),
                state: Mutex::new(RunState::default()),
            }),
        }
    }

    pub fn library(&self) -> &Library {
        &self.inner.library
    }

    /// Start the runner and service its event loop until `cancel` fires, the
    /// run completes (exit mode), or a task fails (exit mode). Cleans up all
    /// watchers and executors before returning.
    pub async fn run(&self, cancel: CancellationToken, roots: &[&str]) -> Result<()> {
        let inner = &self.inner;

        let mut rx = inner
            .input_rx
            .lock()
            .expect("runner lock poisoned")
            .take()
            .ok_or_else(|| anyhow!("runner already started"))?;

        debug!(?roots, "starting run");
        {
            let tx = inner.input_tx.clone();
            let roots: Vec<String> = roots.iter().map(|s| s.to_string()).collect();
            tokio::spawn(async move {
                for id in roots {
                    let _ = tx.send(Message::ActivateSubtree(id)).await;
                }
            });
        }

        let result: Result<()> = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    inner.out.line(INTERLEAVED_STREAM, "run canceled");
                    break Err(TaskError::Canceled.into());
                }
                msg = rx.recv() => {
                    let Some(msg) = msg else { break Ok(()) };
                    debug!(?msg, "event loop turn");
                    match msg {
                        Message::RunnerDone => break Ok(()),
                        msg => {
                            if let Err(err) = inner.handle(msg) {
                                break Err(err);
                            }
                        }
                    }
                }
            }
        };

        // Stop the file watchers first so nothing new gets invalidated while
        // the tasks shut down.
        let watchers: Vec<(String, WatchHandle)> = {
            let mut state = inner.state.lock().expect("runner lock poisoned");
            state.watchers.drain().collect()
        };
        for (path, mut handle) in watchers {
            inner.out.line(WATCH_STREAM, format!("stopping watcher on '{path}'"));
            handle.stop();
        }

        // Cancel every live executor and wait for its exit.
        let executors: Vec<(String, Arc<Executor>)> = {
            let mut state = inner.state.lock().expect("runner lock poisoned");
            state.executors.drain().collect()
        };
        for (id, executor) in executors {
            inner.out.line(&id, "canceling");
            let _ = executor.cancel().await;
        }

        inner.out.line(INTERLEAVED_STREAM, "done");
        result
    }

    /// Activate the given tasks (and their dependency subtrees).
    pub async fn add(&self, ids: &[&str]) {
        for id in ids {
            let _ = self
                .inner
                .input_tx
                .send(Message::ActivateSubtree(id.to_string()))
                .await;
        }
    }

    /// Deactivate a previously requested root, stopping any tasks and
    /// watchers no other root needs.
    pub async fn remove(&self, id: &str) {
        let _ = self
            .inner
            .input_tx
            .send(Message::DeactivateSubtree(id.to_string()))
            .await;
    }

    /// Request that a task be (re)started, as if one of its watched paths
    /// had changed.
    pub async fn invalidate(&self, id: &str) {
        self.inner.out.line(id, "manually invalidated");
        let _ = self
            .inner
            .input_tx
            .send(Message::Invalidate(id.to_string()))
            .await;
    }

    /// A consistent snapshot of the run. Safe to call concurrently with the
    /// event loop.
    pub fn status(&self) -> Status {
        let inner = &self.inner;
        let state = inner.state.lock().expect("runner lock poisoned");
        let active = inner.active_subtree(&state);

        let mut status = Status::default();

        status.meta_tasks.push(INTERLEAVED_STREAM.to_string());
        if !active.watches().is_empty() {
            status.meta_tasks.push(WATCH_STREAM.to_string());
        }

        for id in inner.library.ids() {
            if state.requested.contains(id) {
                status.requested_tasks.push(id.clone());
            } else if active.has(id) {
                status.active_tasks.push(id.clone());
            } else {
                status.inactive_tasks.push(id.clone());
            }
            status
                .task_status
                .insert(id.clone(), state.status.get(id).copied().unwrap_or_default());
        }

        status.all_tasks = status
            .meta_tasks
            .iter()
            .chain(status.requested_tasks.iter())
            .chain(status.active_tasks.iter())
            .chain(status.inactive_tasks.iter())
            .cloned()
            .collect();

        status
    }
}

impl Inner {
    /// Dispatch one message. An error terminates the run.
    fn handle(self: &Arc<Self>, msg: Message) -> Result<()> {
        match msg {
            Message::ActivateSubtree(id) => self.activate_subtree(&id),
            Message::DeactivateSubtree(id) => self.deactivate_subtree(&id),
            Message::Invalidate(id) | Message::RunTask(id) => self.run_task(&id),
            Message::TaskReady(id) => self.handle_task_ready(&id),
            Message::TaskExit { id, error } => self.handle_task_exit(&id, error),
            Message::FsEvent { path, events } => self.handle_fs_event(&path, &events),
            Message::RunnerDone => Ok(()),
        }
    }

    /// Post a message back onto the input channel without blocking the event
    /// loop.
    fn post(&self, msg: Message) {
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(msg).await;
        });
    }

    fn post_after(&self, delay: Duration, msg: Message) {
        let tx = self.input_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(msg).await;
        });
    }

    fn active_subtree(&self, state: &RunState) -> Library {
        self.library.subtree(state.requested.iter())
    }

    fn activate_subtree(self: &Arc<Self>, id: &str) -> Result<()> {
        // Stop the whole run if the requested task isn't in the library.
        if !self.library.has(id) {
            let mut lines = vec![format!("Task '{id}' not found. Tasks are:")];
            for known in self.library.ids() {
                lines.push(format!(" - {known}"));
            }
            lines.push("Run `taskmux --list` for more information about the available tasks.".to_string());
            bail!(lines.join("\n"));
        }

        let subtree = self.library.subtree([id]);

        let new_tasks: Vec<String> = {
            let mut state = self.state.lock().expect("runner lock poisoned");
            if !state.requested.insert(id.to_string()) {
                return Ok(());
            }
            let new_tasks: Vec<String> = subtree
                .ids()
                .iter()
                .filter(|tid| !state.status.contains_key(*tid))
                .cloned()
                .collect();
            for tid in &new_tasks {
                state.status.insert(tid.clone(), TaskStatus::NotStarted);
            }
            new_tasks
        };

        // In a keepalive run, start the file watchers before the tasks, so
        // events fired by the tasks themselves are picked up.
        if self.mode == RunnerMode::Keepalive {
            for path in subtree.watches() {
                let already = {
                    let state = self.state.lock().expect("runner lock poisoned");
                    state.watchers.contains_key(&path)
                };
                if already {
                    continue;
                }

                self.out.line(WATCH_STREAM, format!("watching {path}"));
                let (mut batches, handle) = watch(&self.dir, &path)
                    .map_err(|err| anyhow!("file watch error: {err}"))?;
                self.state
                    .lock()
                    .expect("runner lock poisoned")
                    .watchers
                    .insert(path.clone(), handle);

                let tx = self.input_tx.clone();
                tokio::spawn(async move {
                    while let Some(events) = batches.recv().await {
                        let msg = Message::FsEvent {
                            path: path.clone(),
                            events,
                        };
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                });
            }
        }

        // Start any new tasks whose dependencies are already met (zero-dep
        // tasks, or tasks whose dependencies were covered by an earlier
        // activation). When they become ready, they'll pull in the rest.
        let startable: Vec<String> = {
            let state = self.state.lock().expect("runner lock poisoned");
            new_tasks
                .into_iter()
                .filter(|tid| {
                    let task = self.library.task(tid).expect("subtree id missing from library");
                    task.metadata()
                        .dependencies
                        .iter()
                        .all(|dep| state.ready.contains(dep))
                })
                .collect()
        };
        for tid in startable {
            debug!(task = %tid, "dependencies already met; starting");
            self.post(Message::RunTask(tid));
        }

        Ok(())
    }

    fn deactivate_subtree(&self, id: &str) -> Result<()> {
        let (to_cancel, to_stop) = {
            let mut state = self.state.lock().expect("runner lock poisoned");

            if !state.requested.remove(id) {
                let mut roots: Vec<String> = state.requested.iter().cloned().collect();
                roots.sort();
                bail!(
                    "cannot deactivate '{id}': it is not a requested root. Requested roots are {{{}}}",
                    roots.join(", ")
                );
            }

            // Anything in the removed subtree that the remaining roots don't
            // also need gets stopped and forgotten, so a later activation
            // starts from a clean slate.
            let removed = self.library.subtree([id]);
            let kept = self.active_subtree(&state);

            let mut to_cancel: Vec<(String, Arc<Executor>)> = Vec::new();
            for tid in removed.ids() {
                if kept.has(tid) {
                    continue;
                }
                state.status.remove(tid);
                state.ready.remove(tid);
                if let Some(executor) = state.executors.remove(tid) {
                    to_cancel.push((tid.clone(), executor));
                }
            }

            let mut to_stop: Vec<(String, WatchHandle)> = Vec::new();
            for path in removed.watches() {
                if kept.has_watch(&path) {
                    continue;
                }
                if let Some(handle) = state.watchers.remove(&path) {
                    to_stop.push((path, handle));
                }
            }

            (to_cancel, to_stop)
        };

        for (path, mut handle) in to_stop {
            self.out.line(WATCH_STREAM, format!("stopping watcher on '{path}'"));
            handle.stop();
        }
        for (tid, executor) in to_cancel {
            self.out.line(&tid, "canceling");
            tokio::spawn(async move {
                let _ = executor.cancel().await;
            });
        }

        Ok(())
    }

    fn run_task(self: &Arc<Self>, id: &str) -> Result<()> {
        let Some(task) = self.library.task(id) else {
            warn!(task = %id, "cannot run unknown task");
            return Ok(());
        };

        {
            let state = self.state.lock().expect("runner lock poisoned");

            // Short-circuit if the task's dependencies are not met.
            for dep in &task.metadata().dependencies {
                if !state.ready.contains(dep) {
                    debug!(task = %id, dep = %dep, "not running: dependency is not ready");
                    return Ok(());
                }
            }

            // If the task is already running, cancel it and try again.
            if let Some(executor) = state.executors.get(id) {
                if !executor.is_done() {
                    debug!(task = %id, "canceling live execution before re-running");
                    let executor = Arc::clone(executor);
                    let tx = self.input_tx.clone();
                    let id = id.to_string();
                    tokio::spawn(async move {
                        let _ = executor.cancel().await;
                        let _ = tx.send(Message::RunTask(id)).await;
                    });
                    return Ok(());
                }
            }
        }

        self.out.line(id, "starting");

        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);
        let writer = self.out.writer(id);
        let task_to_start = Arc::clone(&task);
        let executor = Executor::new(move |cancel| async move {
            task_to_start.start(cancel, ready_tx, writer).await
        });

        {
            let mut state = self.state.lock().expect("runner lock poisoned");
            let status = match task.metadata().kind {
                TaskType::Short => TaskStatus::Running,
                TaskType::Long => TaskStatus::Restarting,
            };
            state.status.insert(id.to_string(), status);
            state.executors.insert(id.to_string(), Arc::clone(&executor));
        }

        // Forward the task's readiness signal, unless the task is stopped
        // before it fires.
        let ready_guard = CancellationToken::new();
        {
            let tx = self.input_tx.clone();
            let id = id.to_string();
            let guard = ready_guard.clone();
            tokio::spawn(async move {
                tokio::select! {
                    got = ready_rx.recv() => {
                        if got.is_some() {
                            let _ = tx.send(Message::TaskReady(id)).await;
                        }
                    }
                    _ = guard.cancelled() => {}
                }
            });
        }

        // Supervise in its own task so the event loop can continue. Natural
        // exits come back as TaskExit; cancellations close the wait channel
        // instead, and the canceler owns what happens next.
        let exit_rx = executor.wait();
        executor.execute();
        {
            let this = Arc::clone(self);
            let id = id.to_string();
            tokio::spawn(async move {
                let result = match exit_rx.await {
                    Ok(result) => result,
                    Err(_closed) => {
                        ready_guard.cancel();
                        return;
                    }
                };

                // If this executor has already been replaced, the exit is
                // stale; discard it.
                {
                    let mut state = this.state.lock().expect("runner lock poisoned");
                    match state.executors.get(&id) {
                        Some(current) if current.is(&executor) => {
                            state.executors.remove(&id);
                        }
                        _ => return,
                    }
                }

                ready_guard.cancel();
                let _ = this
                    .input_tx
                    .send(Message::TaskExit {
                        id,
                        error: result.err(),
                    })
                    .await;
            });
        }

        Ok(())
    }

    fn handle_task_ready(&self, id: &str) -> Result<()> {
        self.out.line(id, "ready");

        let (dependents, triggered) = {
            let mut state = self.state.lock().expect("runner lock poisoned");
            state.ready.insert(id.to_string());
            if state.status.get(id) == Some(&TaskStatus::Restarting) {
                state.status.insert(id.to_string(), TaskStatus::Running);
            }

            let active = self.active_subtree(&state);
            let dependents: Vec<String> = active
                .with_dependency(id)
                .into_iter()
                .filter(|other| state.status.get(other) == Some(&TaskStatus::NotStarted))
                .collect();
            let triggered = active.with_trigger(id);
            (dependents, triggered)
        };

        // Start tasks that were waiting on this one.
        for other in dependents {
            self.out
                .line(&other, format!("invalidated because it has not started and '{id}' is ready"));
            self.post(Message::Invalidate(other));
        }

        // Re-invoke tasks that list this one as a trigger.
        for other in triggered {
            self.out
                .line(&other, format!("invalidated because '{id}' is ready"));
            self.post(Message::Invalidate(other));
        }

        Ok(())
    }

    fn handle_task_exit(&self, id: &str, error: Option<TaskError>) -> Result<()> {
        // NOTE: never called for canceled executions, and may be called for
        // a task whose readiness never fired, in both success and failure.

        let kind = self.library.task(id).map(|t| t.metadata().kind);

        {
            let mut state = self.state.lock().expect("runner lock poisoned");
            state.executors.remove(id);
            match &error {
                Some(_) => {
                    state.status.insert(id.to_string(), TaskStatus::Failed);
                }
                None => {
                    state.status.insert(id.to_string(), TaskStatus::Done);
                    // Short tasks become ready by succeeding.
                    state.ready.insert(id.to_string());
                }
            }
        }

        match &error {
            Some(err) => self.out.line(id, format!("exit: {err}")),
            None => self.out.line(id, "exit ok"),
        }

        if self.mode == RunnerMode::Exit {
            // Fail the whole run when any task fails.
            if let Some(err) = &error {
                return Err(err.clone().into());
            }

            // Finish when every requested task is ready. Skip the readiness
            // dispatch below: there is no point starting work that the
            // ending run would immediately cancel.
            let all_ready = {
                let state = self.state.lock().expect("runner lock poisoned");
                state.requested.iter().all(|root| state.ready.contains(root))
            };
            if all_ready {
                self.post(Message::RunnerDone);
                return Ok(());
            }
        }

        if self.mode == RunnerMode::Keepalive {
            match (&error, kind) {
                // Unexpected failure: retry after a pause.
                (Some(_), _) => {
                    debug!(task = %id, "retrying in {:?}", RETRY_DELAY);
                    self.post_after(RETRY_DELAY, Message::RunTask(id.to_string()));
                }
                // Long tasks are kept alive: restart immediately.
                (None, Some(TaskType::Long)) => {
                    self.post(Message::RunTask(id.to_string()));
                }
                _ => {}
            }
        }

        // Propagate readiness so dependents and triggered tasks re-run.
        if error.is_none() {
            self.post(Message::TaskReady(id.to_string()));
        }

        Ok(())
    }

    fn handle_fs_event(&self, path: &str, events: &[EventInfo]) -> Result<()> {
        let invalidations = {
            let state = self.state.lock().expect("runner lock poisoned");
            self.active_subtree(&state).with_watch(path)
        };

        // An event that invalidates nothing means a watcher outlived its
        // subtree, which is a runner bug.
        if invalidations.is_empty() {
            bail!("no invalidations from watch on '{path}'");
        }

        debug!(path = %path, changes = events.len(), "watched files changed");
        self.out.line(
            WATCH_STREAM,
            format!("invalidating {{{}}}", invalidations.join(", ")),
        );
        for id in invalidations {
            self.post(Message::Invalidate(id));
        }

        Ok(())
    }
}
