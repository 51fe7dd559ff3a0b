// src/library/task.rs

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;
use crate::output::TaskWriter;

/// How the runner manages a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Expected to run indefinitely. Kept alive by restarting on exit; marked
    /// ready as soon as it has started (or when it signals readiness).
    Long,
    /// Expected to complete. Marked ready when it exits successfully.
    Short,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Long => write!(f, "long"),
            TaskType::Short => write!(f, "short"),
        }
    }
}

/// The facts about a task that the runner uses for orchestration.
#[derive(Debug, Clone)]
pub struct TaskMetadata {
    /// Identifies the task, e.g. for command-line invocation (`taskmux <id>`)
    /// and as its output stream name. Must be non-empty, contain no
    /// whitespace, and not collide with the runner's internal stream ids.
    pub id: String,

    /// Optional free text shown by `taskmux --list`.
    pub description: String,

    /// Whether the task is `long` or `short`. There is no default: every
    /// task declares its type.
    pub kind: TaskType,

    /// Task ids that must become ready before this task starts. A dependency
    /// completing again later does not restart this task; use a trigger for
    /// that.
    pub dependencies: Vec<String>,

    /// Task ids whose successful completion re-invokes this task. Triggers
    /// must be `short` tasks, since `long` tasks aren't expected to end.
    pub triggers: Vec<String>,

    /// Relative glob paths. A filesystem change under a watched path
    /// invalidates (re-invokes) this task. Only honored in keepalive runs.
    pub watch: Vec<String>,
}

impl TaskMetadata {
    pub fn new(id: impl Into<String>, kind: TaskType) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            kind,
            dependencies: Vec::new(),
            triggers: Vec::new(),
            watch: Vec::new(),
        }
    }
}

/// Anything implementing Task can be put into a [`Library`] and run by the
/// [`Runner`]. [`ScriptTask`] and [`FuncTask`] are the two implementations
/// provided by this crate.
///
/// `start` runs the task to completion, writing output to `output`. It must
/// return promptly once `cancel` fires. A task signals that its dependents
/// may begin by sending on `on_ready`; tasks with no natural readiness
/// signal just drop the sender, and a successful exit implies readiness.
///
/// [`Library`]: crate::library::Library
/// [`Runner`]: crate::runner::Runner
/// [`ScriptTask`]: crate::exec::ScriptTask
/// [`FuncTask`]: crate::library::FuncTask
#[async_trait]
pub trait Task: Send + Sync {
    fn metadata(&self) -> &TaskMetadata;

    async fn start(
        &self,
        cancel: CancellationToken,
        on_ready: mpsc::Sender<()>,
        output: TaskWriter,
    ) -> Result<(), TaskError>;
}
