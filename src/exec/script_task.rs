// src/exec/script_task.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;
use crate::exec::script::Script;
use crate::library::{Task, TaskMetadata, TaskType};
use crate::output::TaskWriter;

/// A [`Task`] backed by a shell script. This is what task files load into.
///
/// The script's stdout and stderr are combined into the task's one output
/// stream. Script-backed `long` tasks have no natural readiness signal, so
/// they are reported ready immediately after a successful process spawn;
/// dependents must tolerate a brief window of unavailability.
#[derive(Debug, Clone)]
pub struct ScriptTask {
    metadata: TaskMetadata,
    script: Script,
}

impl ScriptTask {
    pub fn new(
        metadata: TaskMetadata,
        dir: impl Into<PathBuf>,
        env: BTreeMap<String, String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            metadata,
            script: Script::new(dir, env, text),
        }
    }

    /// The directory the script executes in.
    pub fn dir(&self) -> &Path {
        self.script.dir()
    }

    pub fn script(&self) -> &Script {
        &self.script
    }
}

#[async_trait]
impl Task for ScriptTask {
    fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        on_ready: mpsc::Sender<()>,
        output: TaskWriter,
    ) -> Result<(), TaskError> {
        // A short task with no script is done as soon as its dependencies
        // are; a long one idles until canceled.
        if self.script.is_empty() {
            return match self.metadata.kind {
                TaskType::Short => Ok(()),
                TaskType::Long => {
                    cancel.cancelled().await;
                    Err(TaskError::Canceled)
                }
            };
        }

        let execution = self.script.spawn(output.clone(), output)?;

        if self.metadata.kind == TaskType::Long {
            let _ = on_ready.send(()).await;
        }

        execution.wait(cancel).await
    }
}
