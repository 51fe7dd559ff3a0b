// src/library/func_task.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;
use crate::library::task::{Task, TaskMetadata};
use crate::output::TaskWriter;

type StartFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;
type StartFn =
    dyn Fn(CancellationToken, mpsc::Sender<()>, TaskWriter) -> StartFuture + Send + Sync;

/// A [`Task`] backed by an async function, for embedders that want to run
/// arbitrary code under the runner rather than shell scripts.
///
/// Unlike script-backed tasks, a function-backed `long` task can signal
/// readiness precisely, by sending on the `on_ready` channel once it is
/// actually serving.
#[derive(Clone)]
pub struct FuncTask {
    metadata: TaskMetadata,
    fun: Arc<StartFn>,
}

impl FuncTask {
    pub fn new<F, Fut>(metadata: TaskMetadata, fun: F) -> Self
    where
        F: Fn(CancellationToken, mpsc::Sender<()>, TaskWriter) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self {
            metadata,
            fun: Arc::new(move |cancel, on_ready, output| {
                Box::pin(fun(cancel, on_ready, output))
            }),
        }
    }
}

#[async_trait]
impl Task for FuncTask {
    fn metadata(&self) -> &TaskMetadata {
        &self.metadata
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        on_ready: mpsc::Sender<()>,
        output: TaskWriter,
    ) -> Result<(), TaskError> {
        (self.fun)(cancel, on_ready, output).await
    }
}
