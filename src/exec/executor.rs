// src/exec/executor.rs

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TaskError;

type ExitResult = Result<(), TaskError>;
type TaskFuture = Pin<Box<dyn Future<Output = ExitResult> + Send>>;
type TaskFn = Box<dyn FnOnce(CancellationToken) -> TaskFuture + Send>;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Wraps a cancelable long-running operation into a handle that can be
/// passed around, canceled, and waited for.
///
/// The wrapped function runs at most once, no matter how many times
/// [`Executor::execute`] is called. Natural exits are delivered to every
/// [`Executor::wait`] subscriber; if the executor was canceled instead, the
/// wait channels close without a value, so supervisors can tell the two
/// apart.
///
/// Each executor carries a unique integer token. The runner replaces
/// executors on restart, and uses [`Executor::is`] to recognize whether a
/// registry entry still refers to the handle a supervisor was watching.
pub struct Executor {
    token: u64,
    cancel: CancellationToken,
    done: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

struct Inner {
    fun: Option<TaskFn>,
    result: Option<ExitResult>,
    canceled: bool,
    waiters: Vec<oneshot::Sender<ExitResult>>,
}

impl Executor {
    pub fn new<F, Fut>(fun: F) -> Arc<Self>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ExitResult> + Send + 'static,
    {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            cancel: CancellationToken::new(),
            done,
            inner: Mutex::new(Inner {
                fun: Some(Box::new(move |cancel| Box::pin(fun(cancel)))),
                result: None,
                canceled: false,
                waiters: Vec::new(),
            }),
        })
    }

    /// True if both handles refer to the same execution.
    pub fn is(&self, other: &Executor) -> bool {
        self.token == other.token
    }

    /// Start the wrapped function. Idempotent: only the first call runs it.
    pub fn execute(self: &Arc<Self>) {
        let fun = {
            let mut inner = self.inner.lock().expect("executor lock poisoned");
            match inner.fun.take() {
                Some(fun) => fun,
                None => return,
            }
        };

        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let result = fun(cancel).await;
            this.handle_exit(result);
        });
    }

    /// Subscribe to the exit of the wrapped function.
    ///
    /// The receiver yields the exit result on a natural exit, whether the
    /// subscription happened before or after it. If the executor was
    /// canceled, the channel closes without a value.
    pub fn wait(&self) -> oneshot::Receiver<ExitResult> {
        let mut inner = self.inner.lock().expect("executor lock poisoned");
        let (tx, rx) = oneshot::channel();
        match &inner.result {
            Some(result) if !inner.canceled => {
                let _ = tx.send(result.clone());
            }
            Some(_) => {
                // Canceled: drop tx so the channel closes empty.
            }
            None => inner.waiters.push(tx),
        }
        rx
    }

    /// Cancel the wrapped function and block until it has exited. Returns
    /// the exit error, which always includes the cancellation.
    pub async fn cancel(&self) -> ExitResult {
        {
            let mut inner = self.inner.lock().expect("executor lock poisoned");
            inner.canceled = true;
            if inner.result.is_none() && inner.fun.is_some() {
                // Never executed; nothing to wait for.
                inner.fun = None;
                inner.result = Some(Err(TaskError::Canceled));
                inner.waiters.clear();
                self.done.send_replace(true);
            }
        }

        self.cancel.cancel();

        let mut done = self.done.subscribe();
        let _ = done.wait_for(|done| *done).await;

        let result = self
            .inner
            .lock()
            .expect("executor lock poisoned")
            .result
            .clone()
            .expect("executor done without a result");

        match result {
            Err(err) => Err(err),
            Ok(()) => Err(TaskError::Canceled),
        }
    }

    /// True after either a natural exit or a cancel request.
    pub fn is_done(&self) -> bool {
        let inner = self.inner.lock().expect("executor lock poisoned");
        inner.canceled || inner.result.is_some()
    }

    fn handle_exit(&self, result: ExitResult) {
        debug!(token = self.token, ok = result.is_ok(), "executor exited");

        let (waiters, canceled) = {
            let mut inner = self.inner.lock().expect("executor lock poisoned");
            inner.result = Some(result.clone());
            (std::mem::take(&mut inner.waiters), inner.canceled)
        };

        if !canceled {
            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
        // Canceled: waiters are dropped, closing their channels empty.

        self.done.send_replace(true);
    }
}
