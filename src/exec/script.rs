// src/exec/script.rs

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::TaskError;
use crate::output::TaskWriter;

/// How long a canceled script gets to die gracefully after SIGINT before we
/// resort to SIGKILL.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// One shell script plus its execution context. Scripts do nothing until
/// spawned, and a single `Script` can be spawned many times.
///
/// The script is evaluated in a new shell process, in its own process group,
/// with `env` overlaid on the current environment. Effectively:
///
/// ```text
/// $ cd $DIR
/// $ $ENV bash -c "$TEXT"
/// ```
#[derive(Debug, Clone)]
pub struct Script {
    dir: PathBuf,
    env: BTreeMap<String, String>,
    text: String,
}

impl Script {
    /// If `dir` is empty, the script runs in the current working directory.
    pub fn new(
        dir: impl Into<PathBuf>,
        env: BTreeMap<String, String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            env,
            text: text.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Spawn the script and wait for it to finish. The returned error is
    /// `None`-equivalent only if the process exits 0 and `cancel` never
    /// fires; see [`ScriptExecution::wait`] for the cancellation ladder.
    pub async fn run(
        &self,
        cancel: CancellationToken,
        stdout: TaskWriter,
        stderr: TaskWriter,
    ) -> Result<(), TaskError> {
        self.spawn(stdout, stderr)?.wait(cancel).await
    }

    /// Start the script's process, piping its stdout and stderr into the
    /// given writers.
    pub fn spawn(
        &self,
        stdout: TaskWriter,
        stderr: TaskWriter,
    ) -> Result<ScriptExecution, TaskError> {
        let shell = find_shell()?;

        let mut cmd = Command::new(shell);
        cmd.arg("-c")
            .arg(&self.text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(&self.env);
        if !self.dir.as_os_str().is_empty() {
            cmd.current_dir(&self.dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|err| TaskError::failed(format!("spawning script: {err}")))?;
        let pid = child.id();
        debug!(?pid, "script process spawned");

        let mut io_tasks = Vec::new();
        if let Some(pipe) = child.stdout.take() {
            io_tasks.push(spawn_pipe_copy(pipe, stdout));
        }
        if let Some(pipe) = child.stderr.take() {
            io_tasks.push(spawn_pipe_copy(pipe, stderr.clone()));
        }

        Ok(ScriptExecution {
            child,
            pid,
            stderr,
            io_tasks,
        })
    }
}

/// A script's live process.
pub struct ScriptExecution {
    child: Child,
    pid: Option<u32>,
    stderr: TaskWriter,
    io_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ScriptExecution {
    /// Wait for the process to exit, or for `cancel` to fire.
    ///
    /// On cancellation: a `canceled; stopping` diagnostic goes to stderr,
    /// SIGINT goes to the whole process group, and if the process is still
    /// alive after [`KILL_GRACE`] it gets SIGKILL. The returned error joins
    /// the cancellation with any signalling failures (a group that already
    /// died is not a failure).
    pub async fn wait(mut self, cancel: CancellationToken) -> Result<(), TaskError> {
        let status = tokio::select! {
            status = self.child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        match status {
            Some(status) => {
                // Drain the pipes before reporting the exit, so a task's
                // final output always precedes its exit log line.
                for io_task in self.io_tasks.drain(..) {
                    let _ = io_task.await;
                }
                exit_result(status)
            }
            None => self.stop().await,
        }
    }

    async fn stop(mut self) -> Result<(), TaskError> {
        let _ = writeln!(self.stderr, "canceled; stopping");

        let mut extra: Vec<String> = Vec::new();

        #[cfg(unix)]
        {
            use nix::sys::signal::Signal;

            if let Err(err) = signal_group(self.pid, Signal::SIGINT) {
                extra.push(format!("sigint error: {err}"));
            }

            if timeout(KILL_GRACE, self.child.wait()).await.is_err() {
                debug!(pid = ?self.pid, "script ignored SIGINT; sending SIGKILL");
                if let Err(err) = signal_group(self.pid, Signal::SIGKILL) {
                    extra.push(format!("sigkill error: {err}"));
                }
                let _ = self.child.wait().await;
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
            let _ = timeout(KILL_GRACE, self.child.wait()).await;
        }

        for io_task in self.io_tasks.drain(..) {
            let _ = io_task.await;
        }

        Err(TaskError::Canceled.join(&extra))
    }
}

fn exit_result(status: std::io::Result<std::process::ExitStatus>) -> Result<(), TaskError> {
    let status = status.map_err(|err| TaskError::failed(format!("wait error: {err}")))?;
    if status.success() {
        Ok(())
    } else {
        Err(TaskError::Exit(status.code().unwrap_or(-1)))
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) -> Result<(), String> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return Ok(());
    };
    match killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH means the group is already gone, which is what we wanted.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}

fn spawn_pipe_copy(
    mut pipe: impl AsyncRead + Unpin + Send + 'static,
    mut writer: TaskWriter,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if writer.write_all(&buf[..n]).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Locate a POSIX shell once and cache it for the life of the process.
fn find_shell() -> Result<&'static Path, TaskError> {
    static SHELL: OnceLock<Result<PathBuf, String>> = OnceLock::new();

    let found = SHELL.get_or_init(|| {
        let output = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("command -v bash || command -v sh")
            .output()
            .map_err(|err| format!("locating shell: {err}"))?;
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if path.is_empty() {
            return Err("no POSIX shell found on this system".to_string());
        }
        Ok(PathBuf::from(path))
    });

    match found {
        Ok(path) => Ok(path.as_path()),
        Err(err) => Err(TaskError::failed(err.clone())),
    }
}
