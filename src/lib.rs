// src/lib.rs

pub mod cli;
pub mod errors;
pub mod exec;
pub mod library;
pub mod logging;
pub mod output;
pub mod runner;
pub mod taskfile;
pub mod watch;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use crate::errors::TaskError;
pub use crate::library::{FuncTask, Library, Task, TaskMetadata, TaskType};
pub use crate::output::{MemoryWriter, MultiWriter, Printer};
pub use crate::runner::{Runner, RunnerMode, Status, TaskStatus};

use crate::cli::CliArgs;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - task-file loading & validation
/// - run-mode selection (keepalive iff the subtree has a long task)
/// - the printer sink
/// - the runner
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let library = taskfile::load(&args.dir)?;

    let Some(root) = args.task.as_deref() else {
        if args.list {
            print_task_list(&library);
            return Ok(());
        }
        anyhow::bail!("no task given; try `taskmux --list` to see the available tasks");
    };

    let subtree = library.subtree([root]);
    if args.list {
        print_task_list(&subtree);
        return Ok(());
    }

    // A subtree with a long task never finishes on its own, so it runs in
    // keepalive mode with file watches; an all-short subtree runs to
    // completion and exits.
    let mode = if subtree.has_any_long() {
        RunnerMode::Keepalive
    } else {
        RunnerMode::Exit
    };
    info!(root = %root, ?mode, "starting");

    let sink = match args.ui {
        cli::UiKind::Printer => Printer::new(library.longest_id()),
    };
    let runner = Runner::new(mode, library, &args.dir, sink);

    // Ctrl-C → graceful shutdown.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received; canceling run");
                cancel.cancel();
            }
        });
    }

    runner.run(cancel, &[root]).await
}

fn print_task_list(library: &Library) {
    let width = library.longest_id();
    println!("tasks ({}):", library.size());
    for id in library.ids() {
        let task = library.task(id).expect("library ids() and task() disagree");
        let meta = task.metadata();
        let first_line = meta.description.lines().next().unwrap_or("");
        println!("  {id:<width$}  [{}]  {first_line}", meta.kind);
    }
}
