// src/main.rs

use taskmux::{cli, logging, run, TaskError};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("taskmux error: {err:?}");
        std::process::exit(1);
    }

    if let Err(err) = run(args).await {
        // A user cancel (Ctrl-C) is a clean termination.
        if matches!(err.downcast_ref::<TaskError>(), Some(TaskError::Canceled)) {
            return;
        }
        eprintln!("taskmux error: {err}");
        std::process::exit(1);
    }
}
