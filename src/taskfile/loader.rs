// src/taskfile/loader.rs

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::exec::ScriptTask;
use crate::library::{validate, Library, Task};
use crate::taskfile::model::{TaskRecord, TaskfileDoc};

/// The file name task records are loaded from, in the root directory and in
/// any referenced subdirectory.
pub const TASKFILE_NAME: &str = "tasks.toml";

/// Load the task file in `root`, plus any task files referenced from it, and
/// return a validated [`Library`] of script-backed tasks.
///
/// A dependency or trigger like `child/build` refers to the task `build` in
/// `child/tasks.toml`; referencing it causes that file to be loaded too,
/// transitively. Ids, references, and watch paths from a subdirectory are
/// namespaced by the directory, and each task's working directory is the
/// directory containing its task file.
pub fn load(root: impl AsRef<Path>) -> Result<Library> {
    let root = root.as_ref();

    let mut records: Vec<(String, TaskRecord)> = Vec::new();
    let mut seen_dirs: HashSet<String> = HashSet::new();
    let mut queue: Vec<String> = vec![".".to_string()];

    while let Some(dir) = queue.pop() {
        if !seen_dirs.insert(dir.clone()) {
            continue;
        }

        let doc = read_taskfile(&root.join(&dir).join(TASKFILE_NAME))?;
        debug!(dir = %dir, tasks = doc.tasks.len(), "loaded task file");

        for record in doc.tasks {
            let record = record.namespaced(&dir);

            // A reference into another directory pulls that directory's task
            // file into the load.
            for reference in record.dependencies.iter().chain(record.triggers.iter()) {
                if let Some((ref_dir, _)) = reference.rsplit_once('/') {
                    if ref_dir != dir && !seen_dirs.contains(ref_dir) {
                        queue.push(ref_dir.to_string());
                    }
                }
            }

            records.push((dir.clone(), record));
        }
    }

    let mut problems: Vec<String> = Vec::new();
    for (_, record) in &records {
        if record.cmd.trim().is_empty() {
            problems.push(format!("- task {} has no cmd", record.id));
        }
    }
    if !problems.is_empty() {
        problems.insert(0, "invalid task set".to_string());
        return Err(anyhow!(problems.join("\n")));
    }

    let tasks: Vec<Arc<dyn Task>> = records
        .into_iter()
        .map(|(dir, record)| {
            // Each task executes in the directory containing its task file.
            let metadata = record.metadata();
            Arc::new(ScriptTask::new(metadata, root.join(dir), record.env, record.cmd))
                as Arc<dyn Task>
        })
        .collect();

    let library = Library::new(tasks);
    validate(&library)?;
    Ok(library)
}

fn read_taskfile(path: &Path) -> Result<TaskfileDoc> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading task file at {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parsing TOML from {}", path.display()))
}
