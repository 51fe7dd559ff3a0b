// src/library/validate.rs

use std::path::Component;

use anyhow::{anyhow, Result};
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::library::library::Library;
use crate::library::task::TaskType;
use crate::runner::{INTERLEAVED_STREAM, WATCH_STREAM};

/// Run semantic validation against a library.
///
/// This is invoked by the task-file loader, before the runner ever sees the
/// library. Embedders constructing a [`Library`] in code should call it
/// themselves.
///
/// Checks, for every task:
/// - the id is non-empty, contains no whitespace, and is not one of the
///   runner's reserved stream ids
/// - every dependency and trigger refers to an existing task
/// - no trigger refers to a `long` task
/// - watch paths are relative and stay inside the working directory
///
/// and, for the library as a whole, that the combined dependency + trigger
/// graph has no cycles.
///
/// All problems are reported together in one multi-line error.
pub fn validate(lib: &Library) -> Result<()> {
    let mut problems: Vec<String> = Vec::new();

    for id in lib.ids() {
        let task = lib.task(id).expect("library ids() and task() disagree");
        let meta = task.metadata();

        if meta.id.is_empty() {
            problems.push("task has no id".to_string());
        }
        if meta.id.chars().any(char::is_whitespace) {
            problems.push(format!("task id '{}' contains whitespace", meta.id));
        }
        if meta.id == INTERLEAVED_STREAM || meta.id == WATCH_STREAM {
            problems.push(format!(
                "'{}' is reserved and cannot be used as a task id",
                meta.id
            ));
        }

        for dep in &meta.dependencies {
            if !lib.has(dep) {
                problems.push(format!(
                    "task {} lists dependency '{}', which is not the id of a task",
                    meta.id, dep
                ));
            }
        }

        for trigger in &meta.triggers {
            match lib.task(trigger) {
                None => problems.push(format!(
                    "task {} lists trigger '{}', which is not the id of a task",
                    meta.id, trigger
                )),
                Some(t) if t.metadata().kind == TaskType::Long => problems.push(format!(
                    "task {} lists trigger '{}', but long tasks cannot be triggers",
                    meta.id, trigger
                )),
                Some(_) => {}
            }
        }

        for watch in &meta.watch {
            if let Some(problem) = check_watch_path(&meta.id, watch) {
                problems.push(problem);
            }
        }
    }

    if let Some(problem) = check_cycles(lib) {
        problems.push(problem);
    }

    if problems.is_empty() {
        return Ok(());
    }

    let mut lines = vec!["invalid task set".to_string()];
    lines.extend(problems.into_iter().map(|p| format!("- {p}")));
    Err(anyhow!(lines.join("\n")))
}

fn check_watch_path(id: &str, watch: &str) -> Option<String> {
    let path = std::path::Path::new(watch);
    if path.is_absolute() {
        return Some(format!(
            "task {id} watches absolute path '{watch}'; watch paths must be relative"
        ));
    }
    if path.components().any(|c| c == Component::ParentDir) {
        return Some(format!(
            "task {id} watches '{watch}', which escapes the working directory"
        ));
    }
    None
}

/// A topological sort over the combined dependency + trigger edges fails
/// exactly when there is a cycle.
fn check_cycles(lib: &Library) -> Option<String> {
    let tasks: Vec<_> = lib
        .ids()
        .iter()
        .filter_map(|id| lib.task(id))
        .collect();

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for task in &tasks {
        graph.add_node(task.metadata().id.as_str());
    }

    for task in &tasks {
        let meta = task.metadata();
        for dep in meta.dependencies.iter().chain(meta.triggers.iter()) {
            if lib.has(dep) {
                graph.add_edge(dep.as_str(), meta.id.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => None,
        Err(cycle) => Some(format!(
            "cycle detected in the task graph involving task '{}'",
            cycle.node_id()
        )),
    }
}
