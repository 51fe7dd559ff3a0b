// src/library/library.rs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::library::task::{Task, TaskType};
use crate::runner::INTERLEAVED_STREAM;

/// An immutable, ordered collection of [`Task`]s.
///
/// The library answers pure queries only; all run-scoped mutable state lives
/// in the runner. Construction preserves insertion order (the "canonical
/// order"), and every query that returns multiple ids returns them in that
/// order. Duplicate ids are ignored, first occurrence wins.
#[derive(Clone, Default)]
pub struct Library {
    ids: Vec<String>,
    tasks: HashMap<String, Arc<dyn Task>>,
    watchset: HashSet<String>,
}

impl Library {
    pub fn new(tasks: impl IntoIterator<Item = Arc<dyn Task>>) -> Self {
        let mut lib = Library::default();
        for task in tasks {
            let id = task.metadata().id.clone();
            if lib.tasks.contains_key(&id) {
                continue;
            }
            lib.ids.push(id.clone());
            lib.tasks.insert(id, task);
        }
        lib.watchset = lib
            .tasks
            .values()
            .flat_map(|t| t.metadata().watch.iter().cloned())
            .collect();
        lib
    }

    /// The task ids, in canonical order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn size(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The task with the given id, if any.
    pub fn task(&self, id: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(id).cloned()
    }

    pub fn has(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    /// The width of the widest stream id a run over this library can write
    /// to, including the runner's internal streams.
    pub fn longest_id(&self) -> usize {
        self.ids
            .iter()
            .map(|id| id.len())
            .chain([INTERLEAVED_STREAM.len()])
            .max()
            .unwrap_or(0)
    }

    /// A new library containing the given roots and the transitive closure
    /// of their dependencies, preserving canonical order. Unknown roots are
    /// silently dropped.
    pub fn subtree<I, S>(&self, roots: I) -> Library
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut include: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = roots.into_iter().map(|s| s.as_ref().to_string()).collect();
        while let Some(id) = stack.pop() {
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            if !include.insert(id) {
                continue;
            }
            stack.extend(task.metadata().dependencies.iter().cloned());
        }
        Library::new(
            self.ids
                .iter()
                .filter(|id| include.contains(*id))
                .map(|id| Arc::clone(&self.tasks[id])),
        )
    }

    /// The complete set of watched paths among the tasks, sorted. To find
    /// the watches implicated by one task and its dependencies, take its
    /// [`Library::subtree`] first.
    pub fn watches(&self) -> Vec<String> {
        let mut watches: Vec<String> = self.watchset.iter().cloned().collect();
        watches.sort();
        watches
    }

    pub fn has_watch(&self, path: &str) -> bool {
        self.watchset.contains(path)
    }

    /// Task ids that watch the given path, in canonical order.
    pub fn with_watch(&self, path: &str) -> Vec<String> {
        self.matching(|t| t.metadata().watch.iter().any(|w| w == path))
    }

    /// Task ids that list the given id as a dependency, in canonical order.
    pub fn with_dependency(&self, id: &str) -> Vec<String> {
        self.matching(|t| t.metadata().dependencies.iter().any(|d| d == id))
    }

    /// Task ids that list the given id as a trigger, in canonical order.
    pub fn with_trigger(&self, id: &str) -> Vec<String> {
        self.matching(|t| t.metadata().triggers.iter().any(|d| d == id))
    }

    pub fn has_any_long(&self) -> bool {
        self.tasks
            .values()
            .any(|t| t.metadata().kind == TaskType::Long)
    }

    fn matching(&self, pred: impl Fn(&dyn Task) -> bool) -> Vec<String> {
        self.ids
            .iter()
            .filter(|id| pred(self.tasks[*id].as_ref()))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("ids", &self.ids).finish()
    }
}
