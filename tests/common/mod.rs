// tests/common/mod.rs

//! Shared fixtures for the integration tests: buildable fake tasks and
//! output-transcript assertions.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use taskmux::{FuncTask, Task, TaskError, TaskMetadata, TaskType};

/// A builder for simple function-backed tasks that write recognizable
/// markers (`! id: execute`, `! id: start`, `! id: canceled`) to their
/// output stream.
pub struct FixtureTask {
    meta: TaskMetadata,
    behavior: Behavior,
}

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    BlockUntilCancel,
}

/// A short task that writes `! id: execute` and succeeds.
pub fn task(id: &str) -> FixtureTask {
    FixtureTask {
        meta: TaskMetadata::new(id, TaskType::Short),
        behavior: Behavior::Succeed,
    }
}

/// A long task that writes `! id: start`, blocks until canceled, then
/// writes `! id: canceled`.
pub fn long_task(id: &str) -> FixtureTask {
    FixtureTask {
        meta: TaskMetadata::new(id, TaskType::Long),
        behavior: Behavior::BlockUntilCancel,
    }
}

impl FixtureTask {
    pub fn failing(mut self) -> Self {
        self.behavior = Behavior::Fail;
        self
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.meta.dependencies = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_triggers(mut self, triggers: &[&str]) -> Self {
        self.meta.triggers = triggers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_watch(mut self, watch: &[&str]) -> Self {
        self.meta.watch = watch.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> Arc<dyn Task> {
        let id = self.meta.id.clone();
        let behavior = self.behavior;
        Arc::new(FuncTask::new(self.meta, move |cancel, on_ready, mut w| {
            let id = id.clone();
            async move {
                match behavior {
                    Behavior::Succeed => {
                        let _ = writeln!(w, "! {id}: execute");
                        Ok(())
                    }
                    Behavior::Fail => {
                        let _ = writeln!(w, "! {id}: execute");
                        Err(TaskError::failed("fail"))
                    }
                    Behavior::BlockUntilCancel => {
                        let _ = writeln!(w, "! {id}: start");
                        let _ = on_ready.send(()).await;
                        cancel.cancelled().await;
                        let _ = writeln!(w, "! {id}: canceled");
                        Err(TaskError::Canceled)
                    }
                }
            }
        }))
    }
}

/// Assert that each needle appears in the haystack, in order, each match
/// starting after the previous one ends.
pub fn assert_contains_sequence(haystack: &str, needles: &[&str]) {
    let mut pos = 0;
    for needle in needles {
        match haystack[pos..].find(needle) {
            Some(offset) => pos += offset + needle.len(),
            None => panic!("expected '{needle}' (in order) in output:\n{haystack}"),
        }
    }
}

pub fn count_occurrences(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
