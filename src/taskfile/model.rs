// src/taskfile/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::library::{TaskMetadata, TaskType};

/// A `tasks.toml` file as read from disk: a list of `[[task]]` records.
///
/// ```toml
/// [[task]]
/// id           = "build"
/// description  = "compile everything"
/// type         = "short"
/// dependencies = ["lint"]
/// triggers     = ["codegen"]
/// watch        = ["src/**/*.c"]
/// cmd          = "make"
/// env          = { FOO = "bar" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TaskfileDoc {
    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskRecord>,
}

/// One `[[task]]` record.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskRecord {
    pub id: String,

    #[serde(default)]
    pub description: String,

    /// `"long"` or `"short"`. There is no default.
    #[serde(rename = "type")]
    pub kind: TaskType,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub triggers: Vec<String>,

    #[serde(default)]
    pub watch: Vec<String>,

    /// The shell script to run. Evaluated like `bash -c "$cmd"` in the
    /// directory containing this task file.
    #[serde(default)]
    pub cmd: String,

    /// Overlaid on the runner's environment when the script runs.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl TaskRecord {
    /// Prefix this record's id and its references with the directory
    /// (relative to the root task file) that declared it, so `build` in
    /// `child/tasks.toml` becomes `child/build` everywhere.
    pub fn namespaced(mut self, dir: &str) -> TaskRecord {
        if dir == "." {
            return self;
        }
        self.id = join_id(dir, &self.id);
        for dep in &mut self.dependencies {
            *dep = join_id(dir, dep);
        }
        for trigger in &mut self.triggers {
            *trigger = join_id(dir, trigger);
        }
        for watch in &mut self.watch {
            *watch = join_id(dir, watch);
        }
        self
    }

    pub fn metadata(&self) -> TaskMetadata {
        let description = if self.description.is_empty()
            && !self.cmd.is_empty()
            && !self.cmd.contains('\n')
        {
            format!("\"{}\"", self.cmd)
        } else {
            self.description.clone()
        };
        TaskMetadata {
            id: self.id.clone(),
            description,
            kind: self.kind,
            dependencies: self.dependencies.clone(),
            triggers: self.triggers.clone(),
            watch: self.watch.clone(),
        }
    }
}

/// Join a directory prefix onto an id-like path, resolving `.` and `..`
/// segments, so a record in `a/b` can reference `../sibling/task`.
///
/// A `..` with nothing left to pop is kept, not dropped, so a reference
/// that climbs past the root still carries the leading `..` and fails the
/// inside-the-working-directory validation instead of silently landing on
/// an unrelated in-tree path.
pub fn join_id(dir: &str, id: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(id.split('/')) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&"..") | None => segments.push(".."),
                Some(_) => {
                    segments.pop();
                }
            },
            other => segments.push(other),
        }
    }
    segments.join("/")
}
