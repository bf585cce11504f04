//! Tools: named instances of a kind, owning their tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::task::Task;

/// `(kind, name)` key of a tool, e.g. `docker:myreg`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolKey {
  pub kind: String,
  pub name: String,
}

impl fmt::Display for ToolKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.name)
  }
}

/// A named tool instance. Tasks were grouped into it at config resolve
/// time; after that the tool is read-only.
pub struct Tool {
  kind: String,
  name: String,
  /// Command the tool's tasks run (e.g. `["docker"]`); defaults to the
  /// kind.
  cmd: Vec<String>,
  /// Resolved tool-level environment, layered under every task env.
  env: IndexMap<String, String>,
  /// Route this tool's commands through a shell; `shell_name` picks an
  /// external shell tool, otherwise the bootstrap interpreter is used.
  use_shell: bool,
  shell_name: Option<String>,
  /// Tool-specific cache directory; `None` means the run-wide cache root.
  cache_dir: Option<String>,
  tasks: HashMap<String, Arc<dyn Task>>,
}

impl Tool {
  pub fn new(
    kind: impl Into<String>,
    name: impl Into<String>,
    cmd: Vec<String>,
    env: IndexMap<String, String>,
  ) -> Self {
    let kind = kind.into();
    let cmd = if cmd.is_empty() {
      vec![kind.clone()]
    } else {
      cmd
    };
    Self {
      kind,
      name: name.into(),
      cmd,
      env,
      use_shell: false,
      shell_name: None,
      cache_dir: None,
      tasks: HashMap::new(),
    }
  }

  pub fn with_shell(mut self, use_shell: bool, shell_name: Option<String>) -> Self {
    self.use_shell = use_shell;
    self.shell_name = shell_name;
    self
  }

  pub fn with_cache_dir(mut self, cache_dir: Option<String>) -> Self {
    self.cache_dir = cache_dir;
    self
  }

  pub fn cache_dir(&self) -> Option<&str> {
    self.cache_dir.as_deref()
  }

  pub fn use_shell(&self) -> bool {
    self.use_shell
  }

  pub fn shell_name(&self) -> Option<&str> {
    self.shell_name.as_deref()
  }

  pub fn key(&self) -> ToolKey {
    ToolKey {
      kind: self.kind.clone(),
      name: self.name.clone(),
    }
  }

  pub fn kind(&self) -> &str {
    &self.kind
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn cmd(&self) -> &[String] {
    &self.cmd
  }

  pub fn env(&self) -> &IndexMap<String, String> {
    &self.env
  }

  /// Attach a task under `<taskKind>:<taskName>`.
  pub fn add_task(&mut self, task: Arc<dyn Task>) {
    self
      .tasks
      .insert(format!("{}:{}", task.kind(), task.name()), task);
  }

  pub fn get_task(&self, task_kind: &str, task_name: &str) -> Option<Arc<dyn Task>> {
    self.tasks.get(&format!("{task_kind}:{task_name}")).cloned()
  }

  pub fn tasks(&self) -> impl Iterator<Item = &Arc<dyn Task>> {
    self.tasks.values()
  }
}
