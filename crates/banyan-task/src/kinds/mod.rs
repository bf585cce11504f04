//! Shipped task kinds and the pattern registry that creates them.
//!
//! Task kinds are registered against `<toolKind>:<taskKind>` patterns; the
//! config layer consults the registry when it groups the `tasks:` sections
//! into concrete task values.

pub mod container_push;
pub mod git_clone;
pub mod workflow_run;

use std::sync::Arc;

use regex::Regex;

use crate::task::{Task, TaskDoc};

/// Builds a task value from its declared name and body.
pub type TaskFactory = fn(name: String, doc: TaskDoc) -> Arc<dyn Task>;

/// `(pattern over "<toolKind>:<taskKind>") → factory` registry.
#[derive(Default)]
pub struct TaskRegistry {
  entries: Vec<(Regex, TaskFactory)>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// The built-in kinds.
  pub fn with_defaults() -> Self {
    let mut registry = Self::new();
    registry.register(r"^git:clone$", git_clone::new_task);
    registry.register(r"^(container|docker|buildah|podman):push$", container_push::new_task);
    registry.register(r"^workflow:run$", workflow_run::new_task);
    registry
  }

  /// Register a factory; panics on an invalid pattern (registration
  /// happens at startup with literal patterns).
  pub fn register(&mut self, pattern: &str, factory: TaskFactory) {
    let re = Regex::new(pattern).expect("invalid task kind pattern");
    self.entries.push((re, factory));
  }

  /// Create a task for `<toolKind>:<taskKind>`, first matching pattern
  /// wins.
  pub fn create(
    &self,
    tool_kind: &str,
    task_kind: &str,
    name: String,
    doc: TaskDoc,
  ) -> Option<Arc<dyn Task>> {
    let key = format!("{tool_kind}:{task_kind}");
    self
      .entries
      .iter()
      .find(|(re, _)| re.is_match(&key))
      .map(|(_, factory)| factory(name, doc))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use banyan_field::DocValue;

  #[test]
  fn defaults_cover_the_shipped_kinds() {
    let registry = TaskRegistry::with_defaults();
    let doc = || TaskDoc::new(DocValue::from_yaml_str("{}").unwrap());

    assert!(registry.create("git", "clone", "x".into(), doc()).is_some());
    assert!(registry.create("docker", "push", "x".into(), doc()).is_some());
    assert!(registry.create("buildah", "push", "x".into(), doc()).is_some());
    assert!(registry.create("workflow", "run", "x".into(), doc()).is_some());
    assert!(registry.create("git", "push", "x".into(), doc()).is_none());
  }
}
