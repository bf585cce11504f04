//! Hook and workflow actions.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ExecError;
use crate::reference::TaskReference;
use crate::spec::{ExecSpec, PlanStep};

/// One action of a hook or a `workflow:run` body.
///
/// Exactly one of `task`, `cmd`, `shell`, `shell:<name>` must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Action {
  /// Optional display name, used in error identities.
  #[serde(default)]
  pub name: String,

  /// Reference to another task; runs as a full nested invocation.
  #[serde(default)]
  pub task: Option<String>,

  /// Command argv, executed without any shell.
  #[serde(default)]
  pub cmd: Option<Vec<String>>,

  /// Script for the embedded interpreter (bootstrap `script_cmd`).
  #[serde(default)]
  pub shell: Option<String>,

  /// Working directory for `cmd` / `shell` actions.
  #[serde(default)]
  pub chdir: Option<PathBuf>,

  /// Ignore this action's execution failure and continue with the list.
  #[serde(default)]
  pub continue_on_error: bool,

  /// Catch-all: a single `shell:<name>: <script>` entry selects an external
  /// shell tool.
  #[serde(flatten)]
  pub other: IndexMap<String, String>,
}

impl Action {
  /// Identity used in error messages: `name (#idx)` or `#idx`.
  pub fn identity(&self, index: usize) -> String {
    if self.name.is_empty() {
      format!("#{index}")
    } else {
      format!("{} (#{index})", self.name)
    }
  }

  /// Turn the action into a plan step.
  ///
  /// `current_tool_name` resolves short-form task references.
  pub fn plan(&self, index: usize, current_tool_name: &str) -> Result<PlanStep, ExecError> {
    let identity = self.identity(index);

    let variants = [
      self.task.is_some(),
      self.cmd.is_some(),
      self.shell.is_some(),
      !self.other.is_empty(),
    ];
    if variants.iter().filter(|set| **set).count() != 1 {
      return Err(ExecError::InvalidAction {
        identity,
        message: "exactly one of task / cmd / shell / shell:<name> must be set".to_owned(),
      });
    }

    if let Some(reference) = &self.task {
      return Ok(PlanStep::TaskRef {
        reference: TaskReference::parse(reference, current_tool_name)?,
        ignore_error: self.continue_on_error,
      });
    }

    if let Some(cmd) = &self.cmd {
      return Ok(PlanStep::Specs(vec![ExecSpec {
        command: cmd.clone(),
        chdir: self.chdir.clone(),
        ignore_error: self.continue_on_error,
        show_stdout: true,
        show_stderr: true,
        ..ExecSpec::default()
      }]));
    }

    if let Some(script) = &self.shell {
      return Ok(PlanStep::Specs(vec![ExecSpec {
        command: vec![script.clone()],
        chdir: self.chdir.clone(),
        use_shell: true,
        shell_name: None,
        ignore_error: self.continue_on_error,
        show_stdout: true,
        show_stderr: true,
        ..ExecSpec::default()
      }]));
    }

    // the catch-all shell:<name> form
    if self.other.len() > 1 {
      return Err(ExecError::InvalidAction {
        identity,
        message: "unexpected multiple shell entries in one action".to_owned(),
      });
    }
    let (key, script) = self.other.first().expect("checked non-empty");
    let Some(shell_name) = key.strip_prefix("shell:") else {
      return Err(ExecError::InvalidAction {
        identity,
        message: format!("unknown action '{key}'"),
      });
    };

    Ok(PlanStep::Specs(vec![ExecSpec {
      command: vec![script.clone()],
      chdir: self.chdir.clone(),
      use_shell: true,
      shell_name: Some(shell_name.to_owned()),
      ignore_error: self.continue_on_error,
      show_stdout: true,
      show_stderr: true,
      ..ExecSpec::default()
    }]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn action(text: &str) -> Action {
    serde_yaml::from_str(text).unwrap()
  }

  #[test]
  fn cmd_action_becomes_one_spec() {
    let step = action("cmd: [echo, hi]\nchdir: sub").plan(0, "t").unwrap();
    let PlanStep::Specs(specs) = step else { panic!() };
    assert_eq!(specs[0].command, ["echo", "hi"]);
    assert_eq!(specs[0].chdir.as_deref(), Some(std::path::Path::new("sub")));
    assert!(!specs[0].use_shell);
  }

  #[test]
  fn embedded_shell_action() {
    let step = action("shell: echo hi").plan(0, "t").unwrap();
    let PlanStep::Specs(specs) = step else { panic!() };
    assert!(specs[0].use_shell);
    assert!(specs[0].shell_name.is_none());
  }

  #[test]
  fn named_shell_action() {
    let step = action("shell:zsh: echo hi").plan(0, "t").unwrap();
    let PlanStep::Specs(specs) = step else { panic!() };
    assert!(specs[0].use_shell);
    assert_eq!(specs[0].shell_name.as_deref(), Some("zsh"));
  }

  #[test]
  fn task_reference_action() {
    let step = action("task: golang:build(app)\ncontinue_on_error: true")
      .plan(0, "ci")
      .unwrap();
    let PlanStep::TaskRef {
      reference,
      ignore_error,
    } = step
    else {
      panic!()
    };
    assert_eq!(reference.tool_name, "ci");
    assert!(ignore_error);
  }

  #[test]
  fn multiple_variants_are_rejected() {
    assert!(action("cmd: [a]\nshell: b").plan(0, "t").is_err());
    assert!(action("name: empty").plan(0, "t").is_err());
    assert!(action("unknown:thing: x").plan(0, "t").is_err());
  }
}
