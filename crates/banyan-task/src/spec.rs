//! Subprocess intents and the plan they form.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::context::TaskContext;
use crate::error::ExecError;
use crate::reference::TaskReference;

/// Replace table: `<TOKEN>` → bytes recorded by earlier specs, substituted
/// into later ones.
pub type ReplaceTable = IndexMap<String, Vec<u8>>;

/// Dynamic plan expansion hook: supersedes the normal spawn of its spec and
/// may splice further specs into the remaining queue.
#[async_trait]
pub trait AlterExec: Send + Sync {
  async fn run(
    &self,
    ctx: &TaskContext,
    replace: &mut ReplaceTable,
  ) -> Result<Vec<ExecSpec>, ExecError>;
}

/// Captured-stdout post-processing for `stdout_as_replace`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StdoutFixup {
  #[default]
  None,
  /// Trim surrounding whitespace (the usual fixup for single-line output).
  Trim,
  /// Trim, then strip a fixed prefix (e.g. `refs/remotes/origin/`).
  TrimThenStripPrefix(String),
}

impl StdoutFixup {
  pub fn apply(&self, bytes: Vec<u8>) -> Vec<u8> {
    match self {
      StdoutFixup::None => bytes,
      StdoutFixup::Trim => trim_ascii(bytes),
      StdoutFixup::TrimThenStripPrefix(prefix) => {
        let trimmed = trim_ascii(bytes);
        match trimmed.strip_prefix(prefix.as_bytes()) {
          Some(rest) => rest.to_vec(),
          None => trimmed,
        }
      }
    }
  }
}

fn trim_ascii(mut bytes: Vec<u8>) -> Vec<u8> {
  while bytes.last().is_some_and(|b| b.is_ascii_whitespace()) {
    bytes.pop();
  }
  let start = bytes
    .iter()
    .position(|b| !b.is_ascii_whitespace())
    .unwrap_or(bytes.len());
  bytes.drain(..start);
  bytes
}

/// One atomic subprocess intent.
#[derive(Clone, Default)]
pub struct ExecSpec {
  /// Extra environment on top of the context environment.
  pub env: Vec<(String, String)>,

  /// Command argv; `<TOKEN>` occurrences substitute from the replace table.
  /// When `use_shell` is set the joined command is piped through the shell.
  pub command: Vec<String>,

  /// Working directory, relative to the context working dir.
  pub chdir: Option<PathBuf>,

  /// Bytes written to the child's stdin.
  pub stdin: Option<Vec<u8>>,

  pub use_shell: bool,
  /// Named shell tool for `use_shell`; `None` means the bootstrap script
  /// interpreter.
  pub shell_name: Option<String>,

  /// A non-zero exit does not abort the plan.
  pub ignore_error: bool,

  /// Capture stdout into the replace table under this token.
  pub stdout_as_replace: Option<String>,
  pub fix_stdout: StdoutFixup,

  /// Supersedes spawning; see [`AlterExec`].
  pub alter_exec: Option<Arc<dyn AlterExec>>,

  pub show_stdout: bool,
  pub show_stderr: bool,
}

impl std::fmt::Debug for ExecSpec {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecSpec")
      .field("command", &self.command)
      .field("chdir", &self.chdir)
      .field("use_shell", &self.use_shell)
      .field("shell_name", &self.shell_name)
      .field("ignore_error", &self.ignore_error)
      .field("stdout_as_replace", &self.stdout_as_replace)
      .field("alter_exec", &self.alter_exec.is_some())
      .finish_non_exhaustive()
  }
}

impl ExecSpec {
  pub fn command(command: Vec<String>) -> Self {
    Self {
      command,
      show_stdout: true,
      show_stderr: true,
      ..Self::default()
    }
  }
}

/// One step of a task (or hook) plan.
#[derive(Debug, Clone)]
pub enum PlanStep {
  /// Execute specs in order.
  Specs(Vec<ExecSpec>),
  /// Run another task through the scheduler (a full nested invocation).
  TaskRef {
    reference: TaskReference,
    ignore_error: bool,
  },
}

/// The ordered plan a task or hook emits.
pub type TaskPlan = Vec<PlanStep>;

/// Per-matrix-entry options handed to `Task::exec_specs`.
#[derive(Debug, Clone)]
pub struct MatrixExecOptions {
  /// Identifies the enclosing task invocation; aggregation keys include it.
  pub exec_id: u64,
  /// Position of this entry in the expanded matrix.
  pub seq: usize,
  /// Number of entries in the expanded matrix.
  pub total: usize,
  pub use_shell: bool,
  pub shell_name: Option<String>,
  /// Command of the owning tool (e.g. `["docker"]`).
  pub tool_cmd: Vec<String>,
}

impl MatrixExecOptions {
  /// Whether this entry sits last in the expansion order.
  ///
  /// Positional only: with parallel entries it says nothing about
  /// completion order, so aggregators count reported entries instead
  /// (see `Aggregator::complete_entry`).
  pub fn is_last(&self) -> bool {
    self.seq + 1 == self.total
  }
}
