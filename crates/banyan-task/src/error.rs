//! Execution error types.

use banyan_field::FieldError;
use banyan_render::RenderError;

/// Errors raised while planning or executing tasks.
///
/// Field and render failures are configuration/resolution errors: they abort
/// the whole invocation and are never tolerated by `continue_on_error`,
/// which applies to command execution only.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
  /// The run was cancelled.
  #[error("execution cancelled")]
  Cancelled,

  /// Field resolution failed while preparing a task or hook.
  #[error(transparent)]
  Field(#[from] FieldError),

  /// A renderer failed outside field resolution (e.g. a tool-level env).
  #[error(transparent)]
  Render(#[from] RenderError),

  /// A resolved section did not decode into its expected shape.
  #[error("invalid {what} for {identity}: {message}")]
  Decode {
    what: &'static str,
    identity: String,
    message: String,
  },

  /// A subprocess could not be spawned.
  #[error("{identity}: failed to spawn {command:?}: {source}")]
  Spawn {
    identity: String,
    command: Vec<String>,
    #[source]
    source: std::io::Error,
  },

  /// A subprocess exited non-zero.
  #[error("{identity}: command {command:?} exited with code {code:?}")]
  CommandFailed {
    identity: String,
    command: Vec<String>,
    code: Option<i32>,
  },

  /// An action declared more than one (or none) of its variants.
  #[error("{identity}: invalid action: {message}")]
  InvalidAction { identity: String, message: String },

  /// A `task:` reference did not parse.
  #[error("invalid task reference '{text}': {message}")]
  BadTaskReference { text: String, message: String },

  /// A referenced tool is not configured.
  #[error("tool '{key}' not found")]
  UnknownTool { key: String },

  /// A referenced task is not configured on the tool.
  #[error("task '{key}' not found on tool '{tool}'")]
  UnknownTask { key: String, tool: String },

  /// A hook name is not one of the known lifecycle points.
  #[error("unknown hook point '{name}'")]
  UnknownHook { name: String },

  /// A named shell is not configured.
  #[error("shell '{name}' not configured")]
  ShellNotFound { name: String },

  /// Nested `task:` hooks recursed too deep (reference cycle).
  #[error("task recursion exceeds depth {limit}")]
  DepthExceeded { limit: usize },
}
