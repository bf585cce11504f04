//! Configuration error types.

use banyan_field::FieldError;

/// Errors raised while loading and resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("include '{path}' not found (declared in {declared_in})")]
  MissingInclude { path: String, declared_in: String },

  /// `bootstrap` and `include` never take rendering suffixes.
  #[error("key '{key}' does not support a rendering suffix")]
  SuffixNotAllowed { key: String },

  #[error(transparent)]
  Field(#[from] FieldError),

  #[error("invalid {what}: {message}")]
  Decode { what: String, message: String },

  #[error("invalid '{kind}' tool without name, index {index}")]
  UnnamedTool { kind: String, index: usize },

  #[error("invalid duplicate '{kind}' tool name '{name}'")]
  DuplicateTool { kind: String, name: String },

  #[error("renderer '{name}' has no known driver")]
  UnknownRendererKind { name: String },

  #[error("tasks key '{key}' is not '<toolKind>:<toolName>:<taskKind>'")]
  BadTaskKey { key: String },

  #[error("no task kind registered for '{key}'")]
  UnknownTaskKind { key: String },

  #[error("tasks '{key}' reference tool '{tool}' which is not configured")]
  UnknownTaskTool { key: String, tool: String },
}
