//! Field engine error types.

use crate::render::DynError;

/// Errors raised while decoding, resolving or merging documents.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
  /// A mapping key does not match the rendering-suffix grammar.
  #[error("invalid rendering suffix in key '{key}': {message}")]
  InvalidSuffix { key: String, message: String },

  /// A renderer named by a suffix failed to produce output.
  #[error("renderer '{renderer}' failed at {path}: {source}")]
  Renderer {
    renderer: String,
    path: String,
    #[source]
    source: DynError,
  },

  /// Rendered bytes could not be parsed back as YAML.
  #[error("rendered value at {path} is not valid yaml: {source}")]
  RenderedParse {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },

  /// A patch spec could not be decoded from the payload.
  #[error("invalid patch spec at {path}: {message}")]
  PatchSpec { path: String, message: String },

  /// RFC 6902 patch application failed.
  #[error("patch application failed at {path}: {source}")]
  PatchApply {
    path: String,
    #[source]
    source: json_patch::PatchError,
  },

  /// Values of incompatible shapes were merged.
  #[error("cannot merge {additional} into {original} at {path}")]
  MergeTypeMismatch {
    path: String,
    original: &'static str,
    additional: &'static str,
  },

  /// The document still holds unresolved entries where a resolved tree is
  /// required.
  #[error("unresolved field '{key}' remains at {path}")]
  Unresolved { path: String, key: String },

  /// Typed decode of a resolved tree failed.
  #[error("failed to decode resolved value at {path}: {source}")]
  Decode {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },

  /// A value could not be projected between YAML and JSON.
  #[error("cannot represent value at {path} as json: {message}")]
  JsonProjection { path: String, message: String },
}
