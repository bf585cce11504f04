//! Renderer error types.

use banyan_cache::CacheError;
use banyan_field::FieldError;

/// Errors produced while rendering a value.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
  /// No renderer is registered under the requested name.
  #[error("renderer '{name}' not found")]
  UnknownRenderer { name: String },

  /// The input shape is not what the driver expects.
  #[error("renderer '{renderer}': unsupported input: {message}")]
  Input { renderer: String, message: String },

  /// The driver's structured input spec failed to resolve or decode.
  #[error("renderer '{renderer}': invalid input spec: {source}")]
  InputSpec {
    renderer: String,
    #[source]
    source: FieldError,
  },

  /// An attribute token is not recognised by the driver.
  #[error("renderer '{renderer}': unknown attribute '{attribute}'")]
  UnknownAttribute { renderer: String, attribute: String },

  /// A subprocess run by the driver failed.
  #[error("renderer '{renderer}': command failed ({message})")]
  Exec { renderer: String, message: String },

  /// Filesystem access failed.
  #[error("renderer '{renderer}': io error on {path}: {source}")]
  Io {
    renderer: String,
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// HTTP transport failure.
  #[error("renderer '{renderer}': http request failed: {source}")]
  Http {
    renderer: String,
    #[source]
    source: reqwest::Error,
  },

  /// Template compilation or rendering failure.
  #[error("renderer '{renderer}': template error: {source}")]
  Template {
    renderer: String,
    #[source]
    source: minijinja::Error,
  },

  /// Cache lookup failed (refresh and fallback both unavailable).
  #[error("renderer '{renderer}': {source}")]
  Cache {
    renderer: String,
    #[source]
    source: CacheError,
  },

  /// No archive codec recognises the input.
  #[error("renderer '{renderer}': no codec for archive '{archive}'")]
  NoCodec { renderer: String, archive: String },
}
