//! The seam between the document model and the renderer pipeline.

use async_trait::async_trait;
use serde_yaml::Value;

/// Boxed error type returned by rendering handlers.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Input handed to a renderer.
///
/// The first renderer of a chain receives the raw YAML subtree recorded at
/// unmarshal time; every later renderer receives the bytes produced by its
/// predecessor.
#[derive(Debug, Clone)]
pub enum RenderInput {
  /// A raw YAML subtree.
  Value(Value),
  /// Output bytes of the previous renderer in the chain.
  Bytes(Vec<u8>),
}

impl RenderInput {
  /// View the input as YAML bytes regardless of variant.
  pub fn to_yaml_bytes(&self) -> Result<Vec<u8>, serde_yaml::Error> {
    match self {
      RenderInput::Bytes(b) => Ok(b.clone()),
      RenderInput::Value(v) => crate::value::to_yaml_bytes(v),
    }
  }

  /// View the input as a string when it is scalar text.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      RenderInput::Bytes(b) => std::str::from_utf8(b).ok(),
      RenderInput::Value(Value::String(s)) => Some(s),
      RenderInput::Value(_) => None,
    }
  }
}

/// Resolves renderer names to transformations during field resolution.
///
/// Implemented by the rendering context, which owns the renderer registry,
/// the environment and the content cache.
#[async_trait]
pub trait RenderingHandler: Send + Sync {
  /// Render `input` with the named renderer.
  ///
  /// `attributes` are the tokens attached to the chain step
  /// (e.g. `allow_expired`); unrecognised tokens are an error in the
  /// renderer, not here.
  async fn render_yaml(
    &self,
    renderer: &str,
    attributes: &[String],
    input: RenderInput,
  ) -> Result<Vec<u8>, DynError>;
}
