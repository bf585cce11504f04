//! Transform renderer: an ordered op pipeline over a seed value.

use async_trait::async_trait;
use banyan_field::{DocValue, RenderInput};
use serde::Deserialize;

use crate::renderers::template::render_str;
use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "transform";

/// One pipeline step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
  /// Render a template with the current payload bound as `value`.
  Template(String),
  /// Literal text replacement on the current payload.
  Replace { old: String, new: String },
}

/// Input spec: a seed `value` and the ops applied to it in order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformSpec {
  #[serde(default)]
  pub value: String,
  #[serde(default)]
  pub ops: Vec<Op>,
}

/// Applies an ordered op pipeline to a seed value; the final payload is the
/// rendered output.
pub struct Transform {
  name: String,
}

impl Transform {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

impl Default for Transform {
  fn default() -> Self {
    Self::new(DEFAULT_NAME)
  }
}

#[async_trait]
impl Renderer for Transform {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let raw = match input {
      RenderInput::Value(v) => v,
      RenderInput::Bytes(b) => {
        serde_yaml::from_slice(&b).map_err(|e| RenderError::Input {
          renderer: self.name.clone(),
          message: e.to_string(),
        })?
      }
    };

    // the spec's own fields may carry rendering suffixes
    let mut doc = DocValue::from_yaml(raw).map_err(|source| RenderError::InputSpec {
      renderer: self.name.clone(),
      source,
    })?;
    doc
      .resolve(ctx, -1)
      .await
      .map_err(|source| RenderError::InputSpec {
        renderer: self.name.clone(),
        source,
      })?;
    let spec: TransformSpec = doc.decode().map_err(|source| RenderError::InputSpec {
      renderer: self.name.clone(),
      source,
    })?;

    let mut payload = spec.value;
    for op in &spec.ops {
      payload = match op {
        Op::Template(source) => {
          render_str(ctx, source, Some(&payload)).map_err(|source| RenderError::Template {
            renderer: self.name.clone(),
            source,
          })?
        }
        Op::Replace { old, new } => payload.replace(old.as_str(), new.as_str()),
      };
    }

    Ok(payload.into_bytes())
  }
}
