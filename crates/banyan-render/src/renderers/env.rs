//! Environment expansion renderer.

use async_trait::async_trait;
use banyan_field::RenderInput;
use serde::Deserialize;

use crate::renderers::expand::expand_env;
use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "env";

/// Configuration of an `env` renderer instance.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvSpec {
  /// Permit `$(cmd)` evaluation while expanding.
  ///
  /// Backquoted strings are never evaluated regardless.
  #[serde(default)]
  pub enable_exec: bool,
}

/// Expands `$VAR` and `${VAR}` references in its input, preserving all other
/// formatting.
pub struct Env {
  name: String,
  spec: EnvSpec,
}

impl Env {
  pub fn new(name: impl Into<String>, spec: EnvSpec) -> Self {
    Self {
      name: name.into(),
      spec,
    }
  }
}

impl Default for Env {
  fn default() -> Self {
    Self::new(DEFAULT_NAME, EnvSpec::default())
  }
}

#[async_trait]
impl Renderer for Env {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let bytes = input.to_yaml_bytes().map_err(|e| RenderError::Input {
      renderer: self.name.clone(),
      message: e.to_string(),
    })?;
    let text = String::from_utf8(bytes).map_err(|_| RenderError::Input {
      renderer: self.name.clone(),
      message: "input is not utf-8".to_owned(),
    })?;

    let expanded = expand_env(&self.name, ctx, &text, self.spec.enable_exec).await?;
    Ok(expanded.into_bytes())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Registry;

  #[tokio::test]
  async fn expands_in_structured_input() {
    let ctx = RenderContext::builder(Registry::new())
      .env("TAG", "v1")
      .build();

    let input: serde_yaml::Value = serde_yaml::from_str("image: app:$TAG").unwrap();
    let out = Env::default()
      .render_yaml(&ctx, RenderInput::Value(input), &[])
      .await
      .unwrap();

    let parsed: serde_yaml::Value = serde_yaml::from_slice(&out).unwrap();
    assert_eq!(
      parsed,
      serde_yaml::from_str::<serde_yaml::Value>("image: app:v1").unwrap()
    );
  }
}
