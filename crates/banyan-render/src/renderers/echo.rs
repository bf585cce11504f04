//! Identity renderer, used by pipeline tests.

use async_trait::async_trait;
use banyan_field::RenderInput;

use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "echo";

pub struct Echo {
  name: String,
}

impl Echo {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

impl Default for Echo {
  fn default() -> Self {
    Self::new(DEFAULT_NAME)
  }
}

#[async_trait]
impl Renderer for Echo {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    _ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    input.to_yaml_bytes().map_err(|e| RenderError::Input {
      renderer: self.name.clone(),
      message: e.to_string(),
    })
  }
}
