//! File content renderer.

use async_trait::async_trait;
use banyan_field::RenderInput;

use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "file";

/// Reads a path (relative to the working directory) and renders its
/// contents.
pub struct File {
  name: String,
}

impl File {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

impl Default for File {
  fn default() -> Self {
    Self::new(DEFAULT_NAME)
  }
}

#[async_trait]
impl Renderer for File {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let rel = input.as_str().ok_or_else(|| RenderError::Input {
      renderer: self.name.clone(),
      message: "expecting a file path string".to_owned(),
    })?;
    let rel = rel.trim();

    let path = ctx.working_dir().join(rel);
    tokio::fs::read(&path).await.map_err(|source| RenderError::Io {
      renderer: self.name.clone(),
      path: path.display().to_string(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Registry;

  #[tokio::test]
  async fn reads_relative_to_working_dir() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("data.txt"), b"payload").unwrap();

    let ctx = RenderContext::builder(Registry::new())
      .working_dir(tmp.path())
      .build();

    let out = File::default()
      .render_yaml(&ctx, RenderInput::Bytes(b"data.txt".to_vec()), &[])
      .await
      .unwrap();
    assert_eq!(out, b"payload");
  }

  #[tokio::test]
  async fn missing_file_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = RenderContext::builder(Registry::new())
      .working_dir(tmp.path())
      .build();

    let err = File::default()
      .render_yaml(&ctx, RenderInput::Bytes(b"absent".to_vec()), &[])
      .await
      .unwrap_err();
    assert!(matches!(err, RenderError::Io { .. }));
  }
}
