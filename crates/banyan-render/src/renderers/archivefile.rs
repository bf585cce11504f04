//! Archive entry extraction renderer (`archivefile`, alias `af`).
//!
//! Format codecs (tar/zip and their compressions) are external
//! collaborators behind [`ArchiveCodec`]; the driver owns input parsing,
//! archive loading and codec selection.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use banyan_field::{DocValue, RenderInput};
use serde::Deserialize;

use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "archivefile";
pub const ALIAS_NAME: &str = "af";

/// Boxed error type for codec implementations.
pub type CodecError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One archive format implementation.
pub trait ArchiveCodec: Send + Sync {
  /// Codec name, for error messages (`tar`, `zip`, ...).
  fn name(&self) -> &str;

  /// Whether this codec recognises the archive, judging from its leading
  /// bytes and filename.
  fn sniff(&self, filename: &str, header: &[u8]) -> bool;

  /// Extract a single entry by its path inside the archive.
  fn extract(&self, archive: &[u8], entry: &str) -> Result<Vec<u8>, CodecError>;
}

/// What to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ArchiveSpec {
  /// Path of the archive, relative to the working directory.
  pub archive: String,
  /// Path of the entry inside the archive.
  #[serde(default)]
  pub path: String,
}

/// Extracts a named entry from an archive.
///
/// The one-line form is `<archive>:<path>`; a mapping input is read as an
/// [`ArchiveSpec`].
pub struct ArchiveFile {
  name: String,
  codecs: Vec<Arc<dyn ArchiveCodec>>,
}

impl ArchiveFile {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      codecs: Vec::new(),
    }
  }

  pub fn with_codec(mut self, codec: Arc<dyn ArchiveCodec>) -> Self {
    self.codecs.push(codec);
    self
  }

  fn parse_one_line(line: &str) -> ArchiveSpec {
    match line.split_once(':') {
      Some((archive, "")) => ArchiveSpec {
        archive: archive.to_owned(),
        path: ".".to_owned(),
      },
      Some((archive, path)) => ArchiveSpec {
        archive: archive.to_owned(),
        path: path.to_owned(),
      },
      None => ArchiveSpec {
        archive: line.to_owned(),
        path: String::new(),
      },
    }
  }

  async fn load(&self, ctx: &RenderContext, spec: &ArchiveSpec) -> Result<Vec<u8>, RenderError> {
    let path = ctx.working_dir().join(&spec.archive);
    let data = tokio::fs::read(&path)
      .await
      .map_err(|source| RenderError::Io {
        renderer: self.name.clone(),
        path: path.display().to_string(),
        source,
      })?;

    let codec = self
      .codecs
      .iter()
      .find(|c| c.sniff(&spec.archive, &data))
      .ok_or_else(|| RenderError::NoCodec {
        renderer: self.name.clone(),
        archive: spec.archive.clone(),
      })?;

    codec
      .extract(&data, &spec.path)
      .map_err(|e| RenderError::Exec {
        renderer: self.name.clone(),
        message: format!(
          "codec '{}' failed on '{}:{}': {e}",
          codec.name(),
          spec.archive,
          spec.path
        ),
      })
  }
}

#[async_trait]
impl Renderer for ArchiveFile {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let spec = match input {
      RenderInput::Bytes(b) => {
        let line = String::from_utf8(b).map_err(|_| RenderError::Input {
          renderer: self.name.clone(),
          message: "archive spec is not utf-8".to_owned(),
        })?;
        Self::parse_one_line(line.trim())
      }
      RenderInput::Value(serde_yaml::Value::String(line)) => Self::parse_one_line(line.trim()),
      RenderInput::Value(raw) => {
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
        doc.decode().map_err(|source| RenderError::InputSpec {
          renderer: self.name.clone(),
          source,
        })?
      }
    };

    self.load(ctx, &spec).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Registry;

  #[test]
  fn one_line_spec_forms() {
    assert_eq!(
      ArchiveFile::parse_one_line("foo:/bar"),
      ArchiveSpec {
        archive: "foo".into(),
        path: "/bar".into()
      }
    );
    assert_eq!(
      ArchiveFile::parse_one_line("foo:bar"),
      ArchiveSpec {
        archive: "foo".into(),
        path: "bar".into()
      }
    );
    assert_eq!(
      ArchiveFile::parse_one_line("foo:"),
      ArchiveSpec {
        archive: "foo".into(),
        path: ".".into()
      }
    );
    assert_eq!(
      ArchiveFile::parse_one_line("foo"),
      ArchiveSpec {
        archive: "foo".into(),
        path: String::new()
      }
    );
  }

  struct KeyValueCodec;

  impl ArchiveCodec for KeyValueCodec {
    fn name(&self) -> &str {
      "kv"
    }

    fn sniff(&self, filename: &str, _header: &[u8]) -> bool {
      filename.ends_with(".kv")
    }

    fn extract(&self, archive: &[u8], entry: &str) -> Result<Vec<u8>, CodecError> {
      let text = std::str::from_utf8(archive)?;
      for line in text.lines() {
        if let Some((name, value)) = line.split_once('=') {
          if name == entry {
            return Ok(value.as_bytes().to_vec());
          }
        }
      }
      Err(format!("entry '{entry}' not found").into())
    }
  }

  #[tokio::test]
  async fn extracts_through_a_codec() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("bundle.kv"), "a=1\nb=2\n").unwrap();

    let ctx = RenderContext::builder(Registry::new())
      .working_dir(tmp.path())
      .build();
    let driver = ArchiveFile::new(DEFAULT_NAME).with_codec(Arc::new(KeyValueCodec));

    let out = driver
      .render_yaml(&ctx, RenderInput::Bytes(b"bundle.kv:b".to_vec()), &[])
      .await
      .unwrap();
    assert_eq!(out, b"2");
  }

  #[tokio::test]
  async fn unknown_format_reports_no_codec() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("bundle.bin"), b"????").unwrap();

    let ctx = RenderContext::builder(Registry::new())
      .working_dir(tmp.path())
      .build();
    let driver = ArchiveFile::new(DEFAULT_NAME).with_codec(Arc::new(KeyValueCodec));

    let err = driver
      .render_yaml(&ctx, RenderInput::Bytes(b"bundle.bin:x".to_vec()), &[])
      .await
      .unwrap_err();
    assert!(matches!(err, RenderError::NoCodec { .. }));
  }
}
