//! Named value renderers.
//!
//! A renderer is a named transformer consulted during field resolution:
//! `key@env|template!:` names a chain of them. This crate provides the
//! [`Renderer`] trait, the process-wide [`Registry`], the [`RenderContext`]
//! that carries environment, shells and the content cache, and the stock
//! drivers (`env`, `template`, `file`, `http`, `git`, `shell`,
//! `archivefile`, `transform`, `echo`).

mod attributes;
mod context;
mod error;
mod registry;
pub mod renderers;

pub use attributes::CacheAttributes;
pub use context::{unix_now, RenderContext, RenderContextBuilder, ShellSpec};
pub use error::RenderError;
pub use registry::Registry;

use async_trait::async_trait;
use banyan_field::RenderInput;

/// A named value transformer.
///
/// Renderers are constructed from their configuration spec while the config
/// is loaded, then frozen behind the registry for the rest of the run.
#[async_trait]
pub trait Renderer: Send + Sync {
  /// The registered name (e.g. `env`, `http:internal`).
  fn name(&self) -> &str;

  /// Transform `input` into output bytes.
  ///
  /// `attributes` are the `#`-tokens from the chain step; drivers decide
  /// what they recognise (typically cache policy).
  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    attributes: &[String],
  ) -> Result<Vec<u8>, RenderError>;
}
