//! The rendering context: environment, shells and cache shared by all
//! renderer invocations of one run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use banyan_field::{DynError, RenderInput, RenderingHandler};
use banyan_matrix::MatrixEntry;
use indexmap::IndexMap;

use crate::error::RenderError;
use crate::registry::Registry;

/// Unix seconds of the time being; the clock every cache lookup uses.
pub fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs())
    .unwrap_or(0)
}

/// An external shell interpreter known to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
  /// Interpreter argv; the script is appended as the final argument
  /// (e.g. `["/bin/zsh", "-c"]`).
  pub cmd: Vec<String>,
  /// Extra environment exported to the interpreter.
  pub env: IndexMap<String, String>,
}

/// State shared by every context clone of a run, frozen after config.
struct Shared {
  registry: Registry,
  shells: HashMap<String, ShellSpec>,
  script_cmd: Vec<String>,
  cache_root: PathBuf,
}

/// A cheaply cloneable rendering context.
///
/// Cloning shares the registry, shells and cache root; environment, matrix
/// binding and working directory are per-clone so matrix entries can render
/// against their own view without clobbering each other.
#[derive(Clone)]
pub struct RenderContext {
  shared: Arc<Shared>,
  env: IndexMap<String, String>,
  matrix: MatrixEntry,
  working_dir: PathBuf,
}

pub struct RenderContextBuilder {
  registry: Registry,
  shells: HashMap<String, ShellSpec>,
  script_cmd: Vec<String>,
  cache_root: PathBuf,
  env: IndexMap<String, String>,
  working_dir: PathBuf,
}

impl RenderContextBuilder {
  pub fn new(registry: Registry) -> Self {
    Self {
      registry,
      shells: HashMap::new(),
      script_cmd: vec!["sh".to_owned(), "-c".to_owned()],
      cache_root: PathBuf::from(".banyan/cache"),
      env: IndexMap::new(),
      working_dir: PathBuf::from("."),
    }
  }

  /// Seed the context environment from the calling process.
  pub fn inherit_process_env(mut self) -> Self {
    for (k, v) in std::env::vars() {
      self.env.insert(k, v);
    }
    self
  }

  pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(name.into(), value.into());
    self
  }

  pub fn shell(mut self, name: impl Into<String>, spec: ShellSpec) -> Self {
    self.shells.insert(name.into(), spec);
    self
  }

  /// Interpreter used for embedded scripts (`shell:` actions, `$(...)`
  /// expansion); defaults to `sh -c`.
  pub fn script_cmd(mut self, cmd: Vec<String>) -> Self {
    if !cmd.is_empty() {
      self.script_cmd = cmd;
    }
    self
  }

  pub fn cache_root(mut self, dir: impl Into<PathBuf>) -> Self {
    self.cache_root = dir.into();
    self
  }

  pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.working_dir = dir.into();
    self
  }

  pub fn build(self) -> RenderContext {
    RenderContext {
      shared: Arc::new(Shared {
        registry: self.registry,
        shells: self.shells,
        script_cmd: self.script_cmd,
        cache_root: self.cache_root,
      }),
      env: self.env,
      matrix: MatrixEntry::new(),
      working_dir: self.working_dir,
    }
  }
}

impl RenderContext {
  pub fn builder(registry: Registry) -> RenderContextBuilder {
    RenderContextBuilder::new(registry)
  }

  pub fn registry(&self) -> &Registry {
    &self.shared.registry
  }

  pub fn get_env(&self, name: &str) -> Option<&str> {
    self.env.get(name).map(String::as_str)
  }

  /// The full environment, for exporting into subprocesses.
  pub fn env_iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn matrix_entry(&self) -> &MatrixEntry {
    &self.matrix
  }

  pub fn working_dir(&self) -> &Path {
    &self.working_dir
  }

  pub fn cache_root(&self) -> &Path {
    &self.shared.cache_root
  }

  pub fn script_cmd(&self) -> &[String] {
    &self.shared.script_cmd
  }

  pub fn shell(&self, name: &str) -> Option<&ShellSpec> {
    self.shared.shells.get(name)
  }

  /// Clone with additional environment entries layered on top.
  pub fn with_env<I, K, V>(&self, extra: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut out = self.clone();
    for (k, v) in extra {
      out.env.insert(k.into(), v.into());
    }
    out
  }

  /// Clone with a matrix entry bound: its dimensions become `MATRIX_*`
  /// environment variables and the entry is reachable from templates.
  pub fn with_matrix_entry(&self, entry: &MatrixEntry) -> Self {
    let mut out = self.with_env(entry.env_vars());
    out.matrix = entry.clone();
    out
  }

  pub fn with_working_dir(&self, dir: impl Into<PathBuf>) -> Self {
    let mut out = self.clone();
    out.working_dir = dir.into();
    out
  }
}

#[async_trait]
impl RenderingHandler for RenderContext {
  async fn render_yaml(
    &self,
    renderer: &str,
    attributes: &[String],
    input: RenderInput,
  ) -> Result<Vec<u8>, DynError> {
    let driver = self
      .shared
      .registry
      .get(renderer)
      .ok_or_else(|| RenderError::UnknownRenderer {
        name: renderer.to_owned(),
      })?;

    driver
      .render_yaml(self, input, attributes)
      .await
      .map_err(Into::into)
  }
}
