//! The process-wide renderer registry.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Renderer;

/// Name → renderer mapping.
///
/// Built while the configuration is loaded, then frozen behind an `Arc`;
/// reads during resolution need no synchronisation. Cloning is cheap (the
/// drivers themselves are shared) and used by the config layer to rebuild
/// the rendering context as registration stages complete.
#[derive(Default, Clone)]
pub struct Registry {
  renderers: HashMap<String, Arc<dyn Renderer>>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a renderer under its name; a later registration under the
  /// same name replaces the earlier one.
  pub fn add(&mut self, renderer: Arc<dyn Renderer>) {
    self.renderers.insert(renderer.name().to_owned(), renderer);
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
    self.renderers.get(name).cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.renderers.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.renderers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.renderers.is_empty()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.renderers.keys().map(String::as_str)
  }
}
