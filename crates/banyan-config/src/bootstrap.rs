//! The `bootstrap` section: what the engine needs before any renderer runs.

use banyan_task::EnvEntry;
use serde::Deserialize;

/// Bootstrap settings. No rendering suffix is permitted anywhere below this
/// key; it configures the machinery rendering itself depends on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Bootstrap {
  /// Environment entries exported before anything resolves.
  #[serde(default)]
  pub env: Vec<EnvEntry>,

  /// Cache directory; falls back to `$BANYAN_CACHE_DIR`, then
  /// `.banyan/cache` under the working directory.
  #[serde(default)]
  pub cache_dir: String,

  /// Interpreter argv for embedded scripts; defaults to `sh -c`.
  #[serde(default)]
  pub script_cmd: Vec<String>,
}

impl Bootstrap {
  /// Merge a sibling document's bootstrap on top of this one.
  ///
  /// Env entries append; a non-empty cache dir overrides; once a document
  /// changes the script command the whole bootstrap is replaced, since env
  /// semantics may depend on the interpreter.
  pub fn merge(&mut self, other: Bootstrap) {
    if !other.script_cmd.is_empty() {
      *self = other;
      return;
    }

    self.env.extend(other.env);
    if !other.cache_dir.is_empty() {
      self.cache_dir = other.cache_dir;
    }
  }

  /// The effective cache directory.
  pub fn effective_cache_dir(&self) -> String {
    if !self.cache_dir.is_empty() {
      return self.cache_dir.clone();
    }
    match std::env::var("BANYAN_CACHE_DIR") {
      Ok(dir) if !dir.is_empty() => dir,
      _ => ".banyan/cache".to_owned(),
    }
  }

  /// The effective script interpreter argv.
  pub fn effective_script_cmd(&self) -> Vec<String> {
    if self.script_cmd.is_empty() {
      vec!["sh".to_owned(), "-c".to_owned()]
    } else {
      self.script_cmd.clone()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bootstrap(text: &str) -> Bootstrap {
    serde_yaml::from_str(text).unwrap()
  }

  #[test]
  fn script_cmd_change_replaces_everything() {
    let mut base = bootstrap("env: [{name: A, value: '1'}]\ncache_dir: /tmp/c1\n");
    base.merge(bootstrap("script_cmd: [bash, -c]\n"));
    assert!(base.env.is_empty());
    assert_eq!(base.effective_script_cmd(), ["bash", "-c"]);
  }

  #[test]
  fn env_appends_and_cache_dir_overrides() {
    let mut base = bootstrap("env: [{name: A, value: '1'}]\ncache_dir: /tmp/c1\n");
    base.merge(bootstrap("env: [{name: B, value: '2'}]\n"));
    base.merge(bootstrap("cache_dir: /tmp/c2\n"));
    assert_eq!(base.env.len(), 2);
    assert_eq!(base.effective_cache_dir(), "/tmp/c2");
  }

  #[test]
  fn defaults_are_posix() {
    let b = Bootstrap::default();
    assert_eq!(b.effective_script_cmd(), ["sh", "-c"]);
  }
}
