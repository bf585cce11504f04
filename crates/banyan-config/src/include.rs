//! Include processing: one root document plus everything it pulls in,
//! merged into a single tree.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use banyan_field::DocValue;
use tracing::debug;

use crate::bootstrap::Bootstrap;
use crate::error::ConfigError;

/// What to do when an include path does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludePolicy {
  FailOnMissing,
  SkipMissing,
}

/// Load `root` and all transitively included documents, merged in include
/// order.
///
/// Include paths resolve relative to the file declaring them. A directory
/// expands to its `*.yaml` / `*.yml` entries, non-recursively, in name
/// order. Every file is loaded at most once (cycles and self-includes are
/// silently ignored), keyed by cleaned absolute path.
///
/// `bootstrap` sections never enter the generic document merge: each file's
/// section is split off here and folded through [`Bootstrap::merge`], which
/// knows the append/override/replace rules that section needs.
pub fn load_config_tree(
  root: &Path,
  policy: IncludePolicy,
) -> Result<(DocValue, Bootstrap), ConfigError> {
  let mut visited: HashSet<PathBuf> = HashSet::new();
  let mut merged: Option<DocValue> = None;
  let mut bootstrap = Bootstrap::default();

  load_one(root, policy, &mut visited, &mut merged, &mut bootstrap)?;

  let doc = merged.ok_or_else(|| ConfigError::Decode {
    what: "config".to_owned(),
    message: format!("no document loaded from {}", root.display()),
  })?;

  Ok((doc, bootstrap))
}

fn load_one(
  path: &Path,
  policy: IncludePolicy,
  visited: &mut HashSet<PathBuf>,
  merged: &mut Option<DocValue>,
  bootstrap: &mut Bootstrap,
) -> Result<(), ConfigError> {
  let cleaned = clean_abs(path);
  if !visited.insert(cleaned.clone()) {
    debug!(path = %path.display(), "already included, skipping");
    return Ok(());
  }

  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
    path: path.display().to_string(),
    source,
  })?;

  let raw: serde_yaml::Value =
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })?;
  let mut doc = DocValue::from_yaml(raw)?;

  // includes are processed before the document is merged so that merge
  // order matches declaration order
  let includes = take_includes(&mut doc, path)?;

  if let Some(section) = take_bootstrap(&mut doc, path)? {
    bootstrap.merge(section);
  }

  match merged {
    Some(existing) => existing.merge_sibling(doc)?,
    None => *merged = Some(doc),
  }

  let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
  for include in includes {
    let target = base_dir.join(&include);

    if target.is_dir() {
      let mut entries: Vec<PathBuf> = std::fs::read_dir(&target)
        .map_err(|source| ConfigError::Io {
          path: target.display().to_string(),
          source,
        })?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| {
          p.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
      entries.sort();

      for entry in entries {
        load_one(&entry, policy, visited, merged, bootstrap)?;
      }
      continue;
    }

    if !target.is_file() {
      match policy {
        IncludePolicy::SkipMissing => {
          debug!(path = %target.display(), "skipping missing include");
          continue;
        }
        IncludePolicy::FailOnMissing => {
          return Err(ConfigError::MissingInclude {
            path: target.display().to_string(),
            declared_in: path.display().to_string(),
          });
        }
      }
    }

    load_one(&target, policy, visited, merged, bootstrap)?;
  }

  Ok(())
}

/// Split the `bootstrap` section off a freshly parsed document, so the
/// generic tree merge never touches it.
fn take_bootstrap(doc: &mut DocValue, path: &Path) -> Result<Option<Bootstrap>, ConfigError> {
  let DocValue::Node(node) = doc else {
    return Ok(None);
  };

  match node.take("bootstrap") {
    Some(value) => value.decode().map(Some).map_err(|e| ConfigError::Decode {
      what: "bootstrap".to_owned(),
      message: format!("{}: {e}", path.display()),
    }),
    None => Ok(None),
  }
}

/// Pull the `include` list out of a freshly parsed document.
///
/// The key takes no rendering suffix; declaring one is an error.
fn take_includes(doc: &mut DocValue, path: &Path) -> Result<Vec<String>, ConfigError> {
  let DocValue::Node(node) = doc else {
    return Ok(Vec::new());
  };

  for key in node.unresolved_keys() {
    if key.key == "include" || key.key == "bootstrap" {
      return Err(ConfigError::SuffixNotAllowed {
        key: format!("{}@{}", key.key, key.suffix),
      });
    }
  }

  match node.take("include") {
    Some(value) => value.decode().map_err(|_| ConfigError::Decode {
      what: "include".to_owned(),
      message: format!("{}: include must be a list of paths", path.display()),
    }),
    None => Ok(Vec::new()),
  }
}

/// Lexically clean absolute path (no symlink resolution; the visited set
/// guards against textual cycles the way the include loader sees them).
fn clean_abs(path: &Path) -> PathBuf {
  let abs = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir()
      .unwrap_or_else(|_| PathBuf::from("."))
      .join(path)
  };

  let mut out = PathBuf::new();
  for part in abs.components() {
    match part {
      std::path::Component::CurDir => {}
      std::path::Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}
