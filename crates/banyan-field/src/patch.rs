//! Patch specs: deep-merge directives plus RFC 6902 operations.
//!
//! A renderer step with a `!` suffix reads its payload as a [`PatchSpec`].
//! The spec's `value` is what the renderer actually receives; `merge` and
//! `patches` are applied to the renderer's output.

use serde::Deserialize;
use serde_json::json;
use serde_yaml::Value;

use crate::error::FieldError;
use crate::merge::{merge_map, unique_list, MergeOpts};
use crate::value::{json_to_yaml, yaml_to_json};

/// One source of additional data to merge into the rendered value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MergeSource {
  #[serde(default)]
  pub data: Value,
}

/// A single RFC 6902 operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonPatchOp {
  pub op: String,
  pub path: String,
  #[serde(default)]
  pub value: Option<Value>,
  #[serde(default)]
  pub from: Option<String>,
}

/// Patch pass attached to a renderer step via the `!` suffix.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchSpec {
  /// Base payload handed to the renderer in place of the patch spec itself.
  #[serde(default)]
  pub value: Value,

  /// Additional data merged into the rendered value, in order.
  #[serde(default)]
  pub merge: Vec<MergeSource>,

  /// RFC 6902 operations applied to the JSON projection of the merged value.
  #[serde(default)]
  pub patches: Vec<JsonPatchOp>,

  /// Deduplicate the merged sequence (sequence payloads only).
  #[serde(default)]
  pub unique: bool,

  /// During map merges, append sequences instead of replacing them.
  #[serde(default)]
  pub map_list_append: bool,

  /// Deduplicate sequences appended during map merges.
  #[serde(default)]
  pub map_list_item_unique: bool,
}

impl PatchSpec {
  /// Apply `merge` then `patches` to the rendered value.
  pub fn apply_to(&self, path: &str, rendered: Value) -> Result<Value, FieldError> {
    let merged = self.merge_into(path, rendered)?;
    if self.patches.is_empty() {
      return Ok(merged);
    }

    let mut doc = yaml_to_json(path, &merged)?;
    let patch_ops = self.patch_ops(path)?;
    json_patch::patch(&mut doc, &patch_ops).map_err(|source| FieldError::PatchApply {
      path: path.to_owned(),
      source,
    })?;

    Ok(json_to_yaml(&doc))
  }

  fn merge_into(&self, path: &str, base: Value) -> Result<Value, FieldError> {
    let mut sources = self.merge.as_slice();

    let mut current = base;
    if current.is_null() {
      // a patch applied to a nil base yields the merge data itself
      match sources.split_first() {
        None => return Ok(Value::Null),
        Some((first, rest)) => {
          current = first.data.clone();
          sources = rest;
        }
      }
    }

    match current {
      Value::Sequence(mut seq) => {
        for src in sources {
          match &src.data {
            Value::Sequence(items) => {
              seq.extend(items.iter().cloned());
              if self.unique {
                seq = unique_list(seq);
              }
            }
            Value::Null => {}
            other => {
              return Err(FieldError::MergeTypeMismatch {
                path: path.to_owned(),
                original: "sequence",
                additional: crate::merge::type_name(other),
              })
            }
          }
        }
        Ok(Value::Sequence(seq))
      }
      Value::Mapping(mut map) => {
        let opts = MergeOpts {
          list_append: self.map_list_append,
          list_unique: self.map_list_item_unique,
        };
        for src in sources {
          match &src.data {
            Value::Mapping(extra) => {
              map = merge_map(path, map, extra.clone(), opts)?;
            }
            Value::Null => {}
            other => {
              return Err(FieldError::MergeTypeMismatch {
                path: path.to_owned(),
                original: "mapping",
                additional: crate::merge::type_name(other),
              })
            }
          }
        }
        Ok(Value::Mapping(map))
      }
      scalar => {
        // merging data into a scalar payload is not supported; a bare
        // scalar with no merge sources passes through untouched
        if sources.is_empty() {
          Ok(scalar)
        } else {
          Err(FieldError::MergeTypeMismatch {
            path: path.to_owned(),
            original: crate::merge::type_name(&scalar),
            additional: "merge data",
          })
        }
      }
    }
  }

  fn patch_ops(&self, path: &str) -> Result<json_patch::Patch, FieldError> {
    let mut ops = Vec::with_capacity(self.patches.len());
    for op in &self.patches {
      let mut entry = json!({
        "op": op.op,
        "path": op.path,
      });
      if let Some(v) = &op.value {
        entry["value"] = yaml_to_json(path, v)?;
      }
      if let Some(from) = &op.from {
        entry["from"] = json!(from);
      }
      ops.push(entry);
    }

    serde_json::from_value(serde_json::Value::Array(ops)).map_err(|e| FieldError::PatchSpec {
      path: path.to_owned(),
      message: format!("invalid rfc6902 operations: {e}"),
    })
  }
}
