//! Deep merge over plain YAML values.

use serde_yaml::{Mapping, Value};

use crate::error::FieldError;

/// List handling during a map merge.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOpts {
  /// Append sequences instead of replacing them.
  pub list_append: bool,
  /// Deduplicate sequences after appending.
  pub list_unique: bool,
}

/// Merge `additional` into `original`.
///
/// Mappings merge recursively key-wise. Sequences replace by default and
/// append under [`MergeOpts::list_append`]. Scalars replace. Merging a
/// mapping or sequence into a value of a different shape fails.
pub fn merge_value(
  path: &str,
  original: Value,
  additional: Value,
  opts: MergeOpts,
) -> Result<Value, FieldError> {
  match additional {
    Value::Mapping(add) => match original {
      Value::Mapping(orig) => Ok(Value::Mapping(merge_map(path, orig, add, opts)?)),
      Value::Null => Ok(Value::Mapping(add)),
      other => Err(FieldError::MergeTypeMismatch {
        path: path.to_owned(),
        original: type_name(&other),
        additional: "mapping",
      }),
    },
    Value::Sequence(add) => match original {
      Value::Sequence(mut orig) => {
        if opts.list_append {
          orig.extend(add);
          if opts.list_unique {
            orig = unique_list(orig);
          }
          Ok(Value::Sequence(orig))
        } else {
          Ok(Value::Sequence(add))
        }
      }
      Value::Null => Ok(Value::Sequence(add)),
      other => Err(FieldError::MergeTypeMismatch {
        path: path.to_owned(),
        original: type_name(&other),
        additional: "sequence",
      }),
    },
    scalar => Ok(scalar),
  }
}

/// Key-wise recursive merge of two mappings.
pub fn merge_map(
  path: &str,
  original: Mapping,
  additional: Mapping,
  opts: MergeOpts,
) -> Result<Mapping, FieldError> {
  let mut out = original;
  for (k, v) in additional {
    match out.get(&k) {
      Some(existing) => {
        let child_path = match &k {
          Value::String(s) => format!("{path}.{s}"),
          other => format!("{path}.{other:?}"),
        };
        let merged = merge_value(&child_path, existing.clone(), v, opts)?;
        out.insert(k, merged);
      }
      None => {
        out.insert(k, v);
      }
    }
  }
  Ok(out)
}

/// Remove structurally equal duplicates, keeping first occurrences.
pub fn unique_list(items: Vec<Value>) -> Vec<Value> {
  let mut out: Vec<Value> = Vec::with_capacity(items.len());
  for item in items {
    if !out.contains(&item) {
      out.push(item);
    }
  }
  out
}

pub(crate) fn type_name(v: &Value) -> &'static str {
  match v {
    Value::Null => "null",
    Value::Bool(_) => "bool",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Sequence(_) => "sequence",
    Value::Mapping(_) => "mapping",
    Value::Tagged(_) => "tagged value",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn yaml(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap()
  }

  #[test]
  fn maps_merge_recursively() {
    let merged = merge_value(
      "t",
      yaml("a: {x: 1}\nb: keep"),
      yaml("a: {y: 2}\nc: new"),
      MergeOpts::default(),
    )
    .unwrap();
    assert_eq!(merged, yaml("a: {x: 1, y: 2}\nb: keep\nc: new"));
  }

  #[test]
  fn lists_replace_by_default() {
    let merged = merge_value("t", yaml("[a, b]"), yaml("[c]"), MergeOpts::default()).unwrap();
    assert_eq!(merged, yaml("[c]"));
  }

  #[test]
  fn lists_append_when_asked() {
    let opts = MergeOpts {
      list_append: true,
      list_unique: false,
    };
    let merged = merge_value("t", yaml("[a, b]"), yaml("[b, c]"), opts).unwrap();
    assert_eq!(merged, yaml("[a, b, b, c]"));
  }

  #[test]
  fn appended_lists_dedup_when_asked() {
    let opts = MergeOpts {
      list_append: true,
      list_unique: true,
    };
    let merged = merge_value("t", yaml("[a, b]"), yaml("[b, c]"), opts).unwrap();
    assert_eq!(merged, yaml("[a, b, c]"));
  }

  #[test]
  fn mapping_into_scalar_fails() {
    let err = merge_value("t", yaml("plain"), yaml("a: 1"), MergeOpts::default());
    assert!(err.is_err());
  }

  #[test]
  fn scalar_replaces() {
    let merged = merge_value("t", yaml("a: 1"), yaml("2"), MergeOpts::default()).unwrap();
    assert_eq!(merged, yaml("2"));
  }

  #[test]
  fn unique_preserves_first_occurrence_order() {
    let out = unique_list(vec![yaml("b"), yaml("a"), yaml("b"), yaml("a")]);
    assert_eq!(out, vec![yaml("b"), yaml("a")]);
  }
}
