//! The two-phase document tree.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_yaml::Value;

use crate::error::FieldError;
use crate::patch::PatchSpec;
use crate::render::{RenderInput, RenderingHandler};
use crate::suffix::{parse_key, RendererStep};
use crate::value::{parse_rendered, to_yaml_bytes};

/// Key of an unresolved entry: the bare key plus the verbatim suffix text.
///
/// The suffix participates in identity so that `foo@env` entries from
/// sibling documents accumulate while `foo@env` and `foo@shell` stay
/// distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedKey {
  pub key: String,
  pub suffix: String,
}

/// A raw subtree (or several, accumulated from sibling documents) waiting
/// for its renderer chain.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedField {
  pub chain: Vec<RendererStep>,
  pub raws: Vec<Value>,
}

/// A structured mapping node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocNode {
  /// YAML tag (`!kind` / `!kind:name`) carried by the mapping, if any.
  pub tag: Option<String>,
  resolved: IndexMap<String, DocValue>,
  unresolved: IndexMap<UnresolvedKey, UnresolvedField>,
}

/// A document value in one of its two phases.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
  /// A fully decoded leaf (scalar, or a mapping with non-string keys which
  /// the suffix grammar cannot address).
  Plain(Value),
  Seq(Vec<DocValue>),
  Node(DocNode),
}

impl Default for DocValue {
  fn default() -> Self {
    DocValue::Plain(Value::Null)
  }
}

impl DocValue {
  /// Suffix-aware decode of a raw YAML tree.
  pub fn from_yaml(v: Value) -> Result<Self, FieldError> {
    match v {
      // the suffix grammar addresses string keys only; a mapping with any
      // other key shape is an opaque leaf for the engine
      Value::Mapping(map) if map.keys().any(|k| !k.is_string()) => {
        Ok(DocValue::Plain(Value::Mapping(map)))
      }
      Value::Mapping(map) => DocNode::from_mapping(None, map).map(DocValue::Node),
      Value::Tagged(tagged) => {
        let tag = tagged.tag.to_string();
        let tag = tag.trim_start_matches('!').to_owned();
        match tagged.value {
          Value::Mapping(map) if map.keys().all(Value::is_string) => {
            DocNode::from_mapping(Some(tag), map).map(DocValue::Node)
          }
          other => Ok(DocValue::Plain(Value::Tagged(Box::new(
            serde_yaml::value::TaggedValue {
              tag: tagged.tag,
              value: other,
            },
          )))),
        }
      }
      Value::Sequence(items) => Ok(DocValue::Seq(
        items
          .into_iter()
          .map(DocValue::from_yaml)
          .collect::<Result<_, _>>()?,
      )),
      scalar => Ok(DocValue::Plain(scalar)),
    }
  }

  /// Parse YAML text straight into a document.
  pub fn from_yaml_str(text: &str) -> Result<Self, FieldError> {
    let v: Value = serde_yaml::from_str(text).map_err(|source| FieldError::RenderedParse {
      path: String::new(),
      source,
    })?;
    Self::from_yaml(v)
  }

  /// Whether any unresolved entry remains anywhere beneath this value.
  pub fn has_unresolved(&self) -> bool {
    match self {
      DocValue::Plain(_) => false,
      DocValue::Seq(items) => items.iter().any(DocValue::has_unresolved),
      DocValue::Node(node) => {
        !node.unresolved.is_empty() || node.resolved.values().any(DocValue::has_unresolved)
      }
    }
  }

  /// Project the resolved tree back onto plain YAML.
  ///
  /// Fails if an unresolved entry remains.
  pub fn to_value(&self) -> Result<Value, FieldError> {
    self.to_value_at("")
  }

  fn to_value_at(&self, path: &str) -> Result<Value, FieldError> {
    match self {
      DocValue::Plain(v) => Ok(v.clone()),
      DocValue::Seq(items) => Ok(Value::Sequence(
        items
          .iter()
          .enumerate()
          .map(|(i, item)| item.to_value_at(&format!("{path}[{i}]")))
          .collect::<Result<_, _>>()?,
      )),
      DocValue::Node(node) => {
        if let Some(k) = node.unresolved.keys().next() {
          return Err(FieldError::Unresolved {
            path: path.to_owned(),
            key: k.key.clone(),
          });
        }

        let mut map = serde_yaml::Mapping::with_capacity(node.resolved.len());
        for (k, v) in &node.resolved {
          map.insert(
            Value::String(k.clone()),
            v.to_value_at(&join_path(path, k))?,
          );
        }

        match &node.tag {
          Some(tag) => Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
            tag: serde_yaml::value::Tag::new(tag.clone()),
            value: Value::Mapping(map),
          }))),
          None => Ok(Value::Mapping(map)),
        }
      }
    }
  }

  /// Decode the resolved tree into a typed value.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T, FieldError> {
    let v = self.to_value()?;
    serde_yaml::from_value(v).map_err(|source| FieldError::Decode {
      path: String::new(),
      source,
    })
  }

  /// Merge a sibling document into this one.
  ///
  /// Resolved subtrees merge hierarchically (mappings key-wise, sequences
  /// appended, scalars replaced); unresolved entries with the same
  /// `(key, suffix)` accumulate their raw values in input order.
  pub fn merge_sibling(&mut self, other: DocValue) -> Result<(), FieldError> {
    self.merge_sibling_at("", other)
  }

  fn merge_sibling_at(&mut self, path: &str, other: DocValue) -> Result<(), FieldError> {
    match (&mut *self, other) {
      (DocValue::Node(a), DocValue::Node(b)) => a.merge_sibling_node(path, b),
      (DocValue::Seq(a), DocValue::Seq(b)) => {
        a.extend(b);
        Ok(())
      }
      (DocValue::Plain(Value::Null), other) => {
        *self = other;
        Ok(())
      }
      (DocValue::Plain(_), other @ DocValue::Plain(_)) => {
        *self = other;
        Ok(())
      }
      (current, other) => Err(FieldError::MergeTypeMismatch {
        path: path.to_owned(),
        original: current.shape_name(),
        additional: other.shape_name(),
      }),
    }
  }

  fn shape_name(&self) -> &'static str {
    match self {
      DocValue::Plain(_) => "scalar",
      DocValue::Seq(_) => "sequence",
      DocValue::Node(_) => "mapping",
    }
  }

  /// Drive rendering over the whole tree.
  ///
  /// `depth < 0` resolves without bound, `depth == 0` is a no-op; children
  /// of a resolved slot are visited at `depth - 1`. Resolution is monotonic
  /// and idempotent.
  pub fn resolve<'a>(
    &'a mut self,
    rc: &'a dyn RenderingHandler,
    depth: i64,
  ) -> Pin<Box<dyn Future<Output = Result<(), FieldError>> + Send + 'a>> {
    self.resolve_at(rc, depth, String::new(), None)
  }

  /// Resolve a clone of this tree, leaving `self` untouched.
  ///
  /// Tasks are re-resolved per matrix entry against entry-specific context;
  /// cloning keeps one entry's rendering from leaking into the next.
  pub async fn resolved_clone(
    &self,
    rc: &dyn RenderingHandler,
    depth: i64,
  ) -> Result<DocValue, FieldError> {
    let mut clone = self.clone();
    clone.resolve(rc, depth).await?;
    Ok(clone)
  }

  fn resolve_at<'a>(
    &'a mut self,
    rc: &'a dyn RenderingHandler,
    depth: i64,
    path: String,
    fields: Option<&'a [&'a str]>,
  ) -> Pin<Box<dyn Future<Output = Result<(), FieldError>> + Send + 'a>> {
    Box::pin(async move {
      if depth == 0 {
        return Ok(());
      }

      match self {
        DocValue::Plain(_) => Ok(()),
        DocValue::Seq(items) => {
          for (i, item) in items.iter_mut().enumerate() {
            item
              .resolve_at(rc, depth - 1, format!("{path}[{i}]"), None)
              .await?;
          }
          Ok(())
        }
        DocValue::Node(node) => node.resolve_fields_at(rc, depth, path, fields).await,
      }
    })
  }
}

impl DocNode {
  fn from_mapping(tag: Option<String>, map: serde_yaml::Mapping) -> Result<Self, FieldError> {
    let mut node = DocNode {
      tag,
      ..DocNode::default()
    };

    for (k, v) in map {
      let raw_key = k.as_str().unwrap_or_default().to_owned();
      let parsed = parse_key(&raw_key)?;
      if parsed.is_bare() {
        node
          .resolved
          .insert(parsed.key, DocValue::from_yaml(v)?);
      } else {
        let key = UnresolvedKey {
          key: parsed.key,
          suffix: parsed.suffix,
        };
        node
          .unresolved
          .entry(key)
          .or_insert_with(|| UnresolvedField {
            chain: parsed.chain,
            raws: Vec::new(),
          })
          .raws
          .push(v);
      }
    }

    Ok(node)
  }

  /// Resolved value of a key, if present.
  pub fn get(&self, key: &str) -> Option<&DocValue> {
    self.resolved.get(key)
  }

  pub fn get_mut(&mut self, key: &str) -> Option<&mut DocValue> {
    self.resolved.get_mut(key)
  }

  /// Remove and return a resolved entry, preserving the order of the rest.
  pub fn take(&mut self, key: &str) -> Option<DocValue> {
    self.resolved.shift_remove(key)
  }

  /// Resolved entries in declaration order.
  pub fn entries(&self) -> impl Iterator<Item = (&str, &DocValue)> {
    self.resolved.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// Bare keys of entries still waiting for rendering.
  pub fn unresolved_keys(&self) -> impl Iterator<Item = &UnresolvedKey> {
    self.unresolved.keys()
  }

  pub fn is_empty(&self) -> bool {
    self.resolved.is_empty() && self.unresolved.is_empty()
  }

  fn merge_sibling_node(&mut self, path: &str, other: DocNode) -> Result<(), FieldError> {
    for (k, v) in other.resolved {
      match self.resolved.get_mut(&k) {
        Some(existing) => existing.merge_sibling_at(&join_path(path, &k), v)?,
        None => {
          self.resolved.insert(k, v);
        }
      }
    }

    for (k, v) in other.unresolved {
      match self.unresolved.get_mut(&k) {
        Some(existing) => existing.raws.extend(v.raws),
        None => {
          self.unresolved.insert(k, v);
        }
      }
    }

    Ok(())
  }

  /// Resolve this node, optionally restricted to the named keys.
  pub async fn resolve_fields(
    &mut self,
    rc: &dyn RenderingHandler,
    depth: i64,
    fields: Option<&[&str]>,
  ) -> Result<(), FieldError> {
    self.resolve_fields_at(rc, depth, String::new(), fields).await
  }

  async fn resolve_fields_at(
    &mut self,
    rc: &dyn RenderingHandler,
    depth: i64,
    path: String,
    fields: Option<&[&str]>,
  ) -> Result<(), FieldError> {
    if depth == 0 {
      return Ok(());
    }

    let wanted = |key: &str| fields.map_or(true, |names| names.contains(&key));

    // take the pending entries up front; rendering may not touch the map
    // while iterating
    let pending: Vec<(UnresolvedKey, UnresolvedField)> = {
      let keys: Vec<UnresolvedKey> = self
        .unresolved
        .keys()
        .filter(|k| wanted(&k.key))
        .cloned()
        .collect();
      keys
        .into_iter()
        .filter_map(|k| self.unresolved.shift_remove(&k).map(|v| (k, v)))
        .collect()
    };

    let mut handled: HashSet<String> = HashSet::new();

    for (ukey, field) in pending {
      let field_path = join_path(&path, &ukey.key);
      let multi_base = handled.contains(&ukey.key);

      for (i, raw) in field.raws.iter().enumerate() {
        let keep_old = multi_base || i != 0;
        let rendered =
          render_chain(rc, &field_path, &field.chain, raw.clone()).await?;
        let parsed = parse_rendered(&field_path, &rendered)?;
        let new_value = DocValue::from_yaml(parsed)?;

        merge_rendered(
          &field_path,
          &mut self.resolved,
          &ukey.key,
          new_value,
          keep_old,
        )?;
      }

      handled.insert(ukey.key.clone());

      if let Some(slot) = self.resolved.get_mut(&ukey.key) {
        slot.resolve_at(rc, depth - 1, field_path, None).await?;
      }
    }

    // descend into resolved children
    let keys: Vec<String> = self
      .resolved
      .keys()
      .filter(|k| wanted(k))
      .cloned()
      .collect();
    for k in keys {
      let child_path = join_path(&path, &k);
      if let Some(slot) = self.resolved.get_mut(&k) {
        slot.resolve_at(rc, depth - 1, child_path, None).await?;
      }
    }

    Ok(())
  }
}

/// Run a renderer chain over one raw value, returning the final bytes.
async fn render_chain(
  rc: &dyn RenderingHandler,
  path: &str,
  chain: &[RendererStep],
  raw: Value,
) -> Result<Vec<u8>, FieldError> {
  let mut payload = RenderInput::Value(raw);

  for step in chain {
    // `!` reads the current payload as a patch spec: the spec's `value`
    // is what the renderer sees, merge and patches apply to its output
    let patch_spec = if step.patch {
      let spec = decode_patch_spec(rc, path, &payload).await?;
      payload = RenderInput::Value(spec.value.clone());
      Some(spec)
    } else {
      None
    };

    let rendered = rc
      .render_yaml(&step.name, &step.attributes, payload)
      .await
      .map_err(|source| FieldError::Renderer {
        renderer: step.name.clone(),
        path: path.to_owned(),
        source,
      })?;

    let next = match patch_spec {
      Some(spec) => {
        let parsed = parse_rendered(path, &rendered)?;
        let patched = spec.apply_to(path, parsed)?;
        to_yaml_bytes(&patched).map_err(|source| FieldError::RenderedParse {
          path: path.to_owned(),
          source,
        })?
      }
      None => rendered,
    };

    payload = RenderInput::Bytes(next);
  }

  match payload {
    RenderInput::Bytes(b) => Ok(b),
    // empty chain never happens for unresolved entries, but stay total
    RenderInput::Value(v) => to_yaml_bytes(&v).map_err(|source| FieldError::RenderedParse {
      path: path.to_owned(),
      source,
    }),
  }
}

/// Decode (and fully resolve) a patch spec from the current payload.
async fn decode_patch_spec(
  rc: &dyn RenderingHandler,
  path: &str,
  payload: &RenderInput,
) -> Result<PatchSpec, FieldError> {
  let value = match payload {
    RenderInput::Value(v) => v.clone(),
    RenderInput::Bytes(b) => parse_rendered(path, b)?,
  };

  // the patch spec itself may use rendering suffixes
  let mut doc = DocValue::from_yaml(value)?;
  doc.resolve(rc, -1).await?;

  doc.decode::<PatchSpec>().map_err(|e| FieldError::PatchSpec {
    path: path.to_owned(),
    message: e.to_string(),
  })
}

/// Merge one rendered value into its slot.
///
/// Scalars replace; mappings merge key-wise; sequences replace on the first
/// value of an entry and append for multi-valued entries.
fn merge_rendered(
  path: &str,
  resolved: &mut IndexMap<String, DocValue>,
  key: &str,
  new_value: DocValue,
  keep_old: bool,
) -> Result<(), FieldError> {
  let Some(existing) = resolved.get_mut(key) else {
    resolved.insert(key.to_owned(), new_value);
    return Ok(());
  };

  match (&mut *existing, new_value) {
    (DocValue::Node(a), DocValue::Node(b)) => a.merge_sibling_node(path, b),
    (DocValue::Seq(a), DocValue::Seq(b)) => {
      if keep_old {
        a.extend(b);
      } else {
        *a = b;
      }
      Ok(())
    }
    (DocValue::Plain(Value::Null), other) => {
      *existing = other;
      Ok(())
    }
    (_, other @ DocValue::Plain(_)) => {
      *existing = other;
      Ok(())
    }
    (current, other) => Err(FieldError::MergeTypeMismatch {
      path: path.to_owned(),
      original: current.shape_name(),
      additional: other.shape_name(),
    }),
  }
}

fn join_path(path: &str, key: &str) -> String {
  if path.is_empty() {
    key.to_owned()
  } else {
    format!("{path}.{key}")
  }
}

impl Serialize for DocValue {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let v = self.to_value().map_err(serde::ser::Error::custom)?;
    v.serialize(serializer)
  }
}

impl<'de> Deserialize<'de> for DocValue {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let v = Value::deserialize(deserializer)?;
    DocValue::from_yaml(v).map_err(serde::de::Error::custom)
  }
}
