//! Helpers over raw YAML values.

use serde_yaml::Value;

use crate::error::FieldError;

/// Serialize a YAML value to its byte representation.
///
/// String scalars pass through verbatim: renderer pipelines hand text from
/// step to step and YAML-encoding it would introduce quoting and trailing
/// newlines the next step never asked for.
pub fn to_yaml_bytes(v: &Value) -> Result<Vec<u8>, serde_yaml::Error> {
  match v {
    Value::String(s) => Ok(s.clone().into_bytes()),
    other => serde_yaml::to_string(other).map(String::into_bytes),
  }
}

/// Parse rendered bytes back into a YAML value.
///
/// YAML parsing is lossy for scalar text (`on` becomes a bool, `0755` a
/// number, trailing whitespace disappears). When the parsed result is a
/// string the original bytes are kept verbatim so renderer output keeps its
/// formatting.
pub fn parse_rendered(path: &str, bytes: &[u8]) -> Result<Value, FieldError> {
  if bytes.is_empty() {
    return Ok(Value::Null);
  }

  let parsed: Value =
    serde_yaml::from_slice(bytes).map_err(|source| FieldError::RenderedParse {
      path: path.to_owned(),
      source,
    })?;

  match parsed {
    Value::String(_) => Ok(Value::String(
      String::from_utf8_lossy(bytes).into_owned(),
    )),
    other => Ok(other),
  }
}

/// Project a YAML value onto JSON for RFC 6902 patch application.
///
/// Mapping keys must be strings; tags are dropped in the projection.
pub fn yaml_to_json(path: &str, v: &Value) -> Result<serde_json::Value, FieldError> {
  use serde_json::Value as Json;

  Ok(match v {
    Value::Null => Json::Null,
    Value::Bool(b) => Json::Bool(*b),
    Value::Number(n) => {
      let text = n.to_string();
      text
        .parse::<serde_json::Number>()
        .map(Json::Number)
        .map_err(|_| FieldError::JsonProjection {
          path: path.to_owned(),
          message: format!("non-finite number {text}"),
        })?
    }
    Value::String(s) => Json::String(s.clone()),
    Value::Sequence(seq) => Json::Array(
      seq
        .iter()
        .map(|item| yaml_to_json(path, item))
        .collect::<Result<_, _>>()?,
    ),
    Value::Mapping(map) => {
      let mut out = serde_json::Map::with_capacity(map.len());
      for (k, item) in map {
        let Value::String(key) = k else {
          return Err(FieldError::JsonProjection {
            path: path.to_owned(),
            message: "mapping key is not a string".to_owned(),
          });
        };
        out.insert(key.clone(), yaml_to_json(path, item)?);
      }
      Json::Object(out)
    }
    Value::Tagged(tagged) => yaml_to_json(path, &tagged.value)?,
  })
}

/// Lift a JSON value back into YAML.
pub fn json_to_yaml(v: &serde_json::Value) -> Value {
  use serde_json::Value as Json;

  match v {
    Json::Null => Value::Null,
    Json::Bool(b) => Value::Bool(*b),
    Json::Number(n) => {
      if let Some(i) = n.as_i64() {
        Value::Number(i.into())
      } else if let Some(u) = n.as_u64() {
        Value::Number(u.into())
      } else {
        Value::Number(serde_yaml::Number::from(n.as_f64().unwrap_or(0.0)))
      }
    }
    Json::String(s) => Value::String(s.clone()),
    Json::Array(items) => Value::Sequence(items.iter().map(json_to_yaml).collect()),
    Json::Object(map) => {
      let mut out = serde_yaml::Mapping::with_capacity(map.len());
      for (k, item) in map {
        out.insert(Value::String(k.clone()), json_to_yaml(item));
      }
      Value::Mapping(out)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_rendered_keeps_string_bytes() {
    let v = parse_rendered("t", b"hello world\n").unwrap();
    assert_eq!(v, Value::String("hello world\n".to_owned()));
  }

  #[test]
  fn parse_rendered_decodes_structures() {
    let v = parse_rendered("t", b"a: 1\nb: [x, y]\n").unwrap();
    assert!(v.is_mapping());
  }

  #[test]
  fn parse_rendered_empty_is_null() {
    assert_eq!(parse_rendered("t", b"").unwrap(), Value::Null);
  }

  #[test]
  fn json_round_trip() {
    let v: Value = serde_yaml::from_str("a: [1, two, {c: true}]\n").unwrap();
    let json = yaml_to_json("t", &v).unwrap();
    assert_eq!(json_to_yaml(&json), v);
  }

  #[test]
  fn non_string_keys_do_not_project() {
    let v: Value = serde_yaml::from_str("1: x\n").unwrap();
    assert!(yaml_to_json("t", &v).is_err());
  }
}
