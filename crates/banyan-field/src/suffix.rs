//! Rendering-suffix parsing.
//!
//! A mapping key may carry a rendering suffix: `key@r1|r2|...|rN[!]`. The
//! chain is applied left to right. Each step may carry attribute tokens
//! (`name#attr1,attr2`) and a trailing `!` marking a patch pass. Renderer
//! names may be qualified (`shell:zsh`).

use std::sync::OnceLock;

use regex::Regex;

use crate::error::FieldError;

fn renderer_name_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?::[A-Za-z0-9_.-]+)?$").unwrap()
  })
}

/// One step of a renderer chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RendererStep {
  /// Registry lookup name, attribute tokens excluded.
  pub name: String,
  /// Attribute tokens attached with `#`, e.g. `allow_expired`,
  /// `cache_max_age=300`.
  pub attributes: Vec<String>,
  /// Whether this step runs a patch pass.
  pub patch: bool,
}

/// A mapping key split into its bare key and renderer chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
  pub key: String,
  /// The suffix text after `@`, empty for bare keys. Kept verbatim so that
  /// entries from sibling documents with the same `(key, suffix)` pair can
  /// be accumulated.
  pub suffix: String,
  pub chain: Vec<RendererStep>,
}

impl ParsedKey {
  pub fn is_bare(&self) -> bool {
    self.chain.is_empty()
  }
}

/// Parse a document key, splitting off the rendering suffix if present.
pub fn parse_key(raw: &str) -> Result<ParsedKey, FieldError> {
  let Some(at) = raw.find('@') else {
    return Ok(ParsedKey {
      key: raw.to_owned(),
      suffix: String::new(),
      chain: Vec::new(),
    });
  };

  let (key, suffix) = (&raw[..at], &raw[at + 1..]);
  if key.is_empty() {
    return Err(FieldError::InvalidSuffix {
      key: raw.to_owned(),
      message: "empty key before '@'".to_owned(),
    });
  }
  if suffix.is_empty() {
    return Err(FieldError::InvalidSuffix {
      key: raw.to_owned(),
      message: "empty renderer chain after '@'".to_owned(),
    });
  }

  let mut chain = Vec::new();
  for part in suffix.split('|') {
    chain.push(parse_step(raw, part)?);
  }

  Ok(ParsedKey {
    key: key.to_owned(),
    suffix: suffix.to_owned(),
    chain,
  })
}

fn parse_step(raw_key: &str, part: &str) -> Result<RendererStep, FieldError> {
  let (part, patch) = match part.strip_suffix('!') {
    Some(stripped) => (stripped, true),
    None => (part, false),
  };

  let (name, attributes) = match part.split_once('#') {
    Some((name, attrs)) => {
      let attributes: Vec<String> = attrs
        .split(',')
        .filter(|a| !a.is_empty())
        .map(str::to_owned)
        .collect();
      if attributes.is_empty() {
        return Err(FieldError::InvalidSuffix {
          key: raw_key.to_owned(),
          message: format!("empty attribute list on renderer '{name}'"),
        });
      }
      (name, attributes)
    }
    None => (part, Vec::new()),
  };

  if !renderer_name_re().is_match(name) {
    return Err(FieldError::InvalidSuffix {
      key: raw_key.to_owned(),
      message: format!("invalid renderer name '{name}'"),
    });
  }

  Ok(RendererStep {
    name: name.to_owned(),
    attributes,
    patch,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bare_key_has_no_chain() {
    let parsed = parse_key("foo").unwrap();
    assert_eq!(parsed.key, "foo");
    assert!(parsed.is_bare());
  }

  #[test]
  fn single_renderer() {
    let parsed = parse_key("foo@env").unwrap();
    assert_eq!(parsed.key, "foo");
    assert_eq!(parsed.suffix, "env");
    assert_eq!(parsed.chain.len(), 1);
    assert_eq!(parsed.chain[0].name, "env");
    assert!(!parsed.chain[0].patch);
  }

  #[test]
  fn chain_with_terminal_patch() {
    let parsed = parse_key("foo@shell|template!").unwrap();
    let names: Vec<_> = parsed.chain.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["shell", "template"]);
    assert!(!parsed.chain[0].patch);
    assert!(parsed.chain[1].patch);
  }

  #[test]
  fn mid_chain_patch() {
    let parsed = parse_key("foo@http!|template").unwrap();
    assert!(parsed.chain[0].patch);
    assert!(!parsed.chain[1].patch);
  }

  #[test]
  fn attributes_are_split_from_name() {
    let parsed = parse_key("foo@http#allow_expired,cache_max_age=300").unwrap();
    assert_eq!(parsed.chain[0].name, "http");
    assert_eq!(
      parsed.chain[0].attributes,
      ["allow_expired", "cache_max_age=300"]
    );
  }

  #[test]
  fn qualified_shell_renderer() {
    let parsed = parse_key("script@shell:zsh").unwrap();
    assert_eq!(parsed.chain[0].name, "shell:zsh");
  }

  #[test]
  fn rejects_bad_names() {
    assert!(parse_key("foo@1bad").is_err());
    assert!(parse_key("foo@").is_err());
    assert!(parse_key("@env").is_err());
    assert!(parse_key("foo@a|").is_err());
  }

  #[test]
  fn key_may_contain_colons() {
    let parsed = parse_key("shell:zsh").unwrap();
    assert!(parsed.is_bare());
    assert_eq!(parsed.key, "shell:zsh");

    let parsed = parse_key("container:web:push@template").unwrap();
    assert_eq!(parsed.key, "container:web:push");
    assert_eq!(parsed.chain[0].name, "template");
  }
}
