//! Attribute tokens recognised by caching renderers.

use crate::error::RenderError;

/// Cache policy derived from a chain step's attribute tokens.
///
/// Recognised tokens: `allow_expired` and `cache_max_age=<seconds>`. They
/// modify caching behavior, never output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheAttributes {
  pub allow_expired: bool,
  pub max_age_override: Option<i64>,
}

impl CacheAttributes {
  pub fn parse(renderer: &str, attributes: &[String]) -> Result<Self, RenderError> {
    let mut out = CacheAttributes::default();

    for attr in attributes {
      if attr == "allow_expired" {
        out.allow_expired = true;
        continue;
      }

      if let Some(value) = attr.strip_prefix("cache_max_age=") {
        match value.parse::<i64>() {
          Ok(secs) => {
            out.max_age_override = Some(secs);
            continue;
          }
          Err(_) => {
            return Err(RenderError::UnknownAttribute {
              renderer: renderer.to_owned(),
              attribute: attr.clone(),
            })
          }
        }
      }

      return Err(RenderError::UnknownAttribute {
        renderer: renderer.to_owned(),
        attribute: attr.clone(),
      });
    }

    Ok(out)
  }
}
