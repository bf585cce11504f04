//! HTTP fetch renderer.

use async_trait::async_trait;
use banyan_field::{DocValue, RenderInput};
use reqwest::Method;
use serde::Deserialize;

use crate::attributes::CacheAttributes;
use crate::renderers::cached::{fetch_through_cache, CacheConfig};
use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "http";

/// A request header; repeated names accumulate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Header {
  pub name: String,
  pub value: String,
}

/// Request configuration, usable both as the driver default and inline in a
/// structured input spec.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
  #[serde(default)]
  pub method: Option<String>,
  #[serde(default)]
  pub headers: Vec<Header>,
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default)]
  pub base_url: Option<String>,
  #[serde(default)]
  pub user: Option<String>,
  #[serde(default)]
  pub password: Option<String>,
}

/// Driver spec: default request config plus the cache section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpSpec {
  #[serde(flatten)]
  pub config: HttpConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

/// Structured input form: a URL plus optional per-request config.
#[derive(Debug, Clone, Deserialize)]
struct InputSpec {
  url: String,
  #[serde(flatten)]
  config: HttpConfig,
}

/// Fetches a URL (GET by default) and renders the response body; responses
/// go through the two-tier cache keyed by URL.
pub struct Http {
  name: String,
  spec: HttpSpec,
  cache: Option<banyan_cache::TwoTierCache>,
  client: reqwest::Client,
}

impl Http {
  pub fn new(name: impl Into<String>, spec: HttpSpec, cache_root: &std::path::Path) -> Self {
    let name = name.into();
    let cache = spec.cache.build(cache_root, &name);
    Self {
      name,
      spec,
      cache,
      client: reqwest::Client::new(),
    }
  }

  async fn fetch(&self, url: &str, config: &HttpConfig) -> Result<Vec<u8>, RenderError> {
    let method = match config.method.as_deref() {
      None | Some("") => Method::GET,
      Some(m) => Method::from_bytes(m.to_uppercase().as_bytes()).map_err(|_| {
        RenderError::Input {
          renderer: self.name.clone(),
          message: format!("unsupported http method '{m}'"),
        }
      })?,
    };

    let target = match config.base_url.as_deref() {
      Some(base) if !base.is_empty() => {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
      }
      _ => url.to_owned(),
    };

    let mut request = self.client.request(method, &target);

    if let Some(user) = &config.user {
      request = request.basic_auth(user, config.password.as_deref());
    }

    // repeated header names accumulate
    for h in &config.headers {
      request = request.header(&h.name, &h.value);
    }

    if let Some(body) = &config.body {
      request = request.body(body.clone());
    }

    let response = request.send().await.map_err(|source| RenderError::Http {
      renderer: self.name.clone(),
      source,
    })?;

    let response = response
      .error_for_status()
      .map_err(|source| RenderError::Http {
        renderer: self.name.clone(),
        source,
      })?;

    let bytes = response.bytes().await.map_err(|source| RenderError::Http {
      renderer: self.name.clone(),
      source,
    })?;

    Ok(bytes.to_vec())
  }
}

#[async_trait]
impl Renderer for Http {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let attrs = CacheAttributes::parse(&self.name, attributes)?;

    let (url, config) = match input {
      RenderInput::Bytes(b) => {
        let url = String::from_utf8(b).map_err(|_| RenderError::Input {
          renderer: self.name.clone(),
          message: "url is not utf-8".to_owned(),
        })?;
        (url.trim().to_owned(), self.spec.config.clone())
      }
      RenderInput::Value(serde_yaml::Value::String(url)) => {
        (url.trim().to_owned(), self.spec.config.clone())
      }
      RenderInput::Value(raw) => {
        // structured input spec; it may use rendering suffixes itself
        let mut doc = DocValue::from_yaml(raw).map_err(|source| RenderError::InputSpec {
          renderer: self.name.clone(),
          source,
        })?;
        doc
          .resolve(ctx, -1)
          .await
          .map_err(|source| RenderError::InputSpec {
            renderer: self.name.clone(),
            source,
          })?;
        let spec: InputSpec = doc.decode().map_err(|source| RenderError::InputSpec {
          renderer: self.name.clone(),
          source,
        })?;
        (spec.url, spec.config)
      }
    };

    fetch_through_cache(&self.name, self.cache.as_ref(), &url, &attrs, || {
      self.fetch(&url, &config)
    })
    .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn input_spec_decodes_with_inline_config() {
    let spec: InputSpec = serde_yaml::from_str(
      "url: https://example.com/x.yaml\nmethod: post\nheaders:\n- name: accept\n  value: text/yaml\n",
    )
    .unwrap();
    assert_eq!(spec.url, "https://example.com/x.yaml");
    assert_eq!(spec.config.method.as_deref(), Some("post"));
    assert_eq!(spec.config.headers.len(), 1);
  }

  #[test]
  fn driver_spec_defaults_to_no_cache() {
    let spec: HttpSpec = serde_yaml::from_str("{}").unwrap();
    assert!(!spec.cache.enabled);
  }
}
