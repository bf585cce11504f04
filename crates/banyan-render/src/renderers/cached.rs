//! Shared plumbing for renderers that fetch remote content through the
//! two-tier cache.

use std::path::Path;

use banyan_cache::{DynError, TwoTierCache};
use serde::Deserialize;

use crate::attributes::CacheAttributes;
use crate::context::unix_now;
use crate::error::RenderError;

fn unlimited() -> i64 {
  -1
}

/// Cache section of a remote-fetching renderer's spec.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default)]
  pub enabled: bool,

  /// Max size of a single item admitted to the memory tier.
  #[serde(default = "unlimited")]
  pub item_size_limit: i64,

  /// Total memory tier budget in bytes.
  #[serde(default = "unlimited")]
  pub size_limit: i64,

  /// Max age in seconds for both tiers; non-positive disables expiry.
  #[serde(default = "unlimited")]
  pub max_age: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      item_size_limit: -1,
      size_limit: -1,
      max_age: -1,
    }
  }
}

impl CacheConfig {
  /// Build the cache under `<cache_root>/<renderer-name>` when enabled.
  pub fn build(&self, cache_root: &Path, renderer_name: &str) -> Option<TwoTierCache> {
    if !self.enabled {
      return None;
    }
    Some(TwoTierCache::new(
      cache_root.join(renderer_name),
      self.item_size_limit,
      self.size_limit,
      self.max_age,
    ))
  }
}

/// Fetch `key` through the cache (when present), honoring step attributes.
///
/// `cache_max_age=<secs>` re-judges file expiry with the given age; the
/// memory tier is bypassed for such calls so the override cannot poison it.
pub(crate) async fn fetch_through_cache<F, Fut>(
  renderer: &str,
  cache: Option<&TwoTierCache>,
  key: &str,
  attrs: &CacheAttributes,
  fetch: F,
) -> Result<Vec<u8>, RenderError>
where
  F: FnOnce() -> Fut,
  Fut: std::future::Future<Output = Result<Vec<u8>, RenderError>>,
{
  let Some(cache) = cache else {
    return fetch().await;
  };

  let refresh = || async {
    fetch()
      .await
      .map_err(|e| -> DynError { Box::new(e) })
  };

  let result = match attrs.max_age_override {
    None => {
      cache
        .get(key, "", unix_now(), attrs.allow_expired, refresh)
        .await
    }
    Some(max_age) => {
      let transient = TwoTierCache::new(cache.dir(), 0, 0, max_age);
      transient
        .get(key, "", unix_now(), attrs.allow_expired, refresh)
        .await
    }
  };

  result
    .map(|hit| hit.content)
    .map_err(|source| RenderError::Cache {
      renderer: renderer.to_owned(),
      source,
    })
}
