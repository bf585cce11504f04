//! Two-tier content cache for remote-fetching renderers.
//!
//! Content is addressed by an opaque key, fingerprinted as `hex(md5(key))`.
//! The memory tier is a byte-bounded LRU; the filesystem tier stores each
//! fetch in a fresh `<fingerprint>-<20-digit-unix-seconds><ext>` file, so
//! concurrent writers never tear each other's files; the newest timestamp
//! wins on the next read.

mod memory;
mod two_tier;

pub use memory::MemoryTier;
pub use two_tier::{CacheHit, CachePath, TwoTierCache};

/// Boxed error produced by refresh functions.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by cache lookups.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  #[error("cache io error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// Refresh failed and no expired entry was available to fall back on.
  #[error("cache refresh failed: {source}")]
  Refresh {
    #[source]
    source: DynError,
  },

  /// Refresh failed and reading the expired fallback failed too.
  #[error("cache refresh failed ({refresh}); reading expired fallback also failed: {read}")]
  RefreshAndFallback {
    refresh: DynError,
    #[source]
    read: std::io::Error,
  },
}

/// Hex MD5 fingerprint of a cache key.
pub fn fingerprint(key: &str) -> String {
  use md5::{Digest, Md5};

  let digest = Md5::digest(key.as_bytes());
  let mut out = String::with_capacity(digest.len() * 2);
  for byte in digest {
    use std::fmt::Write;
    let _ = write!(out, "{byte:02x}");
  }
  out
}
