//! The two-tier cache proper.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::memory::MemoryTier;
use crate::{fingerprint, CacheError, DynError};

/// A successful content lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
  pub content: Vec<u8>,
  /// The content came from an expired entry because refresh failed.
  pub expired: bool,
}

/// A successful path lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePath {
  pub path: PathBuf,
  pub expired: bool,
}

/// Fingerprint-keyed cache with a memory LRU in front of timestamped files.
///
/// Limits follow one rule each: `< 0` unlimited, `== 0` disables the memory
/// tier, `> 0` caps. `max_age_seconds` additionally bounds the file tier:
/// non-positive values mean files never expire on disk.
///
/// A single instance may be used concurrently. There is no single-flight
/// coalescing: two concurrent misses for one key may both invoke `refresh`
/// and both write; each writes a fresh timestamped file, the newer wins on
/// subsequent reads.
pub struct TwoTierCache {
  dir: PathBuf,
  item_max_bytes: i64,
  max_age_seconds: i64,
  memory: Mutex<MemoryTier>,
}

struct Scan {
  active: Vec<String>,
  expired: Vec<String>,
}

impl TwoTierCache {
  pub fn new(dir: impl Into<PathBuf>, item_max_bytes: i64, max_bytes: i64, max_age_seconds: i64) -> Self {
    let memory_bytes = if max_age_seconds == 0 { 0 } else { max_bytes };
    Self {
      dir: dir.into(),
      item_max_bytes,
      max_age_seconds,
      memory: Mutex::new(MemoryTier::new(memory_bytes, max_age_seconds)),
    }
  }

  /// Fetch content for `key`, refreshing through `refresh` on miss.
  ///
  /// `now` is the unix timestamp of the time being. When `refresh` fails and
  /// `allow_expired` is set, the newest expired file is served instead with
  /// `expired = true`.
  pub async fn get<F, Fut>(
    &self,
    key: &str,
    ext: &str,
    now: u64,
    allow_expired: bool,
    refresh: F,
  ) -> Result<CacheHit, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<u8>, DynError>>,
  {
    if let Some(content) = self.memory.lock().unwrap_or_else(|e| e.into_inner()).get(key, now) {
      return Ok(CacheHit {
        content,
        expired: false,
      });
    }

    let prefix = fingerprint(key);
    let scan = self.scan_dir(&prefix, ext, now).await?;

    if let Some(name) = scan.active.last() {
      let path = self.dir.join(name);
      let content = tokio::fs::read(&path).await.map_err(|source| CacheError::Io {
        path: path.display().to_string(),
        source,
      })?;
      return Ok(CacheHit {
        content,
        expired: false,
      });
    }

    match refresh().await {
      Ok(content) => {
        self.store(&prefix, ext, now, &content).await?;

        let len = content.len() as i64;
        if self.item_max_bytes != 0 && (self.item_max_bytes < 0 || len <= self.item_max_bytes) {
          self
            .memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_owned(), content.clone(), now);
        }

        Ok(CacheHit {
          content,
          expired: false,
        })
      }
      Err(refresh_err) => self.serve_expired(&scan, allow_expired, refresh_err).await,
    }
  }

  /// Like [`TwoTierCache::get`], but returns the path of the cached file.
  pub async fn get_path<F, Fut>(
    &self,
    key: &str,
    ext: &str,
    now: u64,
    allow_expired: bool,
    refresh: F,
  ) -> Result<CachePath, CacheError>
  where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<u8>, DynError>>,
  {
    let prefix = fingerprint(key);
    let scan = self.scan_dir(&prefix, ext, now).await?;

    if let Some(name) = scan.active.last() {
      return Ok(CachePath {
        path: self.dir.join(name),
        expired: false,
      });
    }

    match refresh().await {
      Ok(content) => {
        let path = self.store(&prefix, ext, now, &content).await?;
        Ok(CachePath {
          path,
          expired: false,
        })
      }
      Err(refresh_err) => {
        if allow_expired {
          if let Some(name) = scan.expired.last() {
            return Ok(CachePath {
              path: self.dir.join(name),
              expired: true,
            });
          }
        }
        Err(CacheError::Refresh {
          source: refresh_err,
        })
      }
    }
  }

  async fn serve_expired(
    &self,
    scan: &Scan,
    allow_expired: bool,
    refresh_err: DynError,
  ) -> Result<CacheHit, CacheError> {
    if allow_expired {
      if let Some(name) = scan.expired.last() {
        let path = self.dir.join(name);
        return match tokio::fs::read(&path).await {
          Ok(content) => Ok(CacheHit {
            content,
            expired: true,
          }),
          Err(read) => Err(CacheError::RefreshAndFallback {
            refresh: refresh_err,
            read,
          }),
        };
      }
    }

    Err(CacheError::Refresh {
      source: refresh_err,
    })
  }

  /// List cache files for `prefix`, splitting them into active and expired.
  ///
  /// All but the newest expired entry are deleted, best effort.
  async fn scan_dir(&self, prefix: &str, ext: &str, now: u64) -> Result<Scan, CacheError> {
    let mut names = Vec::new();

    let mut dir = match tokio::fs::read_dir(&self.dir).await {
      Ok(dir) => dir,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(Scan {
          active: Vec::new(),
          expired: Vec::new(),
        })
      }
      Err(source) => {
        return Err(CacheError::Io {
          path: self.dir.display().to_string(),
          source,
        })
      }
    };

    loop {
      match dir.next_entry().await {
        Ok(Some(entry)) => {
          let name = entry.file_name().to_string_lossy().into_owned();
          if name.starts_with(prefix) {
            names.push(name);
          }
        }
        Ok(None) => break,
        Err(source) => {
          return Err(CacheError::Io {
            path: self.dir.display().to_string(),
            source,
          })
        }
      }
    }

    // lexicographic order is timestamp order thanks to the zero padding
    names.sort_unstable();

    let not_before = if self.max_age_seconds > 0 {
      now.saturating_sub(self.max_age_seconds as u64)
    } else {
      0
    };

    let mut active = Vec::new();
    let mut expired = Vec::new();
    for name in names {
      let Some(ts) = parse_timestamp(&name, prefix, ext) else {
        // invalid cache file, leave it alone
        continue;
      };
      if ts < not_before {
        expired.push(name);
      } else {
        active.push(name);
      }
    }

    if expired.len() > 1 {
      for name in expired.drain(..expired.len() - 1) {
        let path = self.dir.join(&name);
        #[cfg(unix)]
        {
          use std::os::unix::fs::PermissionsExt;
          let _ = tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).await;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
          warn!(file = %path.display(), error = %e, "failed to remove expired cache");
        }
      }
    }

    Ok(Scan { active, expired })
  }

  /// Write content to a fresh timestamped 0400 file, creating the directory
  /// on first use.
  async fn store(&self, prefix: &str, ext: &str, now: u64, content: &[u8]) -> Result<PathBuf, CacheError> {
    tokio::fs::create_dir_all(&self.dir)
      .await
      .map_err(|source| CacheError::Io {
        path: self.dir.display().to_string(),
        source,
      })?;

    let path = self.dir.join(cache_filename(prefix, ext, now));
    tokio::fs::write(&path, content)
      .await
      .map_err(|source| CacheError::Io {
        path: path.display().to_string(),
        source,
      })?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o400))
        .await
        .map_err(|source| CacheError::Io {
          path: path.display().to_string(),
          source,
        })?;
    }

    Ok(path)
  }

  /// The directory backing this cache.
  pub fn dir(&self) -> &Path {
    &self.dir
  }
}

/// `<fingerprint>-<20-digit-zero-padded-unix-seconds><ext>`
fn cache_filename(prefix: &str, ext: &str, now: u64) -> String {
  format!("{prefix}-{now:020}{ext}")
}

fn parse_timestamp(name: &str, prefix: &str, ext: &str) -> Option<u64> {
  let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
  let rest = if ext.is_empty() {
    rest
  } else {
    rest.strip_suffix(ext)?
  };
  if rest.len() != 20 {
    return None;
  }
  rest.parse::<u64>().ok()
}
