//! Byte-bounded in-memory LRU tier.

use hashlink::LruCache;

struct Entry {
  content: Vec<u8>,
  stored_at: u64,
}

/// LRU cache over content bytes with a total-size cap and optional max age.
///
/// `max_bytes == 0` disables the tier entirely; `max_bytes < 0` means no
/// size cap. `max_age_seconds <= 0` means entries never expire in memory.
pub struct MemoryTier {
  entries: LruCache<String, Entry>,
  total_bytes: u64,
  max_bytes: i64,
  max_age_seconds: i64,
}

impl MemoryTier {
  pub fn new(max_bytes: i64, max_age_seconds: i64) -> Self {
    Self {
      entries: LruCache::new_unbounded(),
      total_bytes: 0,
      max_bytes,
      max_age_seconds,
    }
  }

  pub fn enabled(&self) -> bool {
    self.max_bytes != 0
  }

  /// Look up content, refreshing its LRU position.
  pub fn get(&mut self, key: &str, now: u64) -> Option<Vec<u8>> {
    if !self.enabled() {
      return None;
    }

    let expired = match self.entries.get(key) {
      Some(entry) => {
        if self.max_age_seconds > 0
          && entry.stored_at + self.max_age_seconds as u64 <= now
        {
          true
        } else {
          return Some(entry.content.clone());
        }
      }
      None => return None,
    };

    if expired {
      if let Some(entry) = self.entries.remove(key) {
        self.total_bytes -= entry.content.len() as u64;
      }
    }
    None
  }

  /// Insert content, evicting least-recently-used entries over the cap.
  pub fn insert(&mut self, key: String, content: Vec<u8>, now: u64) {
    if !self.enabled() {
      return;
    }

    if self.max_bytes > 0 && content.len() as u64 > self.max_bytes as u64 {
      return;
    }

    if let Some(old) = self.entries.remove(&key) {
      self.total_bytes -= old.content.len() as u64;
    }

    self.total_bytes += content.len() as u64;
    self.entries.insert(
      key,
      Entry {
        content,
        stored_at: now,
      },
    );

    if self.max_bytes > 0 {
      while self.total_bytes > self.max_bytes as u64 {
        match self.entries.remove_lru() {
          Some((_, evicted)) => self.total_bytes -= evicted.content.len() as u64,
          None => break,
        }
      }
    }
  }
}
