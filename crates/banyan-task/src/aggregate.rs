//! Last-seen aggregation across matrix iterations.
//!
//! Some tasks accumulate fragments over every matrix entry and emit the
//! combined specs only once the whole matrix has reported (container
//! manifest pushes are the canonical case). Fragments are keyed by
//! `(exec_id, name)` so concurrent invocations of the same task never mix,
//! and drained in `(seq, sub_index)` order to restore user-declared
//! ordering regardless of completion order.
//!
//! With parallel matrix entries the highest `seq` may finish first, so
//! "last entry" is not a safe flush trigger. [`Aggregator::complete_entry`]
//! counts the entries that have reported instead and names exactly one
//! caller the flusher: the one that completes the set.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Item<T> {
  seq: usize,
  sub_index: usize,
  value: T,
}

#[derive(Debug)]
struct State<T> {
  items: HashMap<(u64, String), Item<T>>,
  /// Entry seqs that have reported, per invocation.
  seen: HashMap<u64, HashSet<usize>>,
}

/// A per-task accumulator guarded by its own mutex.
#[derive(Debug)]
pub struct Aggregator<T> {
  state: Mutex<State<T>>,
}

impl<T> Default for Aggregator<T> {
  fn default() -> Self {
    Self {
      state: Mutex::new(State {
        items: HashMap::new(),
        seen: HashMap::new(),
      }),
    }
  }
}

impl<T: Clone> Aggregator<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record one fragment; a later record under the same `(exec_id, name)`
  /// replaces the earlier one.
  pub fn record(&self, exec_id: u64, name: impl Into<String>, seq: usize, sub_index: usize, value: T) {
    self
      .state
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .items
      .insert(
        (exec_id, name.into()),
        Item {
          seq,
          sub_index,
          value,
        },
      );
  }

  /// Mark entry `seq` of `exec_id` as reported.
  ///
  /// Returns `true` for exactly one caller per invocation: the one whose
  /// mark completes the full set of `total` entries. That caller flushes.
  pub fn complete_entry(&self, exec_id: u64, seq: usize, total: usize) -> bool {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    let seen = state.seen.entry(exec_id).or_default();
    let newly = seen.insert(seq);
    newly && seen.len() == total
  }

  /// Remove and return this invocation's fragments, ordered by
  /// `(seq, sub_index)`.
  pub fn drain_ordered(&self, exec_id: u64) -> Vec<T> {
    let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
    state.seen.remove(&exec_id);

    let keys: Vec<(u64, String)> = state
      .items
      .keys()
      .filter(|(id, _)| *id == exec_id)
      .cloned()
      .collect();

    let mut drained: Vec<Item<T>> = keys
      .into_iter()
      .filter_map(|k| state.items.remove(&k))
      .collect();
    drained.sort_by_key(|item| (item.seq, item.sub_index));

    drained.into_iter().map(|item| item.value).collect()
  }
}
