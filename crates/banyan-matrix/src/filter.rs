//! Invocation-level matrix filtering (`k=v` keeps, `k!=v` drops).

use indexmap::IndexMap;

use crate::entry::MatrixEntry;

/// Predicates parsed from trailing command-line arguments.
///
/// An entry is kept iff, for every dimension with `=` predicates, its value
/// is one of them, and no `!=` predicate matches.
#[derive(Debug, Clone, Default)]
pub struct MatrixFilter {
  keep: IndexMap<String, Vec<String>>,
  drop: Vec<(String, String)>,
}

impl MatrixFilter {
  /// Parse `k=v` / `k!=v` arguments; malformed ones are ignored.
  pub fn parse<S: AsRef<str>>(args: &[S]) -> Self {
    let mut filter = MatrixFilter::default();

    for arg in args {
      let arg = arg.as_ref();
      if let Some(idx) = arg.find("!=") {
        if idx > 0 {
          filter.add_drop(&arg[..idx], &arg[idx + 2..]);
          continue;
        }
      }
      if let Some(idx) = arg.find('=') {
        if idx > 0 {
          filter.add_keep(&arg[..idx], &arg[idx + 1..]);
        }
      }
    }

    filter
  }

  pub fn add_keep(&mut self, name: &str, value: &str) {
    self
      .keep
      .entry(name.to_owned())
      .or_default()
      .push(value.to_owned());
  }

  pub fn add_drop(&mut self, name: &str, value: &str) {
    self.drop.push((name.to_owned(), value.to_owned()));
  }

  pub fn is_empty(&self) -> bool {
    self.keep.is_empty() && self.drop.is_empty()
  }

  pub fn matches(&self, entry: &MatrixEntry) -> bool {
    for (name, value) in &self.drop {
      if entry.get(name) == Some(value.as_str()) {
        return false;
      }
    }

    for (name, values) in &self.keep {
      match entry.get(name) {
        Some(v) if values.iter().any(|candidate| candidate == v) => {}
        _ => return false,
      }
    }

    true
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(kernel: &str, arch: &str) -> MatrixEntry {
    MatrixEntry::from_pairs([("kernel", kernel), ("arch", arch)])
  }

  #[test]
  fn parses_keep_and_drop() {
    let filter = MatrixFilter::parse(&["kernel=linux", "arch!=arm64"]);
    assert!(filter.matches(&entry("linux", "amd64")));
    assert!(!filter.matches(&entry("linux", "arm64")));
    assert!(!filter.matches(&entry("darwin", "amd64")));
  }

  #[test]
  fn repeated_keep_values_are_alternatives() {
    let filter = MatrixFilter::parse(&["arch=amd64", "arch=arm64"]);
    assert!(filter.matches(&entry("linux", "amd64")));
    assert!(filter.matches(&entry("linux", "arm64")));
    assert!(!filter.matches(&entry("linux", "mips64le")));
  }

  #[test]
  fn empty_filter_keeps_everything() {
    let filter = MatrixFilter::parse::<&str>(&[]);
    assert!(filter.is_empty());
    assert!(filter.matches(&entry("any", "thing")));
  }

  #[test]
  fn malformed_arguments_are_ignored() {
    let filter = MatrixFilter::parse(&["=x", "!=y", "novalue"]);
    assert!(filter.is_empty());
  }

  #[test]
  fn keep_on_absent_dimension_drops_entry() {
    let filter = MatrixFilter::parse(&["variant=debug"]);
    assert!(!filter.matches(&entry("linux", "amd64")));
  }
}
