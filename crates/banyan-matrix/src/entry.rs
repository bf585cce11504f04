//! A single execution variant.

use std::fmt;

use indexmap::IndexMap;

/// One point of the expanded matrix: ordered `(dimension, value)` pairs.
///
/// Pairs keep dimension declaration order; the canonical display form is
/// sorted by name so an entry prints the same regardless of where it came
/// from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixEntry {
  values: IndexMap<String, String>,
}

impl MatrixEntry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self {
      values: pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    }
  }

  pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
    self.values.insert(name.into(), value.into());
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.values.get(name).map(String::as_str)
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  /// Conventional `kernel` dimension (target OS).
  pub fn kernel(&self) -> Option<&str> {
    self.get("kernel")
  }

  /// Conventional `arch` dimension.
  pub fn arch(&self) -> Option<&str> {
    self.get("arch")
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Environment variables exported to renderers and subprocesses:
  /// `MATRIX_<NAME>` with the dimension name uppercased.
  pub fn env_vars(&self) -> Vec<(String, String)> {
    self
      .values
      .iter()
      .map(|(k, v)| (format!("MATRIX_{}", k.to_uppercase()), v.clone()))
      .collect()
  }

  /// Whether every pair of `partial` is present with an equal value.
  pub fn contains_all(&self, partial: &MatrixEntry) -> bool {
    partial
      .values
      .iter()
      .all(|(k, v)| self.values.get(k) == Some(v))
  }
}

impl fmt::Display for MatrixEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.values.is_empty() {
      return write!(f, "<none>");
    }

    let mut pairs: Vec<(&String, &String)> = self.values.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    for (i, (k, v)) in pairs.into_iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{k}={v}")?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_is_sorted_by_name() {
    let entry = MatrixEntry::from_pairs([("kernel", "linux"), ("arch", "amd64")]);
    assert_eq!(entry.to_string(), "arch=amd64, kernel=linux");
  }

  #[test]
  fn empty_entry_displays_placeholder() {
    assert_eq!(MatrixEntry::new().to_string(), "<none>");
  }

  #[test]
  fn env_vars_are_uppercased() {
    let entry = MatrixEntry::from_pairs([("arch", "arm64")]);
    assert_eq!(
      entry.env_vars(),
      vec![("MATRIX_ARCH".to_owned(), "arm64".to_owned())]
    );
  }

  #[test]
  fn partial_containment() {
    let entry = MatrixEntry::from_pairs([("kernel", "linux"), ("arch", "amd64")]);
    assert!(entry.contains_all(&MatrixEntry::from_pairs([("arch", "amd64")])));
    assert!(!entry.contains_all(&MatrixEntry::from_pairs([("arch", "arm64")])));
    assert!(entry.contains_all(&MatrixEntry::new()));
  }
}
