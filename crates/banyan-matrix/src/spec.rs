//! The declared matrix and its expansion.

use indexmap::IndexMap;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::Deserialize;

use crate::entry::MatrixEntry;
use crate::filter::MatrixFilter;

/// Candidate values of one dimension; a bare scalar reads as a single value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Values(pub Vec<String>);

impl<'de> Deserialize<'de> for Values {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct ValuesVisitor;

    impl<'de> Visitor<'de> for ValuesVisitor {
      type Value = Values;

      fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a scalar or a list of scalars")
      }

      fn visit_str<E: de::Error>(self, v: &str) -> Result<Values, E> {
        Ok(Values(vec![v.to_owned()]))
      }

      fn visit_bool<E: de::Error>(self, v: bool) -> Result<Values, E> {
        Ok(Values(vec![v.to_string()]))
      }

      fn visit_i64<E: de::Error>(self, v: i64) -> Result<Values, E> {
        Ok(Values(vec![v.to_string()]))
      }

      fn visit_u64<E: de::Error>(self, v: u64) -> Result<Values, E> {
        Ok(Values(vec![v.to_string()]))
      }

      fn visit_f64<E: de::Error>(self, v: f64) -> Result<Values, E> {
        Ok(Values(vec![v.to_string()]))
      }

      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Values, A::Error> {
        let mut out = Vec::new();
        while let Some(item) = seq.next_element::<Values>()? {
          out.extend(item.0);
        }
        Ok(Values(out))
      }
    }

    deserializer.deserialize_any(ValuesVisitor)
  }
}

/// A task's `matrix` section.
///
/// Dimension order is declaration order and stays observable through
/// expansion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatrixSpec {
  /// Extra variants appended after the product; dimensions unknown to the
  /// product are accepted.
  #[serde(default)]
  pub include: Vec<IndexMap<String, Values>>,

  /// Partial variants removed from the result: a tuple matches an entry if
  /// every named dimension is equal.
  #[serde(default)]
  pub exclude: Vec<IndexMap<String, Values>>,

  #[serde(flatten)]
  pub dimensions: IndexMap<String, Values>,
}

impl MatrixSpec {
  /// Expand into the ordered, filtered list of entries.
  pub fn entries(&self, filter: &MatrixFilter) -> Vec<MatrixEntry> {
    let mut all = if self.dimensions.is_empty() {
      if self.include.is_empty() {
        // a task without a matrix still runs exactly once
        vec![MatrixEntry::new()]
      } else {
        Vec::new()
      }
    } else {
      product(&self.dimensions)
    };

    for extra in &self.include {
      all.extend(product(extra));
    }

    all.retain(|entry| {
      !self
        .exclude
        .iter()
        .flat_map(product_ref)
        .any(|partial| entry.contains_all(&partial))
    });

    all.retain(|entry| filter.matches(entry));
    all
  }
}

/// Cartesian product in declaration order; the last dimension varies
/// fastest.
fn product(dims: &IndexMap<String, Values>) -> Vec<MatrixEntry> {
  product_ref(dims).collect()
}

fn product_ref(dims: &IndexMap<String, Values>) -> impl Iterator<Item = MatrixEntry> + '_ {
  let mut entries: Vec<MatrixEntry> = vec![MatrixEntry::new()];

  for (name, values) in dims {
    let mut next = Vec::with_capacity(entries.len() * values.0.len().max(1));
    for entry in &entries {
      for value in &values.0 {
        let mut grown = entry.clone();
        grown.set(name.clone(), value.clone());
        next.push(grown);
      }
    }
    entries = next;
  }

  entries.into_iter()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec(text: &str) -> MatrixSpec {
    serde_yaml::from_str(text).unwrap()
  }

  fn names(entries: &[MatrixEntry]) -> Vec<String> {
    entries.iter().map(|e| e.to_string()).collect()
  }

  #[test]
  fn product_order_follows_declaration() {
    let m = spec("kernel: [linux, darwin]\narch: [amd64, arm64]");
    let entries = m.entries(&MatrixFilter::default());
    assert_eq!(
      names(&entries),
      [
        "arch=amd64, kernel=linux",
        "arch=arm64, kernel=linux",
        "arch=amd64, kernel=darwin",
        "arch=arm64, kernel=darwin",
      ]
    );
  }

  #[test]
  fn include_exclude_and_cli_filter_compose() {
    // the worked example from the task scheduler: keep (linux, amd64) and
    // the included windows variant
    let m = spec(
      "os: [linux, darwin]\narch: [amd64, arm64]\ninclude:\n- os: windows\n  arch: amd64\nexclude:\n- arch: arm64\n",
    );
    let filter = MatrixFilter::parse(&["os!=darwin"]);
    let entries = m.entries(&filter);
    assert_eq!(
      names(&entries),
      ["arch=amd64, os=linux", "arch=amd64, os=windows"]
    );
  }

  #[test]
  fn no_dimensions_yield_a_single_empty_entry() {
    let m = spec("{}");
    let entries = m.entries(&MatrixFilter::default());
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_empty());
  }

  #[test]
  fn include_lists_expand_to_their_product() {
    let m = spec("include:\n- kernel: [linux, darwin]\n  arch: amd64\n");
    let entries = m.entries(&MatrixFilter::default());
    assert_eq!(
      names(&entries),
      ["arch=amd64, kernel=linux", "arch=amd64, kernel=darwin"]
    );
  }

  #[test]
  fn exclude_matches_partial_tuples() {
    let m = spec("kernel: [linux]\narch: [amd64, arm64, mips64le]\nexclude:\n- arch: [arm64, mips64le]\n");
    let entries = m.entries(&MatrixFilter::default());
    assert_eq!(names(&entries), ["arch=amd64, kernel=linux"]);
  }

  #[test]
  fn include_accepts_unknown_dimensions() {
    let m = spec("kernel: [linux]\ninclude:\n- kernel: linux\n  libc: musl\n");
    let entries = m.entries(&MatrixFilter::default());
    assert_eq!(names(&entries), ["kernel=linux", "kernel=linux, libc=musl"]);
  }

  #[test]
  fn scalar_dimension_values_are_accepted() {
    let m = spec("kernel: linux\narch: [amd64]");
    let entries = m.entries(&MatrixFilter::default());
    assert_eq!(names(&entries), ["arch=amd64, kernel=linux"]);
  }
}
