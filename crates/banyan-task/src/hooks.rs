//! Lifecycle hook points and their action lists.

use indexmap::IndexMap;
use serde::Deserialize;

use crate::action::Action;
use crate::error::ExecError;

/// The eight lifecycle points of a task invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
  Before,
  After,
  AfterSuccess,
  AfterFailure,
  BeforeMatrix,
  AfterMatrix,
  AfterMatrixSuccess,
  AfterMatrixFailure,
}

impl HookPoint {
  pub const ALL: [HookPoint; 8] = [
    HookPoint::Before,
    HookPoint::After,
    HookPoint::AfterSuccess,
    HookPoint::AfterFailure,
    HookPoint::BeforeMatrix,
    HookPoint::AfterMatrix,
    HookPoint::AfterMatrixSuccess,
    HookPoint::AfterMatrixFailure,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      HookPoint::Before => "before",
      HookPoint::After => "after",
      HookPoint::AfterSuccess => "after:success",
      HookPoint::AfterFailure => "after:failure",
      HookPoint::BeforeMatrix => "before:matrix",
      HookPoint::AfterMatrix => "after:matrix",
      HookPoint::AfterMatrixSuccess => "after:matrix:success",
      HookPoint::AfterMatrixFailure => "after:matrix:failure",
    }
  }

  pub fn from_str(name: &str) -> Option<Self> {
    HookPoint::ALL.iter().copied().find(|p| p.as_str() == name)
  }
}

impl std::fmt::Display for HookPoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A task's `hooks` section: point name → action list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hooks {
  #[serde(flatten)]
  entries: IndexMap<String, Vec<Action>>,
}

impl Hooks {
  /// Reject hook names that are not lifecycle points.
  pub fn validate(&self) -> Result<(), ExecError> {
    for name in self.entries.keys() {
      if HookPoint::from_str(name).is_none() {
        return Err(ExecError::UnknownHook { name: name.clone() });
      }
    }
    Ok(())
  }

  pub fn actions(&self, point: HookPoint) -> &[Action] {
    self
      .entries
      .get(point.as_str())
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hook_names_round_trip() {
    for point in HookPoint::ALL {
      assert_eq!(HookPoint::from_str(point.as_str()), Some(point));
    }
  }

  #[test]
  fn unknown_points_fail_validation() {
    let hooks: Hooks =
      serde_yaml::from_str("\"before:everything\":\n- cmd: [true]\n").unwrap();
    assert!(hooks.validate().is_err());
  }

  #[test]
  fn known_points_decode() {
    let hooks: Hooks = serde_yaml::from_str(
      "before:\n- cmd: [echo, hi]\n\"after:matrix:success\":\n- shell: echo done\n",
    )
    .unwrap();
    hooks.validate().unwrap();
    assert_eq!(hooks.actions(HookPoint::Before).len(), 1);
    assert_eq!(hooks.actions(HookPoint::AfterMatrixSuccess).len(), 1);
    assert!(hooks.actions(HookPoint::After).is_empty());
  }
}
