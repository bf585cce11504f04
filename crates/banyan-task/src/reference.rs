//! `task:` reference parsing.
//!
//! Grammar: `<toolKind>{:<toolName>}:<taskKind>(<taskName>[, k=v | k!=v ...])`.
//! The tool name defaults to the tool the referencing action runs under.

use banyan_matrix::MatrixFilter;

use crate::error::ExecError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReference {
  pub tool_kind: String,
  /// Empty means "the current tool".
  pub tool_name: String,
  pub task_kind: String,
  pub task_name: String,
  /// Inline matrix predicates, applied to the nested invocation.
  pub filter_args: Vec<String>,
}

impl TaskReference {
  pub fn parse(text: &str, current_tool_name: &str) -> Result<Self, ExecError> {
    let bad = |message: &str| ExecError::BadTaskReference {
      text: text.to_owned(),
      message: message.to_owned(),
    };

    let text = text.trim();
    let Some(open) = text.find('(') else {
      return Err(bad("missing '(<taskName>)'"));
    };
    if !text.ends_with(')') {
      return Err(bad("missing closing ')'"));
    }

    let head = &text[..open];
    let args = &text[open + 1..text.len() - 1];

    let parts: Vec<&str> = head.split(':').collect();
    let (tool_kind, tool_name, task_kind) = match parts.as_slice() {
      [kind, task_kind] => (*kind, current_tool_name, *task_kind),
      [kind, tool_name, task_kind] => (*kind, *tool_name, *task_kind),
      _ => return Err(bad("expecting '<toolKind>[:<toolName>]:<taskKind>'")),
    };
    if tool_kind.is_empty() || task_kind.is_empty() {
      return Err(bad("empty tool kind or task kind"));
    }

    let mut pieces = args.split(',').map(str::trim);
    let task_name = pieces.next().unwrap_or_default();
    if task_name.is_empty() {
      return Err(bad("empty task name"));
    }

    let filter_args: Vec<String> = pieces
      .filter(|p| !p.is_empty())
      .map(str::to_owned)
      .collect();

    Ok(TaskReference {
      tool_kind: tool_kind.to_owned(),
      tool_name: tool_name.to_owned(),
      task_kind: task_kind.to_owned(),
      task_name: task_name.to_owned(),
      filter_args,
    })
  }

  pub fn matrix_filter(&self) -> MatrixFilter {
    MatrixFilter::parse(&self.filter_args)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn short_form_inherits_the_current_tool() {
    let r = TaskReference::parse("golang:build(app)", "ci").unwrap();
    assert_eq!(r.tool_kind, "golang");
    assert_eq!(r.tool_name, "ci");
    assert_eq!(r.task_kind, "build");
    assert_eq!(r.task_name, "app");
    assert!(r.filter_args.is_empty());
  }

  #[test]
  fn full_form_with_filter() {
    let r = TaskReference::parse("docker:registry:push(app, kernel=linux, arch!=arm64)", "x")
      .unwrap();
    assert_eq!(r.tool_name, "registry");
    assert_eq!(r.filter_args, ["kernel=linux", "arch!=arm64"]);

    let filter = r.matrix_filter();
    assert!(!filter.is_empty());
  }

  #[test]
  fn malformed_references_are_rejected_with_cause() {
    for text in ["golang:build", "golang:build(", "golang:build()", "justname(app)"] {
      assert!(TaskReference::parse(text, "t").is_err(), "accepted {text}");
    }
  }
}
