//! The task abstraction and the shared document plumbing task kinds use.

use async_trait::async_trait;
use banyan_field::{DocValue, FieldError, RenderingHandler};
use banyan_matrix::MatrixSpec;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::context::TaskContext;
use crate::error::ExecError;
use crate::spec::{MatrixExecOptions, TaskPlan};

/// One `name: value` environment entry (task and tool `env` sections are
/// ordered lists, later entries may reference earlier ones).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnvEntry {
  pub name: String,
  #[serde(default)]
  pub value: String,
}

/// The attributes every task kind shares.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskCommon {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub env: Vec<EnvEntry>,
  #[serde(default)]
  pub matrix: MatrixSpec,
  /// Execution errors of one matrix entry do not abort the others.
  #[serde(default)]
  pub continue_on_error: bool,
  /// Optional fan-out width across matrix entries; absent means sequential.
  #[serde(default)]
  pub parallelism: Option<usize>,
}

/// A kinded unit of work.
///
/// Implementations hold their body as an unresolved [`TaskDoc`] and
/// re-resolve it per matrix entry, so entry-specific renderings never leak
/// into one another.
#[async_trait]
pub trait Task: Send + Sync {
  /// Task kind within its tool (e.g. `clone`, `push`, `run`).
  fn kind(&self) -> &str;

  fn name(&self) -> &str;

  /// The task body document.
  fn doc(&self) -> &TaskDoc;

  /// Emit the plan for one matrix entry.
  ///
  /// `ctx` already carries the entry bound as matrix variables.
  async fn exec_specs(
    &self,
    ctx: &TaskContext,
    opts: &MatrixExecOptions,
  ) -> Result<TaskPlan, ExecError>;
}

/// A task body held in its two-phase document form.
#[derive(Debug, Clone)]
pub struct TaskDoc {
  doc: DocValue,
}

impl TaskDoc {
  pub fn new(doc: DocValue) -> Self {
    Self { doc }
  }

  pub fn doc(&self) -> &DocValue {
    &self.doc
  }

  /// Resolve only the named top-level field on a clone and decode it.
  ///
  /// Returns `None` when the body has no such field.
  pub async fn section<T: DeserializeOwned>(
    &self,
    rc: &dyn RenderingHandler,
    field: &str,
  ) -> Result<Option<T>, FieldError> {
    let DocValue::Node(node) = &self.doc else {
      return Ok(None);
    };

    let mut node = node.clone();
    node.resolve_fields(rc, -1, Some(&[field][..])).await?;

    match node.get(field) {
      Some(value) => value.decode().map(Some),
      None => Ok(None),
    }
  }

  /// Fully resolve a clone of the body and decode it; fields `T` does not
  /// know stay ignored.
  pub async fn resolved<T: DeserializeOwned>(
    &self,
    rc: &dyn RenderingHandler,
  ) -> Result<T, FieldError> {
    let resolved = self.doc.resolved_clone(rc, -1).await?;
    resolved.decode()
  }

  /// The shared task attributes, resolved against `rc`.
  ///
  /// Only the common fields are rendered here; kind-specific fields often
  /// reference matrix variables and must wait for an entry-bound context.
  pub async fn common(&self, rc: &dyn RenderingHandler) -> Result<TaskCommon, FieldError> {
    const FIELDS: [&str; 5] = ["name", "env", "matrix", "continue_on_error", "parallelism"];

    let DocValue::Node(node) = &self.doc else {
      return Ok(TaskCommon::default());
    };

    let mut node = node.clone();
    node.resolve_fields(rc, -1, Some(FIELDS.as_slice())).await?;

    let mut map = serde_yaml::Mapping::new();
    for field in FIELDS {
      if let Some(value) = node.get(field) {
        map.insert(serde_yaml::Value::String(field.to_owned()), value.to_value()?);
      }
    }

    serde_yaml::from_value(serde_yaml::Value::Mapping(map)).map_err(|source| {
      FieldError::Decode {
        path: "task".to_owned(),
        source,
      }
    })
  }
}

/// Identity string used in errors: `toolKind:toolName/taskKind:taskName`
/// plus the matrix entry when one is bound.
pub fn task_identity(
  tool_kind: &str,
  tool_name: &str,
  task_kind: &str,
  task_name: &str,
  matrix: Option<&banyan_matrix::MatrixEntry>,
) -> String {
  match matrix {
    Some(entry) if !entry.is_empty() => {
      format!("{tool_kind}:{tool_name}/{task_kind}:{task_name}{{{entry}}}")
    }
    _ => format!("{tool_kind}:{tool_name}/{task_kind}:{task_name}"),
  }
}
