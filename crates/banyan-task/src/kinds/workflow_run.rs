//! `workflow:run`: a task whose body is an ordered action list.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::action::Action;
use crate::context::TaskContext;
use crate::error::ExecError;
use crate::spec::{MatrixExecOptions, TaskPlan};
use crate::task::{Task, TaskDoc};

pub const TASK_KIND: &str = "run";

#[derive(Debug, Clone, Default, Deserialize)]
struct RunSpec {
  #[serde(default)]
  jobs: Vec<Action>,
}

pub struct RunTask {
  name: String,
  doc: TaskDoc,
}

pub fn new_task(name: String, doc: TaskDoc) -> Arc<dyn Task> {
  Arc::new(RunTask { name, doc })
}

#[async_trait]
impl Task for RunTask {
  fn kind(&self) -> &str {
    TASK_KIND
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn doc(&self) -> &TaskDoc {
    &self.doc
  }

  async fn exec_specs(
    &self,
    ctx: &TaskContext,
    _opts: &MatrixExecOptions,
  ) -> Result<TaskPlan, ExecError> {
    let spec: RunSpec = self.doc.resolved(ctx.render()).await?;

    let mut plan = TaskPlan::new();
    for (index, action) in spec.jobs.iter().enumerate() {
      // the tool name travels with the context's current tool; workflow
      // jobs referencing short-form tasks resolve against it in the runner
      plan.push(action.plan(index, "")?);
    }
    Ok(plan)
  }
}
