//! `git:clone`: clone a repository and check out the wanted branch.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::TaskContext;
use crate::error::ExecError;
use crate::spec::{ExecSpec, MatrixExecOptions, PlanStep, StdoutFixup, TaskPlan};
use crate::task::{Task, TaskDoc};

pub const TASK_KIND: &str = "clone";

/// Replace token holding the remote's default branch, captured when no
/// branch was configured.
const DEFAULT_BRANCH_TOKEN: &str = "<DEFAULT_BRANCH>";

#[derive(Debug, Clone, Default, Deserialize)]
struct CloneSpec {
  #[serde(default)]
  url: String,
  #[serde(default)]
  path: Option<String>,
  #[serde(default)]
  remote_branch: Option<String>,
  #[serde(default)]
  local_branch: Option<String>,
  #[serde(default)]
  remote_name: Option<String>,
  #[serde(default)]
  extra_args: Vec<String>,
}

pub struct CloneTask {
  name: String,
  doc: TaskDoc,
}

pub fn new_task(name: String, doc: TaskDoc) -> Arc<dyn Task> {
  Arc::new(CloneTask { name, doc })
}

#[async_trait]
impl Task for CloneTask {
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
    opts: &MatrixExecOptions,
  ) -> Result<TaskPlan, ExecError> {
    let spec: CloneSpec = self.doc.resolved(ctx.render()).await?;

    if spec.url.is_empty() {
      return Err(ExecError::Decode {
        what: "clone spec",
        identity: self.name.clone(),
        message: "remote url not set".to_owned(),
      });
    }

    let remote_name = spec.remote_name.as_deref().unwrap_or("origin");
    let remote_branch = spec.remote_branch.clone().unwrap_or_default();
    let local_branch = spec
      .local_branch
      .clone()
      .unwrap_or_else(|| remote_branch.clone());

    let tool_cmd = opts.tool_cmd.to_vec();
    let mut specs = Vec::new();

    let mut clone_cmd = tool_cmd.clone();
    clone_cmd.extend(["clone", "--no-checkout", "--origin", remote_name].map(str::to_owned));
    if !remote_branch.is_empty() {
      clone_cmd.push("--branch".to_owned());
      clone_cmd.push(remote_branch.clone());
    }
    clone_cmd.extend(spec.extra_args.iter().cloned());
    clone_cmd.push(spec.url.clone());
    if let Some(path) = &spec.path {
      clone_cmd.push(path.clone());
    }
    specs.push(ExecSpec::command(clone_cmd));

    let local_path = match &spec.path {
      Some(path) if !path.is_empty() => PathBuf::from(path),
      _ => PathBuf::from(
        spec
          .url
          .rsplit('/')
          .next()
          .unwrap_or(&spec.url)
          .trim_end_matches(".git"),
      ),
    };

    // no branch configured at all: ask the remote for its default branch
    // and let later specs substitute the captured name
    let (local_branch, remote_branch) = if local_branch.is_empty() {
      let mut probe = ExecSpec::command({
        let mut cmd = tool_cmd.clone();
        cmd.push("symbolic-ref".to_owned());
        cmd.push(format!("refs/remotes/{remote_name}/HEAD"));
        cmd
      });
      probe.chdir = Some(local_path.clone());
      probe.stdout_as_replace = Some(DEFAULT_BRANCH_TOKEN.to_owned());
      probe.fix_stdout =
        StdoutFixup::TrimThenStripPrefix(format!("refs/remotes/{remote_name}/"));
      specs.push(probe);

      (
        DEFAULT_BRANCH_TOKEN.to_owned(),
        DEFAULT_BRANCH_TOKEN.to_owned(),
      )
    } else {
      (local_branch, remote_branch)
    };

    let mut checkout = ExecSpec::command({
      let mut cmd = tool_cmd;
      cmd.push("checkout".to_owned());
      cmd.push("-b".to_owned());
      cmd.push(local_branch.clone());
      cmd.push(format!("{remote_name}/{remote_branch}"));
      cmd
    });
    checkout.chdir = Some(local_path);
    specs.push(checkout);

    Ok(vec![PlanStep::Specs(specs)])
  }
}
