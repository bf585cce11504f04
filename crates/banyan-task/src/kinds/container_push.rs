//! `container:push`: push images per matrix entry, then push the collected
//! manifest lists once every entry of the matrix has reported.

use std::sync::Arc;

use async_trait::async_trait;
use banyan_render::renderers::template::default_image_tag;
use serde::Deserialize;

use crate::aggregate::Aggregator;
use crate::context::TaskContext;
use crate::error::ExecError;
use crate::spec::{ExecSpec, MatrixExecOptions, PlanStep, TaskPlan};
use crate::task::{Task, TaskDoc};

pub const TASK_KIND: &str = "push";

#[derive(Debug, Clone, Default, Deserialize)]
struct ImageNameSpec {
  #[serde(default)]
  image: String,
  #[serde(default)]
  manifest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PushSpec {
  #[serde(default)]
  image_names: Vec<ImageNameSpec>,
}

pub struct PushTask {
  name: String,
  doc: TaskDoc,
  /// Manifest names recorded across matrix iterations, flushed by the
  /// entry that completes the set.
  manifests: Aggregator<String>,
}

pub fn new_task(name: String, doc: TaskDoc) -> Arc<dyn Task> {
  Arc::new(PushTask {
    name,
    doc,
    manifests: Aggregator::new(),
  })
}

#[async_trait]
impl Task for PushTask {
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
    let spec: PushSpec = self.doc.resolved(ctx.render()).await?;

    let targets = if spec.image_names.is_empty() {
      vec![ImageNameSpec {
        image: self.name.clone(),
        manifest: String::new(),
      }]
    } else {
      spec.image_names
    };

    let mut specs = Vec::new();

    for (sub_index, target) in targets.iter().enumerate() {
      if !target.image.is_empty() {
        let image = with_default_tag(ctx, &target.image, true);

        let mut cmd = opts.tool_cmd.to_vec();
        cmd.push("push".to_owned());
        cmd.push(image);

        let mut push = ExecSpec::command(cmd);
        push.use_shell = opts.use_shell;
        push.shell_name = opts.shell_name.clone();
        specs.push(push);
      }

      if !target.manifest.is_empty() {
        let manifest = with_default_tag(ctx, &target.manifest, false);
        self
          .manifests
          .record(opts.exec_id, manifest.clone(), opts.seq, sub_index, manifest);
      }
    }

    // flush every manifest list once the whole matrix has reported, in
    // user-declared order; with parallel entries the highest seq may
    // finish first, so completion is counted, not positional
    if self
      .manifests
      .complete_entry(opts.exec_id, opts.seq, opts.total)
    {
      for manifest in self.manifests.drain_ordered(opts.exec_id) {
        let mut cmd = opts.tool_cmd.to_vec();
        cmd.extend(
          ["manifest", "push", "--all"].map(str::to_owned),
        );
        cmd.push(local_manifest_name(&manifest));
        cmd.push(format!("docker://{manifest}"));

        let mut push = ExecSpec::command(cmd);
        push.use_shell = opts.use_shell;
        push.shell_name = opts.shell_name.clone();
        specs.push(push);
      }
    }

    Ok(vec![PlanStep::Specs(specs)])
  }
}

/// Append the context's default tag when the name has none.
fn with_default_tag(ctx: &TaskContext, name: &str, with_arch: bool) -> String {
  let after_slash = name.rsplit('/').next().unwrap_or(name);
  if after_slash.contains(':') {
    return name.to_owned();
  }
  format!("{name}:{}", default_image_tag(ctx.render(), with_arch))
}

/// Local alias a manifest list is assembled under before it is pushed to
/// its real destination.
fn local_manifest_name(name: &str) -> String {
  name.replace(['/', ':'], "-")
}
