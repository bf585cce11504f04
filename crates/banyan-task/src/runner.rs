//! The task scheduler and hook state machine.

use std::future::Future;
use std::pin::Pin;

use futures::stream::StreamExt;
use tracing::{error, info, warn};

use crate::context::TaskContext;
use crate::error::ExecError;
use crate::executor::execute_specs;
use crate::hooks::{HookPoint, Hooks};
use crate::spec::{MatrixExecOptions, PlanStep, ReplaceTable};
use crate::task::{task_identity, Task};
use crate::tool::{Tool, ToolKey};

/// Backstop against `task:` hook reference cycles.
const MAX_TASK_DEPTH: usize = 64;

/// Run one task invocation: resolve, expand the matrix, drive hooks and
/// execute every entry's plan.
///
/// Matrix entries run sequentially unless the task declares `parallelism`;
/// either way `seq` ordinals follow expansion order so aggregating tasks
/// can restore it.
pub fn run_task<'a>(
  ctx: &'a TaskContext,
  tool: &'a Tool,
  task: &'a dyn Task,
) -> Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>> {
  Box::pin(async move {
    if ctx.depth() >= MAX_TASK_DEPTH {
      return Err(ExecError::DepthExceeded {
        limit: MAX_TASK_DEPTH,
      });
    }

    let identity = task_identity(tool.kind(), tool.name(), task.kind(), task.name(), None);

    // tool env first, then the task's own env on top
    let base_render = ctx.render().with_env(
      tool
        .env()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone())),
    );

    let common = task.doc().common(&base_render).await?;
    let task_render = base_render.with_env(
      common
        .env
        .iter()
        .map(|e| (e.name.clone(), e.value.clone())),
    );
    let tctx = ctx.with_render(task_render);

    let entries = common.matrix.entries(ctx.matrix_filter());
    let exec_id = ctx.state().next_exec_id();

    info!(
      invocation_id = %ctx.state().invocation_id(),
      task = %identity,
      exec_id,
      entries = entries.len(),
      "task_started"
    );

    if let Err(err) = run_hook(&tctx, tool, task, HookPoint::Before).await {
      error!(task = %identity, error = %err, "before hook failed");
      let _ = run_hook(&tctx, tool, task, HookPoint::AfterFailure).await;
      let _ = run_hook(&tctx, tool, task, HookPoint::After).await;
      return Err(err);
    }

    let total = entries.len();
    let width = common.parallelism.unwrap_or(1).max(1);

    let mut first_error: Option<ExecError> = None;

    if width <= 1 {
      for (seq, entry) in entries.iter().enumerate() {
        let result = run_matrix_entry(&tctx, tool, task, exec_id, seq, total, entry).await;
        if let Err(err) = result {
          if !is_execution_error(&err) || !common.continue_on_error {
            first_error = Some(err);
            break;
          }
          warn!(task = %identity, error = %err, "continuing after entry failure");
          first_error.get_or_insert(err);
        }
      }
    } else {
      let mut iter = entries.iter().enumerate();
      let mut pending = futures::stream::FuturesUnordered::new();
      for (seq, entry) in iter.by_ref().take(width) {
        pending.push(boxed_entry_fut(&tctx, tool, task, exec_id, seq, total, entry));
      }

      let mut results: Vec<Result<(), ExecError>> = Vec::with_capacity(total);
      while let Some(result) = pending.next().await {
        if let Some((seq, entry)) = iter.next() {
          pending.push(boxed_entry_fut(&tctx, tool, task, exec_id, seq, total, entry));
        }
        results.push(result);
      }

      if let Some(err) = results.into_iter().find_map(Result::err) {
        if is_execution_error(&err) && common.continue_on_error {
          warn!(task = %identity, error = %err, "continuing after entry failure");
        }
        first_error = Some(err);
      }
    }

    let failed = first_error
      .as_ref()
      .is_some_and(|err| !is_execution_error(err) || !common.continue_on_error);

    if failed {
      let _ = run_hook(&tctx, tool, task, HookPoint::AfterFailure).await;
    } else if let Err(err) = run_hook(&tctx, tool, task, HookPoint::AfterSuccess).await {
      first_error.get_or_insert(err);
    }

    if let Err(err) = run_hook(&tctx, tool, task, HookPoint::After).await {
      first_error.get_or_insert(err);
    }

    match first_error {
      Some(err) if !is_execution_error(&err) || !common.continue_on_error => {
        error!(task = %identity, error = %err, "task_failed");
        Err(err)
      }
      Some(err) => {
        warn!(task = %identity, error = %err, "task_completed with tolerated failures");
        Ok(())
      }
      None => {
        info!(task = %identity, "task_completed");
        Ok(())
      }
    }
  })
}

#[allow(clippy::too_many_arguments)]
fn boxed_entry_fut<'a>(
  tctx: &'a TaskContext,
  tool: &'a Tool,
  task: &'a dyn Task,
  exec_id: u64,
  seq: usize,
  total: usize,
  entry: &'a banyan_matrix::MatrixEntry,
) -> Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>> {
  Box::pin(run_matrix_entry(tctx, tool, task, exec_id, seq, total, entry))
}

#[allow(clippy::too_many_arguments)]
async fn run_matrix_entry(
  tctx: &TaskContext,
  tool: &Tool,
  task: &dyn Task,
  exec_id: u64,
  seq: usize,
  total: usize,
  entry: &banyan_matrix::MatrixEntry,
) -> Result<(), ExecError> {
  let identity = task_identity(
    tool.kind(),
    tool.name(),
    task.kind(),
    task.name(),
    Some(entry),
  );

  let mctx = tctx.with_render(tctx.render().with_matrix_entry(entry));

  run_hook(&mctx, tool, task, HookPoint::BeforeMatrix).await?;

  let opts = MatrixExecOptions {
    exec_id,
    seq,
    total,
    use_shell: tool.use_shell(),
    shell_name: tool.shell_name().map(str::to_owned),
    tool_cmd: tool.cmd().to_vec(),
  };

  let result = async {
    let plan = task.exec_specs(&mctx, &opts).await?;
    let mut replace = ReplaceTable::new();
    for step in plan {
      execute_step(&mctx, tool, &identity, step, &mut replace).await?;
    }
    Ok::<(), ExecError>(())
  }
  .await;

  run_hook(&mctx, tool, task, HookPoint::AfterMatrix).await?;

  match &result {
    Ok(()) => {
      run_hook(&mctx, tool, task, HookPoint::AfterMatrixSuccess).await?;
      info!(entry = %identity, "matrix_entry_completed");
    }
    Err(err) => {
      run_hook(&mctx, tool, task, HookPoint::AfterMatrixFailure).await?;
      error!(entry = %identity, error = %err, "matrix_entry_failed");
    }
  }

  result
}

/// Execute one plan step: specs directly, task references as full nested
/// invocations using the current (matrix-aware) context.
pub(crate) async fn execute_step(
  ctx: &TaskContext,
  tool: &Tool,
  identity: &str,
  step: PlanStep,
  replace: &mut ReplaceTable,
) -> Result<(), ExecError> {
  match step {
    PlanStep::Specs(specs) => execute_specs(ctx, identity, specs, replace).await,
    PlanStep::TaskRef {
      reference,
      ignore_error,
    } => {
      let key = ToolKey {
        kind: reference.tool_kind.clone(),
        name: if reference.tool_name.is_empty() {
          tool.name().to_owned()
        } else {
          reference.tool_name.clone()
        },
      };

      let ref_tool = ctx
        .state()
        .get_tool(&key)
        .ok_or_else(|| ExecError::UnknownTool {
          key: key.to_string(),
        })?;
      let ref_task = ref_tool
        .get_task(&reference.task_kind, &reference.task_name)
        .ok_or_else(|| ExecError::UnknownTask {
          key: format!("{}:{}", reference.task_kind, reference.task_name),
          tool: key.to_string(),
        })?;

      let mut nested = ctx.deeper();
      if !reference.filter_args.is_empty() {
        nested = nested.with_matrix_filter(reference.matrix_filter());
      }

      match run_task(&nested, ref_tool.as_ref(), ref_task.as_ref()).await {
        Ok(()) => Ok(()),
        Err(err) if ignore_error && is_execution_error(&err) => {
          warn!(identity, error = %err, "ignoring referenced task failure");
          Ok(())
        }
        Err(err) => Err(err),
      }
    }
  }
}

/// Resolve the task's hooks with the given context and run one point's
/// actions in order.
pub(crate) async fn run_hook(
  ctx: &TaskContext,
  tool: &Tool,
  task: &dyn Task,
  point: HookPoint,
) -> Result<(), ExecError> {
  if ctx.cancel().is_cancelled() {
    // a cancelled context skips even failure hooks
    return Err(ExecError::Cancelled);
  }

  let hooks: Option<Hooks> = task.doc().section(ctx.render(), "hooks").await?;
  let Some(hooks) = hooks else {
    return Ok(());
  };
  hooks.validate()?;

  let actions = hooks.actions(point);
  if actions.is_empty() {
    return Ok(());
  }

  info!(
    task = %task.name(),
    hook = %point,
    actions = actions.len(),
    "running hook"
  );

  let mut replace = ReplaceTable::new();
  for (index, action) in actions.iter().enumerate() {
    let identity = format!("{}#{}", point, action.identity(index));
    let step = action.plan(index, tool.name())?;
    execute_step(ctx, tool, &identity, step, &mut replace).await?;
  }

  Ok(())
}

/// Whether `continue_on_error` may swallow this error: it applies to
/// command execution only, never to configuration or resolution failures.
pub(crate) fn is_execution_error(err: &ExecError) -> bool {
  matches!(
    err,
    ExecError::CommandFailed { .. } | ExecError::Spawn { .. }
  )
}
