//! Scheduler tests driving real (shell) subprocesses.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use banyan_field::DocValue;
use banyan_matrix::MatrixFilter;
use banyan_render::{Registry, RenderContext};
use banyan_task::kinds::workflow_run;
use banyan_task::{
  execute_specs, run_task, AlterExec, ExecError, ExecSpec, ReplaceTable, RunState, StdoutFixup,
  Task, TaskContext, TaskDoc, Tool, ToolKey,
};
use tokio_util::sync::CancellationToken;

fn run_tool() -> Tool {
  Tool::new("workflow", "local", Vec::new(), Default::default())
}

fn make_ctx(dir: &Path, tools: HashMap<ToolKey, Arc<Tool>>) -> TaskContext {
  let render = RenderContext::builder(Registry::new())
    .working_dir(dir)
    .env("PATH", std::env::var("PATH").unwrap_or_default())
    .build();
  TaskContext::new(
    render,
    Arc::new(RunState::new(tools)),
    CancellationToken::new(),
  )
}

fn run_task_from_yaml(body: &str) -> Arc<dyn Task> {
  workflow_run::new_task(
    "it".to_owned(),
    TaskDoc::new(DocValue::from_yaml_str(body).unwrap()),
  )
}

fn log_lines(dir: &Path) -> Vec<String> {
  match std::fs::read_to_string(dir.join("log")) {
    Ok(text) => text.lines().map(str::to_owned).collect(),
    Err(_) => Vec::new(),
  }
}

#[tokio::test]
async fn matrix_entries_run_in_order_with_bound_env() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let task = run_task_from_yaml(
    "matrix:\n  arch: [amd64, arm64]\njobs:\n- shell: echo \"job $MATRIX_ARCH\" >> log\n",
  );

  run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap();
  assert_eq!(log_lines(tmp.path()), ["job amd64", "job arm64"]);
}

#[tokio::test]
async fn hook_points_fire_in_lifecycle_order() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let task = run_task_from_yaml(
    r#"
matrix:
  arch: [amd64]
hooks:
  before:
  - shell: echo before >> log
  "before:matrix":
  - shell: echo before:matrix >> log
  "after:matrix":
  - shell: echo after:matrix >> log
  "after:matrix:success":
  - shell: echo after:matrix:success >> log
  "after:success":
  - shell: echo after:success >> log
  after:
  - shell: echo after >> log
jobs:
- shell: echo body >> log
"#,
  );

  run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap();
  assert_eq!(
    log_lines(tmp.path()),
    [
      "before",
      "before:matrix",
      "body",
      "after:matrix",
      "after:matrix:success",
      "after:success",
      "after",
    ]
  );
}

#[tokio::test]
async fn failure_runs_the_failure_hooks_and_aborts() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let task = run_task_from_yaml(
    r#"
hooks:
  "after:matrix:failure":
  - shell: echo after:matrix:failure >> log
  "after:failure":
  - shell: echo after:failure >> log
  after:
  - shell: echo after >> log
jobs:
- shell: echo one >> log
- shell: exit 7
- shell: echo never >> log
"#,
  );

  let err = run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap_err();
  assert!(matches!(err, ExecError::CommandFailed { .. }));
  assert_eq!(
    log_lines(tmp.path()),
    ["one", "after:matrix:failure", "after:failure", "after"]
  );
}

#[tokio::test]
async fn continue_on_error_keeps_later_matrix_entries_running() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let task = run_task_from_yaml(
    r#"
continue_on_error: true
matrix:
  step: [fail, ok]
jobs:
- shell: test "$MATRIX_STEP" = ok && echo "ran $MATRIX_STEP" >> log || exit 1
"#,
  );

  // the failing entry is tolerated; the run reports success
  run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap();
  assert_eq!(log_lines(tmp.path()), ["ran ok"]);
}

#[tokio::test]
async fn action_continue_on_error_is_per_action() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let task = run_task_from_yaml(
    "jobs:\n- shell: exit 1\n  continue_on_error: true\n- shell: echo still-here >> log\n",
  );

  run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap();
  assert_eq!(log_lines(tmp.path()), ["still-here"]);
}

#[tokio::test]
async fn cli_matrix_filter_limits_entries() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new())
    .with_matrix_filter(MatrixFilter::parse(&["arch!=arm64"]));

  let task = run_task_from_yaml(
    "matrix:\n  arch: [amd64, arm64]\njobs:\n- shell: echo $MATRIX_ARCH >> log\n",
  );

  run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap();
  assert_eq!(log_lines(tmp.path()), ["amd64"]);
}

#[tokio::test]
async fn task_hooks_can_invoke_other_tasks() {
  let tmp = tempfile::tempdir().unwrap();

  let helper = run_task_from_yaml("jobs:\n- shell: echo helper >> log\n");
  let mut helper_tool = Tool::new("workflow", "aux", Vec::new(), Default::default());
  helper_tool.add_task(helper);
  let helper_tool = Arc::new(helper_tool);

  let mut tools = HashMap::new();
  tools.insert(helper_tool.key(), helper_tool);
  let ctx = make_ctx(tmp.path(), tools);

  let task = run_task_from_yaml(
    "hooks:\n  before:\n  - task: workflow:aux:run(it)\njobs:\n- shell: echo main >> log\n",
  );

  run_task(&ctx, &run_tool(), task.as_ref()).await.unwrap();
  assert_eq!(log_lines(tmp.path()), ["helper", "main"]);
}

#[tokio::test]
async fn captured_stdout_substitutes_into_later_specs() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let mut probe = ExecSpec::command(vec![
    "sh".to_owned(),
    "-c".to_owned(),
    "printf ' main \\n'".to_owned(),
  ]);
  probe.stdout_as_replace = Some("<BRANCH>".to_owned());
  probe.fix_stdout = StdoutFixup::Trim;

  let record = ExecSpec::command(vec![
    "sh".to_owned(),
    "-c".to_owned(),
    "echo got <BRANCH> >> log".to_owned(),
  ]);

  let mut replace = ReplaceTable::new();
  execute_specs(&ctx, "test", vec![probe, record], &mut replace)
    .await
    .unwrap();

  assert_eq!(log_lines(tmp.path()), ["got main"]);
  assert_eq!(replace.get("<BRANCH>").map(Vec::as_slice), Some(&b"main"[..]));
}

struct Splice;

#[async_trait::async_trait]
impl AlterExec for Splice {
  async fn run(
    &self,
    _ctx: &TaskContext,
    replace: &mut ReplaceTable,
  ) -> Result<Vec<ExecSpec>, ExecError> {
    replace.insert("<WORD>".to_owned(), b"spliced".to_vec());
    Ok(vec![ExecSpec::command(vec![
      "sh".to_owned(),
      "-c".to_owned(),
      "echo <WORD> >> log".to_owned(),
    ])])
  }
}

#[tokio::test]
async fn alter_exec_splices_specs_in_place() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());

  let mut dynamic = ExecSpec::default();
  dynamic.alter_exec = Some(Arc::new(Splice));

  let tail = ExecSpec::command(vec![
    "sh".to_owned(),
    "-c".to_owned(),
    "echo tail >> log".to_owned(),
  ]);

  let mut replace = ReplaceTable::new();
  execute_specs(&ctx, "test", vec![dynamic, tail], &mut replace)
    .await
    .unwrap();

  assert_eq!(log_lines(tmp.path()), ["spliced", "tail"]);
}

#[tokio::test]
async fn cancellation_stops_before_spawning() {
  let tmp = tempfile::tempdir().unwrap();
  let ctx = make_ctx(tmp.path(), HashMap::new());
  ctx.cancel().cancel();

  let spec = ExecSpec::command(vec![
    "sh".to_owned(),
    "-c".to_owned(),
    "echo never >> log".to_owned(),
  ]);

  let mut replace = ReplaceTable::new();
  let err = execute_specs(&ctx, "test", vec![spec], &mut replace)
    .await
    .unwrap_err();
  assert!(matches!(err, ExecError::Cancelled));
  assert!(log_lines(tmp.path()).is_empty());
}
