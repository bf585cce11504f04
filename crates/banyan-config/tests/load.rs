//! Configuration loading, include processing and the staged resolve.

use std::path::Path;
use std::sync::Arc;

use banyan_config::{Config, ConfigError, IncludePolicy};
use banyan_task::{run_task, RunState, TaskContext, ToolKey};
use tokio_util::sync::CancellationToken;

fn write(dir: &Path, name: &str, content: &str) {
  std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn include_cycle_loads_each_file_once() {
  let tmp = tempfile::tempdir().unwrap();
  write(
    tmp.path(),
    "a.yaml",
    "include: [b.yaml]\ntools:\n  workflow:\n  - name: from-a\n",
  );
  write(
    tmp.path(),
    "b.yaml",
    "include: [a.yaml]\ntools:\n  workflow:\n  - name: from-b\n",
  );

  let config = Config::load(&tmp.path().join("a.yaml"), IncludePolicy::FailOnMissing).unwrap();

  // the merged tree holds both documents' tools
  let rt = tokio::runtime::Runtime::new().unwrap();
  let loaded = rt
    .block_on(config.resolve(Vec::new(), tmp.path().to_path_buf()))
    .unwrap();

  assert_eq!(loaded.tools.len(), 2);
  for name in ["from-a", "from-b"] {
    let key = ToolKey {
      kind: "workflow".to_owned(),
      name: name.to_owned(),
    };
    assert!(loaded.tools.contains_key(&key), "missing tool {name}");
  }
}

#[test]
fn directory_includes_expand_to_yaml_files() {
  let tmp = tempfile::tempdir().unwrap();
  std::fs::create_dir(tmp.path().join("conf.d")).unwrap();
  write(tmp.path(), "root.yaml", "include: [conf.d]\n");
  write(
    tmp.path(),
    "conf.d/10-first.yaml",
    "tools:\n  workflow:\n  - name: first\n",
  );
  write(
    tmp.path(),
    "conf.d/20-second.yml",
    "tools:\n  workflow:\n  - name: second\n",
  );
  write(tmp.path(), "conf.d/ignored.txt", "not yaml\n");

  let config = Config::load(&tmp.path().join("root.yaml"), IncludePolicy::FailOnMissing).unwrap();
  let rt = tokio::runtime::Runtime::new().unwrap();
  let loaded = rt
    .block_on(config.resolve(Vec::new(), tmp.path().to_path_buf()))
    .unwrap();

  assert_eq!(loaded.tools.len(), 2);
}

#[test]
fn bootstrap_sections_merge_with_their_own_rules() {
  let tmp = tempfile::tempdir().unwrap();
  write(
    tmp.path(),
    "a.yaml",
    "include: [b.yaml]\nbootstrap:\n  env:\n  - name: A\n    value: '1'\n  cache_dir: /tmp/c1\n",
  );
  write(
    tmp.path(),
    "b.yaml",
    "bootstrap:\n  env:\n  - name: B\n    value: '2'\n  cache_dir: /tmp/c2\n",
  );

  let config = Config::load(&tmp.path().join("a.yaml"), IncludePolicy::FailOnMissing).unwrap();
  let names: Vec<&str> = config.bootstrap.env.iter().map(|e| e.name.as_str()).collect();
  assert_eq!(names, ["A", "B"]);
  assert_eq!(config.bootstrap.effective_cache_dir(), "/tmp/c2");
}

#[test]
fn bootstrap_script_cmd_override_replaces_the_section() {
  let tmp = tempfile::tempdir().unwrap();
  write(
    tmp.path(),
    "a.yaml",
    "include: [b.yaml]\nbootstrap:\n  env:\n  - name: A\n    value: '1'\n  script_cmd: [sh, -c]\n",
  );
  write(tmp.path(), "b.yaml", "bootstrap:\n  script_cmd: [bash, -c]\n");

  let config = Config::load(&tmp.path().join("a.yaml"), IncludePolicy::FailOnMissing).unwrap();

  // no [sh, -c, bash, -c] concatenation: the later document wins outright
  assert_eq!(config.bootstrap.effective_script_cmd(), ["bash", "-c"]);
  assert!(config.bootstrap.env.is_empty());
}

#[test]
fn missing_includes_follow_the_policy() {
  let tmp = tempfile::tempdir().unwrap();
  write(tmp.path(), "root.yaml", "include: [nope.yaml]\n");

  let err =
    Config::load(&tmp.path().join("root.yaml"), IncludePolicy::FailOnMissing).unwrap_err();
  assert!(matches!(err, ConfigError::MissingInclude { .. }));

  Config::load(&tmp.path().join("root.yaml"), IncludePolicy::SkipMissing).unwrap();
}

#[test]
fn include_key_rejects_rendering_suffixes() {
  let tmp = tempfile::tempdir().unwrap();
  write(tmp.path(), "root.yaml", "include@env: [$SOMEWHERE]\n");

  let err =
    Config::load(&tmp.path().join("root.yaml"), IncludePolicy::FailOnMissing).unwrap_err();
  assert!(matches!(err, ConfigError::SuffixNotAllowed { .. }));
}

#[test]
fn duplicate_tool_names_are_rejected() {
  let tmp = tempfile::tempdir().unwrap();
  write(
    tmp.path(),
    "root.yaml",
    "tools:\n  workflow:\n  - name: twin\n  - name: twin\n",
  );

  let config = Config::load(&tmp.path().join("root.yaml"), IncludePolicy::FailOnMissing).unwrap();
  let rt = tokio::runtime::Runtime::new().unwrap();
  let err = rt
    .block_on(config.resolve(Vec::new(), tmp.path().to_path_buf()))
    .unwrap_err();
  assert!(matches!(err, ConfigError::DuplicateTool { .. }));
}

#[test]
fn tool_agnostic_tasks_attach_to_every_tool_of_the_kind() {
  let tmp = tempfile::tempdir().unwrap();
  write(
    tmp.path(),
    "root.yaml",
    r#"
tools:
  workflow:
  - name: one
  - name: two

workflow::run:
- name: everywhere
  jobs:
  - cmd: ["true"]
"#,
  );

  let config = Config::load(&tmp.path().join("root.yaml"), IncludePolicy::FailOnMissing).unwrap();
  let rt = tokio::runtime::Runtime::new().unwrap();
  let loaded = rt
    .block_on(config.resolve(Vec::new(), tmp.path().to_path_buf()))
    .unwrap();

  for name in ["one", "two"] {
    let key = ToolKey {
      kind: "workflow".to_owned(),
      name: name.to_owned(),
    };
    let tool = &loaded.tools[&key];
    assert!(tool.get_task("run", "everywhere").is_some());
  }
}

#[cfg(unix)]
#[tokio::test]
async fn resolved_config_runs_end_to_end() {
  let tmp = tempfile::tempdir().unwrap();
  write(
    tmp.path(),
    "root.yaml",
    r#"
include: [extra.yaml]

bootstrap:
  env:
  - name: GREETING
    value: hello

tools:
  workflow:
  - name: local
    env:
    - name: TOOL_MARK
      value: from-tool
"#,
  );
  write(
    tmp.path(),
    "extra.yaml",
    r#"
workflow:local:run:
- name: greet
  matrix:
    arch: [amd64, arm64]
  jobs:
  - shell: echo "$GREETING $TOOL_MARK $MATRIX_ARCH" >> log
"#,
  );

  let config = Config::load(&tmp.path().join("root.yaml"), IncludePolicy::FailOnMissing).unwrap();
  let loaded = config
    .resolve(Vec::new(), tmp.path().to_path_buf())
    .await
    .unwrap();

  let key = ToolKey {
    kind: "workflow".to_owned(),
    name: "local".to_owned(),
  };
  let tool = loaded.tools[&key].clone();
  let tool_ref: &banyan_task::Tool = &tool;
  let task = tool.get_task("run", "greet").unwrap();

  let ctx = TaskContext::new(
    loaded.render.clone(),
    Arc::new(RunState::new(
      loaded
        .tools
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
    )),
    CancellationToken::new(),
  );

  run_task(&ctx, &tool_ref, task.as_ref()).await.unwrap();

  let log = std::fs::read_to_string(tmp.path().join("log")).unwrap();
  assert_eq!(
    log.lines().collect::<Vec<_>>(),
    [
      "hello from-tool amd64",
      "hello from-tool arm64",
    ]
  );
}
