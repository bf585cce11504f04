use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use banyan_config::{host_env, Config, IncludePolicy};
use banyan_matrix::MatrixFilter;
use banyan_task::{run_task, ExecError, RunState, TaskContext, ToolKey};

/// banyan - a declarative build and automation orchestrator
#[derive(Parser)]
#[command(name = "banyan")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the root configuration file
  #[arg(short, long, global = true, default_value = "banyan.yaml")]
  config: PathBuf,

  /// Skip missing include files instead of failing
  #[arg(long, global = true)]
  allow_missing_includes: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a task: `run <toolKind> <toolName> <taskKind> <taskName> [k=v|k!=v ...]`
  Run {
    tool_kind: String,
    tool_name: String,
    task_kind: String,
    task_name: String,

    /// Matrix filter predicates (`k=v` keeps, `k!=v` drops)
    #[arg(trailing_var_arg = true)]
    matrix_filter: Vec<String>,
  },

  /// Resolve a document and print the rendered result
  Render {
    /// Path to the document (YAML)
    file: PathBuf,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let rt = tokio::runtime::Runtime::new()?;

  let result = match cli.command {
    Some(Commands::Run {
      tool_kind,
      tool_name,
      task_kind,
      task_name,
      matrix_filter,
    }) => rt.block_on(run(
      cli.config,
      cli.allow_missing_includes,
      ToolKey {
        kind: tool_kind,
        name: tool_name,
      },
      task_kind,
      task_name,
      matrix_filter,
    )),
    Some(Commands::Render { file }) => {
      rt.block_on(render(cli.config, cli.allow_missing_includes, file))
    }
    None => {
      println!("banyan - use --help to see available commands");
      Ok(())
    }
  };

  if let Err(err) = result {
    eprintln!("Error: {err:#}");

    // propagate the failing command's exit code when there is one
    for cause in err.chain() {
      if let Some(ExecError::CommandFailed {
        code: Some(code), ..
      }) = cause.downcast_ref::<ExecError>()
      {
        std::process::exit(*code);
      }
    }
    std::process::exit(1);
  }

  Ok(())
}

async fn run(
  config_path: PathBuf,
  allow_missing_includes: bool,
  key: ToolKey,
  task_kind: String,
  task_name: String,
  matrix_filter: Vec<String>,
) -> Result<()> {
  let loaded = load(config_path, allow_missing_includes).await?;

  let Some(tool) = loaded.tools.get(&key).cloned() else {
    bail!("tool '{key}' not found");
  };
  let Some(task) = tool.get_task(&task_kind, &task_name) else {
    bail!("task '{task_kind}:{task_name}' not found on tool '{key}'");
  };

  let cancel = CancellationToken::new();
  {
    let cancel = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("interrupted, cancelling");
        cancel.cancel();
      }
    });
  }

  let tools: HashMap<ToolKey, Arc<banyan_task::Tool>> = loaded
    .tools
    .iter()
    .map(|(k, v)| (k.clone(), v.clone()))
    .collect();

  let ctx = TaskContext::new(
    loaded.render.clone(),
    Arc::new(RunState::new(tools)),
    cancel,
  )
  .with_matrix_filter(MatrixFilter::parse(&matrix_filter));

  run_task(&ctx, tool.as_ref(), task.as_ref())
    .await
    .context("task execution failed")?;

  Ok(())
}

async fn render(config_path: PathBuf, allow_missing_includes: bool, file: PathBuf) -> Result<()> {
  let loaded = load(config_path, allow_missing_includes).await?;

  let text = tokio::fs::read_to_string(&file)
    .await
    .with_context(|| format!("failed to read {}", file.display()))?;

  let mut doc = banyan_field::DocValue::from_yaml_str(&text)
    .with_context(|| format!("failed to parse {}", file.display()))?;
  doc
    .resolve(&loaded.render, -1)
    .await
    .context("failed to resolve document")?;

  let value = doc.to_value()?;
  print!("{}", serde_yaml::to_string(&value)?);

  Ok(())
}

async fn load(
  config_path: PathBuf,
  allow_missing_includes: bool,
) -> Result<banyan_config::Loaded> {
  let policy = if allow_missing_includes {
    IncludePolicy::SkipMissing
  } else {
    IncludePolicy::FailOnMissing
  };

  let config = Config::load(&config_path, policy)
    .with_context(|| format!("failed to load {}", config_path.display()))?;

  let probed = host_env().await;
  let working_dir = std::env::current_dir().context("could not determine working directory")?;

  config
    .resolve(probed, working_dir)
    .await
    .context("failed to resolve configuration")
}
