//! Script execution renderer (`shell`, `shell:<name>`).

use std::process::Stdio;

use async_trait::async_trait;
use banyan_field::RenderInput;
use tracing::debug;

use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "shell";

/// Runs its input as a script and renders the captured stdout.
///
/// The plain `shell` renderer uses the bootstrap script interpreter; a
/// qualified `shell:<name>` renderer runs through the shell tool registered
/// under that name.
pub struct Shell {
  name: String,
  shell_name: Option<String>,
}

impl Shell {
  /// The embedded variant (bootstrap `script_cmd`).
  pub fn new_embedded() -> Self {
    Self {
      name: DEFAULT_NAME.to_owned(),
      shell_name: None,
    }
  }

  /// The external variant bound to a named shell tool.
  pub fn new_external(shell_name: impl Into<String>) -> Self {
    let shell_name = shell_name.into();
    Self {
      name: format!("{DEFAULT_NAME}:{shell_name}"),
      shell_name: Some(shell_name),
    }
  }
}

#[async_trait]
impl Renderer for Shell {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let script_bytes = input.to_yaml_bytes().map_err(|e| RenderError::Input {
      renderer: self.name.clone(),
      message: e.to_string(),
    })?;
    let script = String::from_utf8(script_bytes).map_err(|_| RenderError::Input {
      renderer: self.name.clone(),
      message: "script is not utf-8".to_owned(),
    })?;

    let (cmd, extra_env): (Vec<String>, Vec<(String, String)>) = match &self.shell_name {
      None => (ctx.script_cmd().to_vec(), Vec::new()),
      Some(name) => {
        let spec = ctx.shell(name).ok_or_else(|| RenderError::Exec {
          renderer: self.name.clone(),
          message: format!("shell '{name}' not configured"),
        })?;
        (
          spec.cmd.clone(),
          spec.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )
      }
    };

    run_script(&self.name, ctx, &cmd, &extra_env, &script).await
  }
}

/// Run `script` through an interpreter argv, capturing stdout.
pub(crate) async fn run_script(
  renderer: &str,
  ctx: &RenderContext,
  interpreter: &[String],
  extra_env: &[(String, String)],
  script: &str,
) -> Result<Vec<u8>, RenderError> {
  let (program, args) = interpreter.split_first().ok_or_else(|| RenderError::Exec {
    renderer: renderer.to_owned(),
    message: "empty interpreter command".to_owned(),
  })?;

  debug!(renderer, program, "running script");

  let mut cmd = tokio::process::Command::new(program);
  cmd
    .args(args)
    .arg(script)
    .current_dir(ctx.working_dir())
    .env_clear()
    .envs(ctx.env_iter())
    .envs(extra_env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

  let output = cmd.output().await.map_err(|e| RenderError::Exec {
    renderer: renderer.to_owned(),
    message: format!("failed to spawn '{program}': {e}"),
  })?;

  if !output.status.success() {
    return Err(RenderError::Exec {
      renderer: renderer.to_owned(),
      message: format!(
        "script exited with {}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
      ),
    });
  }

  Ok(output.stdout)
}
