//! The process executor: spawns ExecSpecs in order, maintaining the
//! replace table.

use std::collections::VecDeque;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::context::TaskContext;
use crate::error::ExecError;
use crate::spec::{ExecSpec, ReplaceTable};

/// Execute specs strictly in order.
///
/// A spec's `alter_exec` supersedes spawning: the specs it returns are
/// spliced in place at the front of the remaining queue. Captured stdout
/// (`stdout_as_replace`) lands in `replace` and substitutes into later
/// specs' command, env, chdir and stdin as `<TOKEN>` occurrences.
pub async fn execute_specs(
  ctx: &TaskContext,
  identity: &str,
  specs: Vec<ExecSpec>,
  replace: &mut ReplaceTable,
) -> Result<(), ExecError> {
  let mut queue: VecDeque<ExecSpec> = specs.into();

  while let Some(spec) = queue.pop_front() {
    if ctx.cancel().is_cancelled() {
      return Err(ExecError::Cancelled);
    }

    if let Some(alter) = &spec.alter_exec {
      let further = alter.run(ctx, replace).await?;
      for extra in further.into_iter().rev() {
        queue.push_front(extra);
      }
      continue;
    }

    match execute_one(ctx, identity, &spec, replace).await {
      Ok(()) => {}
      Err(err) if spec.ignore_error => {
        warn!(identity, error = %err, "ignoring failed command");
      }
      Err(err) => return Err(err),
    }
  }

  Ok(())
}

async fn execute_one(
  ctx: &TaskContext,
  identity: &str,
  spec: &ExecSpec,
  replace: &mut ReplaceTable,
) -> Result<(), ExecError> {
  let command: Vec<String> = spec
    .command
    .iter()
    .map(|part| substitute(part, replace))
    .collect();
  if command.is_empty() {
    return Ok(());
  }

  // route through a shell when asked: the joined command becomes the
  // script argument of the interpreter argv
  let argv: Vec<String> = if spec.use_shell {
    let interpreter: Vec<String> = match &spec.shell_name {
      Some(name) => {
        let shell = ctx
          .render()
          .shell(name)
          .ok_or_else(|| ExecError::ShellNotFound { name: name.clone() })?;
        shell.cmd.clone()
      }
      None => ctx.render().script_cmd().to_vec(),
    };
    let mut argv = interpreter;
    argv.push(command.join(" "));
    argv
  } else {
    command.clone()
  };

  let (program, args) = argv.split_first().ok_or_else(|| ExecError::InvalidAction {
    identity: identity.to_owned(),
    message: "empty command".to_owned(),
  })?;

  debug!(identity, command = ?argv, "spawning");

  let mut cmd = tokio::process::Command::new(program);
  cmd.args(args);

  match &spec.chdir {
    Some(dir) => {
      let dir = substitute(&dir.display().to_string(), replace);
      cmd.current_dir(ctx.render().working_dir().join(dir));
    }
    None => {
      cmd.current_dir(ctx.render().working_dir());
    }
  }

  cmd.env_clear().envs(ctx.render().env_iter());
  for (k, v) in &spec.env {
    cmd.env(k, substitute(v, replace));
  }

  let stdin_bytes = spec.stdin.as_ref().map(|bytes| {
    match std::str::from_utf8(bytes) {
      Ok(text) => substitute(text, replace).into_bytes(),
      Err(_) => bytes.clone(),
    }
  });

  cmd.stdin(if stdin_bytes.is_some() {
    Stdio::piped()
  } else {
    Stdio::null()
  });

  let capture = spec.stdout_as_replace.is_some();
  cmd.stdout(if capture {
    Stdio::piped()
  } else if spec.show_stdout {
    Stdio::inherit()
  } else {
    Stdio::null()
  });
  cmd.stderr(if spec.show_stderr {
    Stdio::inherit()
  } else {
    Stdio::null()
  });

  cmd.kill_on_drop(true);

  let mut child = cmd.spawn().map_err(|source| ExecError::Spawn {
    identity: identity.to_owned(),
    command: argv.clone(),
    source,
  })?;

  if let Some(bytes) = stdin_bytes {
    if let Some(mut stdin) = child.stdin.take() {
      let _ = stdin.write_all(&bytes).await;
      // close so the child sees EOF
      drop(stdin);
    }
  }

  let output = tokio::select! {
    output = child.wait_with_output() => output.map_err(|source| ExecError::Spawn {
      identity: identity.to_owned(),
      command: argv.clone(),
      source,
    })?,
    _ = ctx.cancel().cancelled() => {
      return Err(ExecError::Cancelled);
    }
  };

  if !output.status.success() {
    return Err(ExecError::CommandFailed {
      identity: identity.to_owned(),
      command: argv,
      code: output.status.code(),
    });
  }

  if let Some(token) = &spec.stdout_as_replace {
    let captured = spec.fix_stdout.apply(output.stdout);
    replace.insert(token.clone(), captured);
  }

  Ok(())
}

/// In-place `<TOKEN>` substitution from the replace table.
fn substitute(text: &str, replace: &ReplaceTable) -> String {
  let mut out = text.to_owned();
  for (token, value) in replace {
    if out.contains(token.as_str()) {
      out = out.replace(token.as_str(), &String::from_utf8_lossy(value));
    }
  }
  out
}
