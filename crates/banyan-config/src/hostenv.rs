//! Startup probing of the build environment.
//!
//! Populated before any renderer runs and exported through the rendering
//! context so downstream renderers and subprocesses all see the same view:
//! `GIT_*` from the repository, `TIME_*` from the wall clock, `HOST_*` from
//! the platform.

use chrono::{Datelike, Local, Timelike};
use tracing::debug;

async fn git_output(args: &[&str]) -> Option<String> {
  let output = tokio::process::Command::new("git")
    .args(args)
    .stdin(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .output()
    .await
    .ok()?;

  if !output.status.success() {
    return None;
  }
  Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Probe git and host state into environment entries.
pub async fn host_env() -> Vec<(String, String)> {
  let mut env = Vec::new();

  let branch = git_output(&["symbolic-ref", "--short", "-q", "HEAD"])
    .await
    .map(|s| s.trim().to_owned())
    .unwrap_or_default();
  env.push(("GIT_BRANCH".to_owned(), branch));

  let commit = git_output(&["rev-parse", "HEAD"])
    .await
    .map(|s| s.trim().to_owned())
    .unwrap_or_default();
  env.push(("GIT_COMMIT".to_owned(), commit));

  let tag = git_output(&["describe", "--tags"])
    .await
    .map(|s| s.trim().to_owned())
    .unwrap_or_default();
  env.push(("GIT_TAG".to_owned(), tag));

  let clean = git_output(&["diff-index", "--quiet", "HEAD"])
    .await
    .map(|_| "true".to_owned())
    .unwrap_or_else(|| "false".to_owned());
  env.push(("GIT_WORKSPACE_CLEAN".to_owned(), clean));

  let default_branch = git_output(&["symbolic-ref", "refs/remotes/origin/HEAD"])
    .await
    .map(|s| {
      s.trim()
        .trim_start_matches("refs/remotes/origin/")
        .to_owned()
    })
    .unwrap_or_default();
  env.push(("GIT_DEFAULT_BRANCH".to_owned(), default_branch));

  let now = Local::now();
  env.push(("TIME_YEAR".to_owned(), now.year().to_string()));
  env.push(("TIME_MONTH".to_owned(), now.month().to_string()));
  env.push(("TIME_DAY".to_owned(), now.day().to_string()));
  env.push(("TIME_HOUR".to_owned(), now.hour().to_string()));
  env.push(("TIME_MINUTE".to_owned(), now.minute().to_string()));
  env.push(("TIME_SECOND".to_owned(), now.second().to_string()));

  env.push(("HOST_OS".to_owned(), std::env::consts::OS.to_owned()));
  env.push(("HOST_ARCH".to_owned(), std::env::consts::ARCH.to_owned()));

  debug!(entries = env.len(), "probed host environment");
  env
}
