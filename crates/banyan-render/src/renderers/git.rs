//! Git fetch renderer: one file out of a repository.
//!
//! The URL grammar is `<repo>.git/<path-in-repo>[@ref]`. Transport is
//! delegated to the `git` binary (shallow clone into a scratch directory);
//! results go through the two-tier cache.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use banyan_field::{DocValue, RenderInput};
use serde::Deserialize;
use tracing::debug;

use crate::attributes::CacheAttributes;
use crate::renderers::cached::{fetch_through_cache, CacheConfig};
use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "git";

/// SSH connection defaults for repositories given without a scheme.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshConfig {
  #[serde(default)]
  pub host: Option<String>,
  #[serde(default)]
  pub port: Option<u16>,
  #[serde(default)]
  pub user: Option<String>,
  #[serde(default)]
  pub identity_file: Option<String>,
}

/// Driver spec.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitSpec {
  #[serde(default)]
  pub ssh: SshConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

/// What to fetch, parsed from the one-line form or given structurally.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FetchSpec {
  pub repo: String,
  pub path: String,
  #[serde(default, rename = "ref")]
  pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InputSpec {
  #[serde(flatten)]
  fetch: FetchSpec,
  #[serde(default)]
  ssh: Option<SshConfig>,
}

pub struct Git {
  name: String,
  spec: GitSpec,
  cache: Option<banyan_cache::TwoTierCache>,
}

impl Git {
  pub fn new(name: impl Into<String>, spec: GitSpec, cache_root: &Path) -> Self {
    let name = name.into();
    let cache = spec.cache.build(cache_root, &name);
    Self { name, spec, cache }
  }

  /// `<repo>.git/<path>[@ref]`, with an optional `host:` prefix carrying
  /// the ssh endpoint.
  fn parse_one_line(&self, line: &str, ssh: &SshConfig) -> Result<(FetchSpec, SshConfig), RenderError> {
    let mut ssh = ssh.clone();
    let mut rest = line.trim().to_owned();

    let mut fetch = FetchSpec::default();

    if let Some(idx) = rest.rfind('@') {
      if idx > 0 {
        fetch.reference = Some(rest[idx + 1..].to_owned());
        rest.truncate(idx);
      }
    }

    let Some(idx) = rest.find(".git") else {
      return Err(RenderError::Input {
        renderer: self.name.clone(),
        message: format!("invalid request url '{line}': no '.git' found"),
      });
    };

    fetch.repo = rest[..idx + 4].to_owned();
    fetch.path = rest[idx + 4..].trim_start_matches('/').to_owned();

    // a colon ahead of the repo names the ssh endpoint: `host:org/repo.git`
    if !fetch.repo.contains("://") {
      if let Some(idx) = fetch.repo.rfind(':') {
        let host_part = fetch.repo[..idx].to_owned();
        fetch.repo = fetch.repo[idx + 1..].to_owned();

        match host_part.rsplit_once(':') {
          Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
            ssh.host = Some(host.to_owned());
            ssh.port = Some(port.parse().map_err(|_| RenderError::Input {
              renderer: self.name.clone(),
              message: format!("invalid port value '{port}'"),
            })?);
          }
          _ => {
            ssh.host = Some(host_part);
            ssh.port = None;
          }
        }
      }
    }

    Ok((fetch, ssh))
  }

  async fn fetch_remote(&self, fetch: &FetchSpec, ssh: &SshConfig) -> Result<Vec<u8>, RenderError> {
    let scratch = tempfile::tempdir().map_err(|source| RenderError::Io {
      renderer: self.name.clone(),
      path: "tempdir".to_owned(),
      source,
    })?;

    let url = if fetch.repo.contains("://") {
      fetch.repo.clone()
    } else if let Some(host) = &ssh.host {
      let user = ssh.user.as_deref().unwrap_or("git");
      match ssh.port {
        Some(port) => format!("ssh://{user}@{host}:{port}/{}", fetch.repo),
        None => format!("ssh://{user}@{host}/{}", fetch.repo),
      }
    } else {
      fetch.repo.clone()
    };

    debug!(renderer = %self.name, url = %url, "cloning repository");

    let mut cmd = tokio::process::Command::new("git");
    cmd
      .arg("clone")
      .arg("--quiet")
      .arg("--depth")
      .arg("1");
    if let Some(reference) = &fetch.reference {
      cmd.arg("--branch").arg(reference);
    }
    cmd
      .arg(&url)
      .arg(scratch.path())
      .env("GIT_TERMINAL_PROMPT", "0")
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped());

    if let Some(identity) = &ssh.identity_file {
      cmd.env(
        "GIT_SSH_COMMAND",
        format!("ssh -i {identity} -o IdentitiesOnly=yes"),
      );
    }

    let output = cmd.output().await.map_err(|e| RenderError::Exec {
      renderer: self.name.clone(),
      message: format!("failed to spawn git: {e}"),
    })?;

    if !output.status.success() {
      return Err(RenderError::Exec {
        renderer: self.name.clone(),
        message: format!(
          "git clone of '{url}' exited with {}: {}",
          output.status,
          String::from_utf8_lossy(&output.stderr).trim()
        ),
      });
    }

    let file = scratch.path().join(&fetch.path);
    tokio::fs::read(&file).await.map_err(|source| RenderError::Io {
      renderer: self.name.clone(),
      path: file.display().to_string(),
      source,
    })
  }
}

#[async_trait]
impl Renderer for Git {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let attrs = CacheAttributes::parse(&self.name, attributes)?;

    let (fetch, ssh) = match input {
      RenderInput::Bytes(b) => {
        let line = String::from_utf8(b).map_err(|_| RenderError::Input {
          renderer: self.name.clone(),
          message: "url is not utf-8".to_owned(),
        })?;
        self.parse_one_line(&line, &self.spec.ssh)?
      }
      RenderInput::Value(serde_yaml::Value::String(line)) => {
        self.parse_one_line(&line, &self.spec.ssh)?
      }
      RenderInput::Value(raw) => {
        let mut doc = DocValue::from_yaml(raw).map_err(|source| RenderError::InputSpec {
          renderer: self.name.clone(),
          source,
        })?;
        doc
          .resolve(ctx, -1)
          .await
          .map_err(|source| RenderError::InputSpec {
            renderer: self.name.clone(),
            source,
          })?;
        let spec: InputSpec = doc.decode().map_err(|source| RenderError::InputSpec {
          renderer: self.name.clone(),
          source,
        })?;
        let ssh = spec.ssh.unwrap_or_else(|| self.spec.ssh.clone());
        (spec.fetch, ssh)
      }
    };

    let key = format!(
      "{}/{}@{}",
      fetch.repo,
      fetch.path,
      fetch.reference.as_deref().unwrap_or("HEAD")
    );

    fetch_through_cache(&self.name, self.cache.as_ref(), &key, &attrs, || {
      self.fetch_remote(&fetch, &ssh)
    })
    .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn driver() -> Git {
    Git::new(DEFAULT_NAME, GitSpec::default(), Path::new("/tmp/unused"))
  }

  #[test]
  fn one_line_with_ref() {
    let (fetch, _) = driver()
      .parse_one_line("example.com:org/repo.git/docs/ci.yaml@v2", &SshConfig::default())
      .unwrap();
    assert_eq!(fetch.repo, "org/repo.git");
    assert_eq!(fetch.path, "docs/ci.yaml");
    assert_eq!(fetch.reference.as_deref(), Some("v2"));
  }

  #[test]
  fn host_and_port_split_from_repo() {
    let (fetch, ssh) = driver()
      .parse_one_line("example.com:2222:org/repo.git/file", &SshConfig::default())
      .unwrap();
    assert_eq!(ssh.host.as_deref(), Some("example.com"));
    assert_eq!(ssh.port, Some(2222));
    assert_eq!(fetch.repo, "org/repo.git");
    assert_eq!(fetch.path, "file");
  }

  #[test]
  fn scheme_urls_pass_through() {
    let (fetch, ssh) = driver()
      .parse_one_line("https://example.com/org/repo.git/file@main", &SshConfig::default())
      .unwrap();
    assert_eq!(fetch.repo, "https://example.com/org/repo.git");
    assert_eq!(fetch.path, "file");
    assert_eq!(fetch.reference.as_deref(), Some("main"));
    assert!(ssh.host.is_none());
  }

  #[test]
  fn missing_dot_git_is_rejected() {
    assert!(driver()
      .parse_one_line("example.com/org/repo/file", &SshConfig::default())
      .is_err());
  }
}
