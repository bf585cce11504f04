//! The top-level configuration and its staged resolve.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use banyan_field::DocValue;
use banyan_render::renderers::{
  archivefile::ArchiveFile, echo::Echo, env::Env, file::File, git::Git, http::Http, shell::Shell,
  template::Template, transform::Transform,
};
use banyan_render::{Registry, RenderContext, Renderer, ShellSpec};
use banyan_task::kinds::TaskRegistry;
use banyan_task::{EnvEntry, TaskDoc, Tool, ToolKey};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::bootstrap::Bootstrap;
use crate::error::ConfigError;
use crate::include::{load_config_tree, IncludePolicy};

/// A shell tool entry from the `shells` section.
#[derive(Debug, Clone, Default, Deserialize)]
struct ShellEntry {
  name: String,
  #[serde(default)]
  cmd: Vec<String>,
  #[serde(default)]
  env: Vec<EnvEntry>,
}

/// A tool entry from the `tools` section.
#[derive(Debug, Clone, Default, Deserialize)]
struct ToolEntry {
  #[serde(default)]
  name: String,
  #[serde(default)]
  cmd: Vec<String>,
  #[serde(default)]
  env: Vec<EnvEntry>,
  #[serde(default)]
  use_shell: bool,
  #[serde(default)]
  shell_name: Option<String>,
  #[serde(default)]
  cache_dir: Option<String>,
}

/// The merged configuration tree, bootstrap split off, everything else
/// still in document form.
pub struct Config {
  doc: DocValue,
  pub bootstrap: Bootstrap,
}

impl fmt::Debug for Config {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Config")
      .field("bootstrap", &self.bootstrap)
      .finish_non_exhaustive()
  }
}

/// The runnable product of configuration resolve: a frozen rendering
/// context and the tool map.
pub struct Loaded {
  pub render: RenderContext,
  pub tools: HashMap<ToolKey, Arc<Tool>>,
}

impl fmt::Debug for Loaded {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Loaded")
      .field("tools", &self.tools.keys().collect::<Vec<_>>())
      .finish_non_exhaustive()
  }
}

impl Config {
  /// Load `root` and its includes.
  ///
  /// The include loader splits `bootstrap` sections off per file and merges
  /// them with their own rules (env appends, cache dir overrides, a changed
  /// script command replaces the section); the rest of the documents merge
  /// as one tree.
  pub fn load(root: &Path, policy: IncludePolicy) -> Result<Self, ConfigError> {
    let (doc, bootstrap) = load_config_tree(root, policy)?;
    Ok(Config { doc, bootstrap })
  }

  /// Resolve the tree into runnable state.
  ///
  /// The resolve is staged the way rendering dependencies require:
  /// essential renderers first, then shells (which register `shell:<name>`
  /// renderers), then user renderers, then tools, then task grouping.
  pub async fn resolve(
    mut self,
    host_env: Vec<(String, String)>,
    working_dir: PathBuf,
  ) -> Result<Loaded, ConfigError> {
    let cache_root = PathBuf::from(self.bootstrap.effective_cache_dir());
    let script_cmd = self.bootstrap.effective_script_cmd();

    let mut env_pairs: Vec<(String, String)> = std::env::vars().collect();
    env_pairs.extend(host_env);
    env_pairs.extend(
      self
        .bootstrap
        .env
        .iter()
        .map(|e| (e.name.clone(), e.value.clone())),
    );

    let make_ctx = |registry: Registry, shells: &HashMap<String, ShellSpec>| {
      let mut builder = RenderContext::builder(registry)
        .script_cmd(script_cmd.clone())
        .cache_root(cache_root.clone())
        .working_dir(working_dir.clone());
      for (k, v) in &env_pairs {
        builder = builder.env(k.clone(), v.clone());
      }
      for (name, spec) in shells {
        builder = builder.shell(name.clone(), spec.clone());
      }
      builder.build()
    };

    let mut registry = essential_registry();
    let ctx0 = make_ctx(registry.clone(), &HashMap::new());

    debug!("resolving top level config");
    self.doc.resolve(&ctx0, 1).await?;

    let DocValue::Node(mut node) = self.doc else {
      return Err(ConfigError::Decode {
        what: "config".to_owned(),
        message: "top level document is not a mapping".to_owned(),
      });
    };

    // shells become both execution targets and `shell:<name>` renderers
    let mut shells: HashMap<String, ShellSpec> = HashMap::new();
    if let Some(mut shells_doc) = node.take("shells") {
      shells_doc.resolve(&ctx0, -1).await?;
      let entries: Vec<ShellEntry> = shells_doc.decode().map_err(|e| ConfigError::Decode {
        what: "shells".to_owned(),
        message: e.to_string(),
      })?;

      for entry in entries {
        if entry.name.is_empty() {
          return Err(ConfigError::Decode {
            what: "shells".to_owned(),
            message: "shell entry without name".to_owned(),
          });
        }
        let cmd = if entry.cmd.is_empty() {
          vec![entry.name.clone(), "-c".to_owned()]
        } else {
          entry.cmd
        };
        let env: IndexMap<String, String> = entry
          .env
          .into_iter()
          .map(|e| (e.name, e.value))
          .collect();

        registry.add(Arc::new(Shell::new_external(&entry.name)));
        shells.insert(entry.name, ShellSpec { cmd, env });
      }
    }

    let ctx1 = make_ctx(registry.clone(), &shells);

    // user renderers, resolved with the essential + shell set
    if let Some(renderers_doc) = node.take("renderers") {
      let DocValue::Node(renderers) = renderers_doc else {
        return Err(ConfigError::Decode {
          what: "renderers".to_owned(),
          message: "renderers must be a mapping".to_owned(),
        });
      };

      let names: Vec<String> = renderers.entries().map(|(k, _)| k.to_owned()).collect();
      let mut renderers = renderers;
      for name in names {
        let mut spec_doc = renderers.take(&name).expect("listed above");
        spec_doc.resolve(&ctx1, -1).await?;
        let spec_value = spec_doc.to_value()?;
        let driver = build_renderer(&name, spec_value, &cache_root)?;
        registry.add(driver);
      }
    }

    let ctx = make_ctx(registry, &shells);
    info!(renderers = ctx.registry().len(), "renderers ready");

    // tools
    let mut tools: HashMap<ToolKey, Tool> = HashMap::new();
    if let Some(tools_doc) = node.take("tools") {
      let DocValue::Node(mut kinds) = tools_doc else {
        return Err(ConfigError::Decode {
          what: "tools".to_owned(),
          message: "tools must be a mapping of kind to tool list".to_owned(),
        });
      };

      let kind_names: Vec<String> = kinds.entries().map(|(k, _)| k.to_owned()).collect();
      for kind in kind_names {
        let mut list_doc = kinds.take(&kind).expect("listed above");
        list_doc.resolve(&ctx, -1).await?;
        let entries: Vec<ToolEntry> = list_doc.decode().map_err(|e| ConfigError::Decode {
          what: format!("tools.{kind}"),
          message: e.to_string(),
        })?;

        for (index, entry) in entries.into_iter().enumerate() {
          if entry.name.is_empty() {
            return Err(ConfigError::UnnamedTool {
              kind: kind.clone(),
              index,
            });
          }

          let tool = Tool::new(
            kind.clone(),
            entry.name.clone(),
            entry.cmd,
            entry.env.into_iter().map(|e| (e.name, e.value)).collect(),
          )
          .with_shell(entry.use_shell, entry.shell_name)
          .with_cache_dir(entry.cache_dir);
          let key = tool.key();
          if tools.insert(key, tool).is_some() {
            return Err(ConfigError::DuplicateTool {
              kind: kind.clone(),
              name: entry.name,
            });
          }
        }
      }
    }

    // every remaining top-level key is a task section
    group_tasks(&ctx, node, &mut tools).await?;

    let tools: HashMap<ToolKey, Arc<Tool>> = tools
      .into_iter()
      .map(|(k, v)| (k, Arc::new(v)))
      .collect();

    info!(tools = tools.len(), "configuration resolved");
    Ok(Loaded {
      render: ctx,
      tools,
    })
  }
}

fn essential_registry() -> Registry {
  let mut registry = Registry::new();
  registry.add(Arc::new(Env::default()));
  registry.add(Arc::new(Template::default()));
  registry.add(Arc::new(File::default()));
  registry.add(Arc::new(Shell::new_embedded()));
  registry
}

/// Build a user-declared renderer: the driver is picked by the name's
/// prefix (`http`, `http:internal`, ...).
fn build_renderer(
  name: &str,
  spec: serde_yaml::Value,
  cache_root: &Path,
) -> Result<Arc<dyn Renderer>, ConfigError> {
  fn decode<T: serde::de::DeserializeOwned + Default>(
    name: &str,
    spec: serde_yaml::Value,
  ) -> Result<T, ConfigError> {
    if spec.is_null() {
      return Ok(T::default());
    }
    serde_yaml::from_value(spec).map_err(|e| ConfigError::Decode {
      what: format!("renderer '{name}'"),
      message: e.to_string(),
    })
  }

  let prefix = name.split(':').next().unwrap_or(name);
  let driver: Arc<dyn Renderer> = match prefix {
    "echo" => Arc::new(Echo::new(name)),
    "env" => Arc::new(Env::new(name, decode(name, spec)?)),
    "template" => Arc::new(Template::new(name)),
    "file" => Arc::new(File::new(name)),
    "shell" => match name.split_once(':') {
      Some((_, shell_name)) => Arc::new(Shell::new_external(shell_name)),
      None => Arc::new(Shell::new_embedded()),
    },
    "http" => Arc::new(Http::new(name, decode(name, spec)?, cache_root)),
    "git" => Arc::new(Git::new(name, decode(name, spec)?, cache_root)),
    "af" | "archivefile" => Arc::new(ArchiveFile::new(name)),
    "transform" => Arc::new(Transform::new(name)),
    _ => {
      return Err(ConfigError::UnknownRendererKind {
        name: name.to_owned(),
      })
    }
  };

  Ok(driver)
}

/// Group the remaining top-level `<toolKind>:<toolName>:<taskKind>` keys
/// into their tools.
async fn group_tasks(
  ctx: &RenderContext,
  mut node: banyan_field::DocNode,
  tools: &mut HashMap<ToolKey, Tool>,
) -> Result<(), ConfigError> {
  let registry = TaskRegistry::with_defaults();

  let keys: Vec<String> = node.entries().map(|(k, _)| k.to_owned()).collect();
  for key in keys {
    let (tool_kind, tool_name, task_kind) = parse_task_key(&key)?;
    let list_doc = node.take(&key).expect("listed above");

    let DocValue::Seq(task_docs) = list_doc else {
      return Err(ConfigError::Decode {
        what: format!("tasks '{key}'"),
        message: "expecting a list of tasks".to_owned(),
      });
    };

    for task_doc in task_docs {
      let doc = TaskDoc::new(task_doc);

      // only the name resolves now; the body stays lazy until execution
      let name: String = doc.section(ctx, "name").await?.unwrap_or_default();
      if name.is_empty() {
        return Err(ConfigError::Decode {
          what: format!("tasks '{key}'"),
          message: "task without name".to_owned(),
        });
      }

      let task = registry
        .create(&tool_kind, &task_kind, name, doc)
        .ok_or_else(|| ConfigError::UnknownTaskKind { key: key.clone() })?;

      if tool_name.is_empty() {
        // tool-agnostic: attach to every tool of the kind
        for tool in tools.values_mut().filter(|t| t.kind() == tool_kind) {
          tool.add_task(task.clone());
        }
      } else {
        let tool_key = ToolKey {
          kind: tool_kind.clone(),
          name: tool_name.clone(),
        };
        let tool = tools
          .get_mut(&tool_key)
          .ok_or_else(|| ConfigError::UnknownTaskTool {
            key: key.clone(),
            tool: tool_key.to_string(),
          })?;
        tool.add_task(task);
      }
    }
  }

  Ok(())
}

fn parse_task_key(key: &str) -> Result<(String, String, String), ConfigError> {
  let parts: Vec<&str> = key.split(':').collect();
  let (kind, name, task_kind) = match parts.as_slice() {
    [kind, task_kind] => (*kind, "", *task_kind),
    [kind, name, task_kind] => (*kind, *name, *task_kind),
    _ => {
      return Err(ConfigError::BadTaskKey {
        key: key.to_owned(),
      })
    }
  };

  if kind.is_empty() || task_kind.is_empty() {
    return Err(ConfigError::BadTaskKey {
      key: key.to_owned(),
    });
  }

  Ok((kind.to_owned(), name.to_owned(), task_kind.to_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn task_keys_parse() {
    assert_eq!(
      parse_task_key("docker:registry:push").unwrap(),
      ("docker".into(), "registry".into(), "push".into())
    );
    assert_eq!(
      parse_task_key("workflow::run").unwrap(),
      ("workflow".into(), "".into(), "run".into())
    );
    assert_eq!(
      parse_task_key("git:clone").unwrap(),
      ("git".into(), "".into(), "clone".into())
    );
    assert!(parse_task_key("justakey").is_err());
    assert!(parse_task_key(":x:y").is_err());
  }
}
