//! Template expansion renderer backed by minijinja.

use std::collections::BTreeMap;

use async_trait::async_trait;
use banyan_field::RenderInput;
use minijinja::value::Value;
use minijinja::{Environment, Error, ErrorKind};

use crate::{RenderContext, RenderError, Renderer};

pub const DEFAULT_NAME: &str = "template";

/// Renders its input as a template against the context environment and the
/// bound matrix entry.
///
/// Exposed state: `env` (map), `matrix` (map). Functions: `env(name)`,
/// `image_tag()`. Filters: `from_yaml`, `to_yaml`, `to_json`; `from_yaml`
/// is the gateway back into structured data.
pub struct Template {
  name: String,
}

impl Template {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

impl Default for Template {
  fn default() -> Self {
    Self::new(DEFAULT_NAME)
  }
}

#[async_trait]
impl Renderer for Template {
  fn name(&self) -> &str {
    &self.name
  }

  async fn render_yaml(
    &self,
    ctx: &RenderContext,
    input: RenderInput,
    _attributes: &[String],
  ) -> Result<Vec<u8>, RenderError> {
    let bytes = input.to_yaml_bytes().map_err(|e| RenderError::Input {
      renderer: self.name.clone(),
      message: e.to_string(),
    })?;
    let source = String::from_utf8(bytes).map_err(|_| RenderError::Input {
      renderer: self.name.clone(),
      message: "template source is not utf-8".to_owned(),
    })?;

    let rendered = render_str(ctx, &source, None).map_err(|source| RenderError::Template {
      renderer: self.name.clone(),
      source,
    })?;

    Ok(rendered.into_bytes())
  }
}

/// Render one template string against the context.
///
/// `value` binds the `value` template variable (used by the transform
/// pipeline to pass the current payload along).
pub(crate) fn render_str(
  ctx: &RenderContext,
  source: &str,
  value: Option<&str>,
) -> Result<String, Error> {
  let mut env = Environment::new();

  let env_map: BTreeMap<String, String> = ctx
    .env_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
  let matrix_map: BTreeMap<String, String> = ctx
    .matrix_entry()
    .iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();

  let env_for_fn = env_map.clone();
  env.add_function("env", move |name: &str| -> Value {
    Value::from(env_for_fn.get(name).cloned().unwrap_or_default())
  });

  let env_for_tag = env_map.clone();
  let arch = ctx.matrix_entry().arch().map(str::to_owned);
  env.add_function("image_tag", move || -> Value {
    Value::from(image_tag(&env_for_tag, arch.as_deref()))
  });

  env.add_filter("from_yaml", |text: &str| -> Result<Value, Error> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(text)
      .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    Ok(Value::from_serialize(&parsed))
  });

  env.add_filter("to_yaml", |v: Value| -> Result<String, Error> {
    serde_yaml::to_string(&v).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
  });

  env.add_filter("to_json", |v: Value| -> Result<String, Error> {
    serde_json::to_string(&v).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
  });

  let template_ctx = minijinja::context! {
    value => value,
    env => env_map,
    matrix => matrix_map,
  };

  env.render_str(source, template_ctx)
}

/// The default image tag for the given context: see [`image_tag`].
pub fn default_image_tag(ctx: &RenderContext, with_arch: bool) -> String {
  let env: BTreeMap<String, String> = ctx
    .env_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
  let arch = if with_arch {
    ctx.matrix_entry().arch()
  } else {
    None
  };
  image_tag(&env, arch)
}

/// Image tag derived from the probed git state: the tag when on a tag,
/// `latest` on the default branch, `dev-<branch>` elsewhere; the matrix
/// arch is appended when one is bound.
fn image_tag(env: &BTreeMap<String, String>, arch: Option<&str>) -> String {
  let get = |name: &str| env.get(name).map(String::as_str).unwrap_or("");

  let base = {
    let tag = get("GIT_TAG");
    if !tag.is_empty() {
      tag.to_owned()
    } else {
      let branch = get("GIT_BRANCH");
      if !branch.is_empty() && branch == get("GIT_DEFAULT_BRANCH") {
        "latest".to_owned()
      } else if branch.is_empty() {
        "latest".to_owned()
      } else {
        format!("dev-{}", branch.replace('/', "-"))
      }
    }
  };

  match arch {
    Some(arch) if !arch.is_empty() => format!("{base}-{arch}"),
    _ => base,
  }
}
