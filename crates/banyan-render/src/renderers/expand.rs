//! `$VAR` / `${VAR}` / `$(cmd)` expansion shared by the `env` driver.

use crate::renderers::shell::run_script;
use crate::{RenderContext, RenderError};

/// Expand environment references in `text`.
///
/// * `$NAME` and `${NAME}` substitute the context environment; unset names
///   expand to the empty string (POSIX behavior).
/// * `$$` escapes a literal `$`.
/// * `$(cmd)` runs through the script interpreter when `enable_exec` is set
///   and is kept verbatim otherwise.
/// * Backquoted text is never evaluated.
pub async fn expand_env(
  renderer: &str,
  ctx: &RenderContext,
  text: &str,
  enable_exec: bool,
) -> Result<String, RenderError> {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.char_indices().peekable();

  while let Some((idx, ch)) = chars.next() {
    if ch != '$' {
      out.push(ch);
      continue;
    }

    match chars.peek().map(|(_, c)| *c) {
      Some('$') => {
        chars.next();
        out.push('$');
      }
      Some('{') => {
        chars.next();
        let mut name = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '}' {
            closed = true;
            break;
          }
          name.push(c);
        }
        if !closed {
          return Err(RenderError::Input {
            renderer: renderer.to_owned(),
            message: format!("unclosed '${{' at byte {idx}"),
          });
        }
        out.push_str(ctx.get_env(&name).unwrap_or(""));
      }
      Some('(') => {
        chars.next();
        let mut script = String::new();
        let mut depth = 1usize;
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          match c {
            '(' => depth += 1,
            ')' => {
              depth -= 1;
              if depth == 0 {
                closed = true;
                break;
              }
            }
            _ => {}
          }
          script.push(c);
        }
        if !closed {
          return Err(RenderError::Input {
            renderer: renderer.to_owned(),
            message: format!("unclosed '$(' at byte {idx}"),
          });
        }

        if enable_exec {
          let output = run_script(renderer, ctx, ctx.script_cmd(), &[], &script).await?;
          let text = String::from_utf8_lossy(&output);
          out.push_str(text.trim_end_matches('\n'));
        } else {
          out.push_str("$(");
          out.push_str(&script);
          out.push(')');
        }
      }
      Some(c) if c.is_ascii_alphabetic() || c == '_' => {
        let mut name = String::new();
        while let Some((_, c)) = chars.peek() {
          if c.is_ascii_alphanumeric() || *c == '_' {
            name.push(*c);
            chars.next();
          } else {
            break;
          }
        }
        out.push_str(ctx.get_env(&name).unwrap_or(""));
      }
      _ => out.push('$'),
    }
  }

  Ok(out)
}
