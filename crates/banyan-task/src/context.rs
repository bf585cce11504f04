//! The task execution context.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use banyan_matrix::MatrixFilter;
use banyan_render::RenderContext;
use tokio_util::sync::CancellationToken;

use crate::tool::{Tool, ToolKey};

/// Run-wide state shared by all context clones: the frozen tool map and the
/// exec-id source.
pub struct RunState {
  invocation_id: String,
  tools: HashMap<ToolKey, Arc<Tool>>,
  next_exec_id: AtomicU64,
}

impl RunState {
  pub fn new(tools: HashMap<ToolKey, Arc<Tool>>) -> Self {
    Self {
      invocation_id: uuid::Uuid::new_v4().to_string(),
      tools,
      next_exec_id: AtomicU64::new(1),
    }
  }

  /// Opaque id of this process's invocation, for log correlation.
  pub fn invocation_id(&self) -> &str {
    &self.invocation_id
  }

  pub fn get_tool(&self, key: &ToolKey) -> Option<Arc<Tool>> {
    self.tools.get(key).cloned()
  }

  pub fn next_exec_id(&self) -> u64 {
    self.next_exec_id.fetch_add(1, Ordering::Relaxed)
  }
}

/// Context of one task invocation.
///
/// Clones are cheap; the rendering context and matrix filter are per-clone
/// so nested invocations and matrix entries carry their own view.
#[derive(Clone)]
pub struct TaskContext {
  render: RenderContext,
  cancel: CancellationToken,
  state: Arc<RunState>,
  filter: MatrixFilter,
  depth: usize,
}

impl TaskContext {
  pub fn new(render: RenderContext, state: Arc<RunState>, cancel: CancellationToken) -> Self {
    Self {
      render,
      cancel,
      state,
      filter: MatrixFilter::default(),
      depth: 0,
    }
  }

  pub fn render(&self) -> &RenderContext {
    &self.render
  }

  pub fn cancel(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn state(&self) -> &Arc<RunState> {
    &self.state
  }

  pub fn matrix_filter(&self) -> &MatrixFilter {
    &self.filter
  }

  pub fn depth(&self) -> usize {
    self.depth
  }

  pub fn with_render(&self, render: RenderContext) -> Self {
    let mut out = self.clone();
    out.render = render;
    out
  }

  pub fn with_matrix_filter(&self, filter: MatrixFilter) -> Self {
    let mut out = self.clone();
    out.filter = filter;
    out
  }

  /// A clone one nesting level deeper (for `task:` hook recursion).
  pub fn deeper(&self) -> Self {
    let mut out = self.clone();
    out.depth += 1;
    out
  }
}
