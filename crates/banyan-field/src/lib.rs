//! Two-phase structured document model with renderer-driven lazy resolution.
//!
//! Configuration documents are decoded in two phases. `DocValue::from_yaml`
//! walks a raw YAML tree and splits every mapping key into either a directly
//! decoded value or an *unresolved* entry (`key@renderer1|renderer2!:`) whose
//! raw subtree is held back for rendering. `DocValue::resolve` later drives
//! the recorded renderer chains through a [`RenderingHandler`] and merges the
//! rendered results into the tree, after which the tree can be decoded into
//! typed structures with `DocValue::decode`.
//!
//! Resolution is monotonic: entries only ever move from unresolved to
//! resolved, and resolving an already-resolved tree is a no-op.

mod doc;
mod error;
mod merge;
mod patch;
mod render;
mod suffix;
mod value;

pub use doc::{DocNode, DocValue, UnresolvedField, UnresolvedKey};
pub use error::FieldError;
pub use merge::{merge_map, merge_value, unique_list, MergeOpts};
pub use patch::{JsonPatchOp, MergeSource, PatchSpec};
pub use render::{DynError, RenderInput, RenderingHandler};
pub use suffix::{parse_key, ParsedKey, RendererStep};
pub use value::{to_yaml_bytes, yaml_to_json, json_to_yaml};
