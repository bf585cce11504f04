//! End-to-end resolution tests against a scripted rendering handler.

use async_trait::async_trait;
use banyan_field::{DocValue, DynError, RenderInput, RenderingHandler};
use serde_yaml::Value;

/// A handler with just enough behavior to exercise the engine:
///
/// * `echo`: identity
/// * `upper`: uppercases scalar text
/// * `env`: replaces `$NAME` tokens with canned values
/// * `fail`: always errors
struct Script;

#[async_trait]
impl RenderingHandler for Script {
  async fn render_yaml(
    &self,
    renderer: &str,
    _attributes: &[String],
    input: RenderInput,
  ) -> Result<Vec<u8>, DynError> {
    let bytes = input.to_yaml_bytes()?;
    match renderer {
      "echo" => Ok(bytes),
      "upper" => Ok(String::from_utf8(bytes)?.to_uppercase().into_bytes()),
      "env" => {
        let text = String::from_utf8(bytes)?
          .replace("$GREETING", "hello")
          .replace("$TARGET", "world");
        Ok(text.into_bytes())
      }
      "fail" => Err("scripted failure".into()),
      other => Err(format!("renderer '{other}' not found").into()),
    }
  }
}

fn yaml(text: &str) -> Value {
  serde_yaml::from_str(text).unwrap()
}

#[tokio::test]
async fn bare_documents_resolve_to_themselves() {
  let mut doc = DocValue::from_yaml_str("a: 1\nb: [x, y]").unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("a: 1\nb: [x, y]"));
}

#[tokio::test]
async fn echo_chain_equals_direct_decode() {
  let mut direct = DocValue::from_yaml_str("x: {a: 1}").unwrap();
  direct.resolve(&Script, -1).await.unwrap();

  for key in ["x@echo", "x@echo|echo|echo"] {
    let mut doc = DocValue::from_yaml_str(&format!("{key}: {{a: 1}}")).unwrap();
    doc.resolve(&Script, -1).await.unwrap();
    assert_eq!(doc.to_value().unwrap(), direct.to_value().unwrap());
  }
}

#[tokio::test]
async fn chain_applies_left_to_right() {
  let mut doc = DocValue::from_yaml_str("x@env|upper: $GREETING").unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: HELLO"));
}

#[tokio::test]
async fn resolution_is_idempotent() {
  let mut doc = DocValue::from_yaml_str("x@env: $GREETING\ny: plain").unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert!(!doc.has_unresolved());
  let first = doc.to_value().unwrap();

  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), first);
}

#[tokio::test]
async fn depth_zero_is_a_noop_and_depth_limits_recursion() {
  let mut doc = DocValue::from_yaml_str("outer:\n  inner@env: $TARGET").unwrap();

  doc.resolve(&Script, 0).await.unwrap();
  assert!(doc.has_unresolved());

  // depth 1 touches the top-level slots only; `inner` sits one level down
  doc.resolve(&Script, 1).await.unwrap();
  assert!(doc.has_unresolved());

  doc.resolve(&Script, 2).await.unwrap();
  assert!(!doc.has_unresolved());
  assert_eq!(doc.to_value().unwrap(), yaml("outer: {inner: world}"));
}

#[tokio::test]
async fn rendered_output_may_itself_carry_suffixes() {
  let mut doc = DocValue::from_yaml_str("x@echo: {\"nested@env\": $TARGET}").unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: {nested: world}"));
}

#[tokio::test]
async fn accumulated_raws_merge_in_input_order() {
  let mut a = DocValue::from_yaml_str("env@echo: [first]").unwrap();
  let b = DocValue::from_yaml_str("env@echo: [second]").unwrap();
  a.merge_sibling(b).unwrap();

  a.resolve(&Script, -1).await.unwrap();
  assert_eq!(a.to_value().unwrap(), yaml("env: [first, second]"));
}

#[tokio::test]
async fn distinct_suffixes_for_one_key_both_apply() {
  let mut doc = DocValue::from_yaml_str("x@echo: {a: 1}\n\"x@env\": {b: $TARGET}").unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: {a: 1, b: world}"));
}

#[tokio::test]
async fn terminal_patch_applies_to_rendered_output() {
  let mut doc = DocValue::from_yaml_str(
    "x@env!:\n  value: \"tag: $GREETING\"\n  patches:\n  - op: replace\n    path: /tag\n    value: v1\n",
  )
  .unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: {tag: v1}"));
}

#[tokio::test]
async fn patch_merge_combines_with_rendered_value() {
  let mut doc = DocValue::from_yaml_str(
    "x@echo!:\n  value: {a: 1}\n  merge:\n  - data: {b: 2}\n",
  )
  .unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: {a: 1, b: 2}"));
}

#[tokio::test]
async fn mid_chain_patch_feeds_next_renderer() {
  // the first step's patch replaces the payload with its value before
  // `upper` runs; `echo` then passes the uppercased text through
  let mut doc = DocValue::from_yaml_str("x@upper!|echo:\n  value: quiet\n").unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: QUIET"));
}

#[tokio::test]
async fn patch_spec_fields_resolve_before_use() {
  let mut doc = DocValue::from_yaml_str(
    "x@echo!:\n  \"value@env\": $GREETING\n  merge: []\n",
  )
  .unwrap();
  doc.resolve(&Script, -1).await.unwrap();
  assert_eq!(doc.to_value().unwrap(), yaml("x: hello"));
}

#[tokio::test]
async fn renderer_errors_carry_identity() {
  let mut doc = DocValue::from_yaml_str("broken@fail: anything").unwrap();
  let err = doc.resolve(&Script, -1).await.unwrap_err();
  let text = err.to_string();
  assert!(text.contains("fail"), "unexpected error: {text}");
  assert!(text.contains("broken"), "unexpected error: {text}");
}

#[tokio::test]
async fn unknown_renderer_fails() {
  let mut doc = DocValue::from_yaml_str("x@nope: 1").unwrap();
  assert!(doc.resolve(&Script, -1).await.is_err());
}

#[tokio::test]
async fn round_trip_of_resolved_tree() {
  let mut doc = DocValue::from_yaml_str("x@env: $TARGET\nplain: [1, 2]").unwrap();
  doc.resolve(&Script, -1).await.unwrap();

  let text = serde_yaml::to_string(&doc.to_value().unwrap()).unwrap();
  let mut reparsed = DocValue::from_yaml_str(&text).unwrap();
  reparsed.resolve(&Script, -1).await.unwrap();

  assert_eq!(reparsed.to_value().unwrap(), doc.to_value().unwrap());
}

#[tokio::test]
async fn resolved_clone_leaves_original_pending() {
  let doc = DocValue::from_yaml_str("x@env: $TARGET").unwrap();
  let resolved = doc.resolved_clone(&Script, -1).await.unwrap();

  assert!(doc.has_unresolved());
  assert_eq!(resolved.to_value().unwrap(), yaml("x: world"));
}

#[tokio::test]
async fn restricted_resolve_touches_named_fields_only() {
  let mut doc = DocValue::from_yaml_str("name@env: $GREETING\nbody@env: $TARGET").unwrap();
  let DocValue::Node(node) = &mut doc else {
    panic!()
  };

  node
    .resolve_fields(&Script, -1, Some(&["name"][..]))
    .await
    .unwrap();
  assert_eq!(
    node.get("name").unwrap().to_value().unwrap(),
    yaml("hello")
  );
  assert!(node.unresolved_keys().any(|k| k.key == "body"));
}
