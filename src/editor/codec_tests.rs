use serde_json::json;

use super::*;
use crate::editor::state::Point;

const LEXICAL_RECIPE: &str = r#"{
  "root": {
    "children": [
      {
        "children": [
          {"detail": 0, "format": 1, "mode": "normal", "style": "", "text": "Knead", "type": "text", "version": 1},
          {"detail": 0, "format": 0, "mode": "normal", "style": "", "text": " for ten minutes", "type": "text", "version": 1}
        ],
        "direction": "ltr", "format": "", "indent": 0, "type": "paragraph", "version": 1,
        "textFormat": 1
      },
      {"type": "horizontalrule", "version": 1},
      {
        "children": [
          {"children": [{"text": "flour", "type": "text", "format": 0}], "type": "listitem", "value": 1, "indent": 0},
          {"children": [{"text": "water", "type": "text"}], "type": "listitem", "value": 2}
        ],
        "listType": "number", "start": 1, "tag": "ol", "type": "list", "version": 1
      },
      {"children": [{"text": "Rest", "type": "text"}], "tag": "h2", "type": "heading", "version": 1}
    ],
    "direction": "ltr", "format": "", "indent": 0, "type": "root", "version": 1
  }
}"#;

#[test]
fn decodes_lexical_output_ignoring_unknown_fields() {
    let snapshot = Snapshot::from_json(LEXICAL_RECIPE).unwrap();
    let state = decode(&snapshot, &KindSet::all()).unwrap();
    assert_eq!(
        state.outline(),
        "root[p[\"Knead\"/1, \" for ten minutes\"], hr, ol[li[\"flour\"], li[\"water\"]], h2[\"Rest\"]]"
    );
}

#[test]
fn decode_places_caret_at_document_start() {
    let snapshot = Snapshot::from_json(LEXICAL_RECIPE).unwrap();
    let state = decode(&snapshot, &KindSet::all()).unwrap();
    let first_block = state.text_blocks()[0];
    let first_run = state.children(first_block)[0];
    assert_eq!(state.caret(), Some(Point::new(first_run, 0)));
}

#[test]
fn round_trip_preserves_structure() {
    let snapshot = Snapshot::from_json(LEXICAL_RECIPE).unwrap();
    let state = decode(&snapshot, &KindSet::all()).unwrap();
    let again = decode(&encode(&state), &KindSet::all()).unwrap();
    assert!(state.structurally_eq(&again));
    assert_eq!(encode(&state), encode(&again));
}

#[test]
fn empty_root_is_a_valid_document() {
    let snapshot = Snapshot::from_value(json!({"root": {"type": "root", "children": []}})).unwrap();
    let state = decode(&snapshot, &KindSet::all()).unwrap();
    assert!(state.is_empty());
    assert_eq!(state.caret(), Some(Point::new(state.root(), 0)));
}

#[test]
fn encode_emits_lexical_shape() {
    let snapshot = Snapshot::from_json(LEXICAL_RECIPE).unwrap();
    let state = decode(&snapshot, &KindSet::all()).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&encode(&state).to_json().unwrap()).unwrap();
    let children = &value["root"]["children"];
    assert_eq!(value["root"]["type"], "root");
    assert_eq!(children[0]["type"], "paragraph");
    assert_eq!(children[0]["children"][0]["format"], 1);
    assert_eq!(children[0]["children"][0]["mode"], "normal");
    assert_eq!(children[1]["type"], "horizontalrule");
    assert_eq!(children[2]["listType"], "number");
    assert_eq!(children[2]["tag"], "ol");
    assert_eq!(children[2]["children"][1]["value"], 2);
    assert_eq!(children[3]["tag"], "h2");
}

fn assert_malformed(value: serde_json::Value) {
    let result = Snapshot::from_value(value).and_then(|snapshot| decode(&snapshot, &KindSet::all()));
    assert!(
        matches!(result, Err(EditorError::MalformedSnapshot(_))),
        "expected malformed snapshot, got {:?}",
        result.map(|state| state.outline())
    );
}

#[test]
fn text_directly_under_root_is_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [{"type": "text", "text": "loose"}]}}));
}

#[test]
fn unknown_node_type_is_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [{"type": "table", "children": []}]}}));
}

#[test]
fn heading_tag_out_of_range_is_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [{"type": "heading", "tag": "h7"}]}}));
}

#[test]
fn checklists_are_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [{"type": "list", "listType": "check"}]}}));
}

#[test]
fn nested_root_is_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [{"type": "root"}]}}));
}

#[test]
fn top_level_must_be_root() {
    assert_malformed(json!({"root": {"type": "paragraph", "children": []}}));
}

#[test]
fn invalid_json_is_malformed() {
    assert!(matches!(
        Snapshot::from_json("{\"root\": "),
        Err(EditorError::MalformedSnapshot(_))
    ));
}

#[test]
fn unregistered_kind_is_malformed() {
    let kinds = KindSet::new([NodeKind::Root, NodeKind::Paragraph, NodeKind::Text]);
    let snapshot = Snapshot::from_json(LEXICAL_RECIPE).unwrap();
    assert!(matches!(
        decode(&snapshot, &kinds),
        Err(EditorError::MalformedSnapshot(_))
    ));
}

#[test]
fn text_with_nested_children_is_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [
        {"type": "paragraph", "children": [
            {"type": "text", "text": "a", "children": [{"type": "text", "text": "hidden"}]}
        ]}
    ]}}));
}

#[test]
fn rule_with_nested_children_is_malformed() {
    assert_malformed(json!({"root": {"type": "root", "children": [
        {"type": "horizontalrule", "children": [{"type": "paragraph"}]}
    ]}}));
}

#[test]
fn leaves_with_empty_children_still_decode() {
    let snapshot = Snapshot::from_value(json!({"root": {"type": "root", "children": [
        {"type": "paragraph", "children": [{"type": "text", "text": "a", "children": []}]},
        {"type": "horizontalrule", "children": []}
    ]}}))
    .unwrap();
    let state = decode(&snapshot, &KindSet::all()).unwrap();
    assert_eq!(state.outline(), "root[p[\"a\"], hr]");
    let value = serde_json::to_value(encode(&state)).unwrap();
    assert!(value["root"]["children"][1].get("children").is_none());
}
