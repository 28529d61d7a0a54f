//! Workspace API request bodies and the spec hashes derived from them.

use std::collections::BTreeMap;

use ns_blueprint::{BlockKind, BlockSpec, DatabaseSpec, PropertyValue, RowPropertySpec, SpecHash};
use ns_state::{StateResult, StateStore};
use serde_json::{Map, Value, json};

use crate::resolver::Segment;

/// Single plain-text rich text run.
pub fn rich_text(text: &str) -> Value {
    json!([{ "type": "text", "text": { "content": text } }])
}

pub fn segments_to_rich_text(segments: &[Segment]) -> Value {
    Value::Array(
        segments
            .iter()
            .map(|segment| match segment {
                Segment::Text(content) => json!({ "type": "text", "text": { "content": content } }),
                Segment::PageMention { remote_id } => json!({
                    "type": "mention",
                    "mention": { "type": "page", "page": { "id": remote_id } }
                }),
                Segment::UserMention { user_id } => json!({
                    "type": "mention",
                    "mention": { "type": "user", "user": { "id": user_id } }
                }),
            })
            .collect(),
    )
}

pub fn block_payload(block: &BlockSpec, rich_text: Value) -> Value {
    let kind = block.kind.as_str();
    let body = match block.kind {
        BlockKind::Divider => json!({}),
        BlockKind::ToDo => json!({
            "rich_text": rich_text,
            "checked": block.checked.unwrap_or(false),
        }),
        _ => json!({ "rich_text": rich_text }),
    };
    let mut payload = Map::new();
    payload.insert("object".into(), json!("block"));
    payload.insert("type".into(), json!(kind));
    payload.insert(kind.into(), body);
    Value::Object(payload)
}

pub fn paragraph_block(text: &str) -> Value {
    block_payload(&BlockSpec::paragraph(text), rich_text(text))
}

pub fn page_payload(parent_id: &str, title: &str, blocks: &[Value]) -> Value {
    json!({
        "parent": { "type": "page_id", "page_id": parent_id },
        "properties": { "title": { "title": rich_text(title) } },
        "children": blocks,
    })
}

/// Title-only patch; block content is replaced separately.
pub fn page_title_patch(title: &str) -> Value {
    json!({ "properties": { "title": { "title": rich_text(title) } } })
}

/// Pages hash their title and resolved blocks, never their parent.
pub fn page_spec_hash(title: &str, blocks: &[Value]) -> Result<SpecHash, serde_json::Error> {
    SpecHash::of_json(&json!({ "title": title, "children": blocks }))
}

pub fn database_payload(parent_id: &str, spec: &DatabaseSpec) -> Value {
    json!({
        "parent": { "type": "page_id", "page_id": parent_id },
        "title": rich_text(&spec.title),
        "properties": spec.properties,
    })
}

pub fn database_patch(spec: &DatabaseSpec) -> Value {
    json!({
        "title": rich_text(&spec.title),
        "properties": spec.properties,
    })
}

/// Row property values. People without a workspace user id are dropped.
pub fn row_properties(
    properties: &[RowPropertySpec],
    store: &StateStore,
) -> StateResult<Map<String, Value>> {
    let mut resolved = Map::new();
    for property in properties {
        let value = match &property.value {
            PropertyValue::Title(text) => json!({ "title": rich_text(text) }),
            PropertyValue::RichText(text) => json!({ "rich_text": rich_text(text) }),
            PropertyValue::Select(name) => json!({ "select": { "name": name } }),
            PropertyValue::MultiSelect(names) => json!({
                "multi_select": names.iter().map(|name| json!({ "name": name })).collect::<Vec<_>>()
            }),
            PropertyValue::People(synth_user_ids) => {
                let mut people = Vec::new();
                for synth_user_id in synth_user_ids {
                    if let Some(user_id) = store.workspace_user_of(synth_user_id)? {
                        people.push(json!({ "id": user_id }));
                    }
                }
                json!({ "people": people })
            }
            PropertyValue::Date(start) => json!({ "date": { "start": start } }),
            PropertyValue::Checkbox(checked) => json!({ "checkbox": checked }),
            PropertyValue::Number(number) => json!({ "number": number }),
            PropertyValue::Url(url) => json!({ "url": url }),
        };
        resolved.insert(property.name.clone(), value);
    }
    Ok(resolved)
}

pub fn row_payload(database_remote_id: &str, properties: &Map<String, Value>) -> Value {
    json!({
        "parent": { "database_id": database_remote_id },
        "properties": properties,
    })
}

pub fn row_patch(properties: &Map<String, Value>) -> Value {
    json!({ "properties": properties })
}

/// Patch for the activity `row_update` event: every value is a select option.
pub fn select_patch(selects: &BTreeMap<String, String>) -> Value {
    let properties: Map<String, Value> = selects
        .iter()
        .map(|(name, option)| (name.clone(), json!({ "select": { "name": option } })))
        .collect();
    json!({ "properties": properties })
}

pub fn comment_payload(page_remote_id: &str, rich_text: Value) -> Value {
    json!({
        "parent": { "page_id": page_remote_id },
        "rich_text": rich_text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ns_state::IdentityUpdate;

    #[test]
    fn block_shapes_follow_their_kind() {
        let divider = BlockSpec {
            kind: BlockKind::Divider,
            text: None,
            checked: None,
        };
        assert_eq!(
            block_payload(&divider, json!([])),
            json!({"object": "block", "type": "divider", "divider": {}})
        );

        let todo = BlockSpec {
            kind: BlockKind::ToDo,
            text: Some("ship".into()),
            checked: Some(true),
        };
        assert_eq!(
            block_payload(&todo, rich_text("ship")),
            json!({"object": "block", "type": "to_do",
                   "to_do": {"rich_text": [{"type": "text", "text": {"content": "ship"}}], "checked": true}})
        );

        assert_eq!(
            paragraph_block("hi")["paragraph"]["rich_text"][0]["text"]["content"],
            json!("hi")
        );
    }

    #[test]
    fn page_hash_ignores_parent_and_tracks_content() {
        let blocks = vec![paragraph_block("one")];
        let a = page_spec_hash("Title", &blocks).expect("hash");
        assert_eq!(a, page_spec_hash("Title", &blocks).expect("hash"));
        assert_ne!(a, page_spec_hash("Other", &blocks).expect("hash"));
        assert_ne!(a, page_spec_hash("Title", &[paragraph_block("two")]).expect("hash"));
    }

    #[test]
    fn row_properties_drop_unmapped_people() {
        let store = StateStore::open_in_memory().expect("store");
        store
            .upsert_identity(
                "user_1",
                &IdentityUpdate {
                    notion_user_id: Some("nu-1".into()),
                    ..IdentityUpdate::default()
                },
            )
            .expect("identity");

        let props = vec![
            RowPropertySpec {
                name: "Owner".into(),
                value: PropertyValue::People(vec!["user_1".into(), "user_404".into()]),
            },
            RowPropertySpec {
                name: "Tags".into(),
                value: PropertyValue::MultiSelect(vec!["a".into(), "b".into()]),
            },
            RowPropertySpec {
                name: "Estimate".into(),
                value: PropertyValue::Number(None),
            },
        ];
        let resolved = row_properties(&props, &store).expect("resolve");
        assert_eq!(resolved["Owner"], json!({"people": [{"id": "nu-1"}]}));
        assert_eq!(
            resolved["Tags"],
            json!({"multi_select": [{"name": "a"}, {"name": "b"}]})
        );
        assert_eq!(resolved["Estimate"], json!({"number": null}));
    }

    #[test]
    fn mention_segments_render_as_mentions() {
        let rich = segments_to_rich_text(&[
            Segment::Text("cc ".into()),
            Segment::UserMention {
                user_id: "notionuser_42".into(),
            },
        ]);
        assert_eq!(
            rich[1],
            json!({"type": "mention", "mention": {"type": "user", "user": {"id": "notionuser_42"}}})
        );
    }
}
