use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::ActivityEvent;
use crate::error::BlueprintError;

/// Only blueprint format understood by this crate.
pub const FORMAT_VERSION: u32 = 1;

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

/// Declarative plan of entities and scheduled events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub org_profile: String,
    #[serde(default)]
    pub identity: IdentitySpec,
    #[serde(rename = "notion_plan", default)]
    pub plan: WorkspacePlan,
    #[serde(default)]
    pub activity_stream: Vec<ActivityEvent>,
}

impl Default for Blueprint {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            generated_at: String::new(),
            seed: 0,
            company: String::new(),
            org_profile: String::new(),
            identity: IdentitySpec::default(),
            plan: WorkspacePlan::default(),
            activity_stream: Vec::new(),
        }
    }
}

/// Entity collections, in the order they are reconciled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspacePlan {
    #[serde(default)]
    pub roots: Vec<RootSpec>,
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
    #[serde(default)]
    pub pages: Vec<PageSpec>,
    #[serde(default)]
    pub rows: Vec<RowSpec>,
    #[serde(default)]
    pub comments: Vec<CommentSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySpec {
    #[serde(default)]
    pub users: Vec<IdentityUser>,
    #[serde(default)]
    pub groups: Vec<IdentityGroup>,
    #[serde(default)]
    pub memberships: Vec<GroupMembership>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub synth_user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub given_name: String,
    #[serde(default)]
    pub surname: String,
    #[serde(default)]
    pub upn: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub job_title: String,
    #[serde(default)]
    pub office_location: String,
    #[serde(default)]
    pub manager_synth_user_id: Option<String>,
    #[serde(default)]
    pub team: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityGroup {
    pub synth_group_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_synth_id: String,
    pub user_synth_id: String,
}

/// Remote object kinds tracked by the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Page,
    Database,
    Row,
    Comment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Page,
        EntityKind::Database,
        EntityKind::Row,
        EntityKind::Comment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Page => "page",
            EntityKind::Database => "database",
            EntityKind::Row => "row",
            EntityKind::Comment => "comment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = BlueprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page" => Ok(EntityKind::Page),
            "database" => Ok(EntityKind::Database),
            "row" => Ok(EntityKind::Row),
            "comment" => Ok(EntityKind::Comment),
            other => Err(BlueprintError::InvalidField {
                field: "kind",
                value: other.to_string(),
                reason: "unknown entity kind".into(),
            }),
        }
    }
}

/// Where a database or page hangs. `Root` anchors it directly under the
/// externally supplied root page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentKind {
    #[default]
    Root,
    Page,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSpec {
    pub synth_id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub synth_id: String,
    pub parent_synth_id: String,
    #[serde(default)]
    pub parent_type: ParentKind,
    pub title: String,
    /// Property name to property type descriptor, passed through verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpec {
    pub synth_id: String,
    pub parent_synth_id: String,
    #[serde(default)]
    pub parent_type: ParentKind,
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<BlockSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    #[serde(rename = "paragraph")]
    Paragraph,
    #[serde(rename = "heading_2")]
    Heading2,
    #[serde(rename = "heading_3")]
    Heading3,
    #[serde(rename = "bulleted_list_item")]
    BulletedListItem,
    #[serde(rename = "numbered_list_item")]
    NumberedListItem,
    #[serde(rename = "to_do")]
    ToDo,
    #[serde(rename = "quote")]
    Quote,
    #[serde(rename = "callout")]
    Callout,
    #[serde(rename = "divider")]
    Divider,
}

impl BlockKind {
    /// Wire name of the block type.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Heading2 => "heading_2",
            BlockKind::Heading3 => "heading_3",
            BlockKind::BulletedListItem => "bulleted_list_item",
            BlockKind::NumberedListItem => "numbered_list_item",
            BlockKind::ToDo => "to_do",
            BlockKind::Quote => "quote",
            BlockKind::Callout => "callout",
            BlockKind::Divider => "divider",
        }
    }
}

/// A content block. `text` may embed placeholder markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

impl BlockSpec {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: Some(text.into()),
            checked: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSpec {
    pub synth_id: String,
    pub database_synth_id: String,
    #[serde(default)]
    pub properties: Vec<RowPropertySpec>,
}

/// Typed row property value; the JSON shape is `{"name", "type", "value"}`.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Select(String),
    MultiSelect(Vec<String>),
    /// Synthetic user ids, resolved through the identity map at build time.
    People(Vec<String>),
    Date(String),
    Checkbox(bool),
    Number(Option<f64>),
    Url(String),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Title(_) => "title",
            PropertyValue::RichText(_) => "rich_text",
            PropertyValue::Select(_) => "select",
            PropertyValue::MultiSelect(_) => "multi_select",
            PropertyValue::People(_) => "people",
            PropertyValue::Date(_) => "date",
            PropertyValue::Checkbox(_) => "checkbox",
            PropertyValue::Number(_) => "number",
            PropertyValue::Url(_) => "url",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRowProperty", into = "RawRowProperty")]
pub struct RowPropertySpec {
    pub name: String,
    pub value: PropertyValue,
}

#[derive(Serialize, Deserialize)]
struct RawRowProperty {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Value,
}

impl TryFrom<RawRowProperty> for RowPropertySpec {
    type Error = BlueprintError;

    fn try_from(raw: RawRowProperty) -> Result<Self, Self::Error> {
        let invalid = |reason: &str| BlueprintError::InvalidField {
            field: "row property",
            value: raw.name.clone(),
            reason: reason.to_string(),
        };
        let value = match raw.kind.as_str() {
            "title" => PropertyValue::Title(scalar_text(&raw.value)),
            "rich_text" => PropertyValue::RichText(scalar_text(&raw.value)),
            "select" => PropertyValue::Select(scalar_text(&raw.value)),
            "date" => PropertyValue::Date(scalar_text(&raw.value)),
            "url" => PropertyValue::Url(scalar_text(&raw.value)),
            "multi_select" => PropertyValue::MultiSelect(
                text_list(&raw.value).ok_or_else(|| invalid("expected a list"))?,
            ),
            "people" => PropertyValue::People(
                text_list(&raw.value).ok_or_else(|| invalid("expected a list of user ids"))?,
            ),
            "checkbox" => match &raw.value {
                Value::Bool(flag) => PropertyValue::Checkbox(*flag),
                Value::Null => PropertyValue::Checkbox(false),
                _ => return Err(invalid("expected a boolean")),
            },
            "number" => match &raw.value {
                Value::Number(n) => PropertyValue::Number(n.as_f64()),
                Value::Null => PropertyValue::Number(None),
                _ => return Err(invalid("expected a number")),
            },
            other => {
                return Err(BlueprintError::InvalidField {
                    field: "row property type",
                    value: other.to_string(),
                    reason: format!("unsupported type on property '{}'", raw.name),
                });
            }
        };
        Ok(RowPropertySpec {
            name: raw.name,
            value,
        })
    }
}

impl From<RowPropertySpec> for RawRowProperty {
    fn from(spec: RowPropertySpec) -> Self {
        let kind = spec.value.type_name().to_string();
        let value = match spec.value {
            PropertyValue::Title(s)
            | PropertyValue::RichText(s)
            | PropertyValue::Select(s)
            | PropertyValue::Date(s)
            | PropertyValue::Url(s) => Value::String(s),
            PropertyValue::MultiSelect(items) | PropertyValue::People(items) => {
                Value::Array(items.into_iter().map(Value::String).collect())
            }
            PropertyValue::Checkbox(flag) => Value::Bool(flag),
            PropertyValue::Number(n) => n
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        };
        RawRowProperty {
            name: spec.name,
            kind,
            value,
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn text_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Null => Some(Vec::new()),
        Value::Array(items) => Some(items.iter().map(scalar_text).collect()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentSpec {
    pub synth_id: String,
    pub page_synth_id: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_properties_decode_into_typed_values() {
        let props: Vec<RowPropertySpec> = serde_json::from_value(json!([
            {"name": "Name", "type": "title", "value": "Project 1"},
            {"name": "Owner", "type": "people", "value": ["user_1", "user_2"]},
            {"name": "Tags", "type": "multi_select", "value": null},
            {"name": "Done", "type": "checkbox", "value": true},
            {"name": "Points", "type": "number", "value": 3},
        ]))
        .expect("decode");

        assert_eq!(props[0].value, PropertyValue::Title("Project 1".into()));
        assert_eq!(
            props[1].value,
            PropertyValue::People(vec!["user_1".into(), "user_2".into()])
        );
        assert_eq!(props[2].value, PropertyValue::MultiSelect(vec![]));
        assert_eq!(props[3].value, PropertyValue::Checkbox(true));
        assert_eq!(props[4].value, PropertyValue::Number(Some(3.0)));
    }

    #[test]
    fn unknown_property_type_is_rejected() {
        let err = serde_json::from_value::<RowPropertySpec>(
            json!({"name": "Blob", "type": "files", "value": []}),
        )
        .expect_err("should fail");
        assert!(err.to_string().contains("files"));
    }

    #[test]
    fn block_kinds_use_wire_names() {
        let block: BlockSpec =
            serde_json::from_value(json!({"type": "heading_2", "text": "Intro"})).expect("decode");
        assert_eq!(block.kind, BlockKind::Heading2);
        assert_eq!(block.kind.as_str(), "heading_2");
        let todo: BlockSpec =
            serde_json::from_value(json!({"type": "to_do", "text": "x", "checked": true}))
                .expect("decode");
        assert_eq!(todo.kind, BlockKind::ToDo);
        assert_eq!(todo.checked, Some(true));
    }

    #[test]
    fn entity_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.as_str().parse::<EntityKind>().expect("parse"), kind);
        }
        assert!("workspace".parse::<EntityKind>().is_err());
    }
}
