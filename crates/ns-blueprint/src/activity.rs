//! Scheduled follow-up mutations replayed after a blueprint has been applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::{Iso8601, Rfc3339};

use crate::error::BlueprintError;

pub const DEFAULT_PAGE_EDIT_TEXT: &str = "Follow-up note.";
pub const DEFAULT_COMMENT_TEXT: &str = "Quick update.";

/// Wire name of an activity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PageEdit,
    CommentAdd,
    RowUpdate,
    PageCreate,
}

/// Kind-specific mutation carried by an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityAction {
    /// Append a paragraph to the target page.
    PageEdit { append: String },
    /// Add a comment to the target page.
    CommentAdd { body: String },
    /// Patch select-typed properties on the target row.
    RowUpdate { selects: BTreeMap<String, String> },
    /// Accepted in blueprints but not dispatched.
    PageCreate { payload: Map<String, Value> },
}

impl ActivityAction {
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityAction::PageEdit { .. } => ActivityKind::PageEdit,
            ActivityAction::CommentAdd { .. } => ActivityKind::CommentAdd,
            ActivityAction::RowUpdate { .. } => ActivityKind::RowUpdate,
            ActivityAction::PageCreate { .. } => ActivityKind::PageCreate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawActivityEvent", into = "RawActivityEvent")]
pub struct ActivityEvent {
    pub event_id: String,
    pub target_synth_id: String,
    pub scheduled_at: OffsetDateTime,
    pub action: ActivityAction,
}

impl ActivityEvent {
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.scheduled_at <= now
    }
}

#[derive(Serialize, Deserialize)]
struct RawActivityEvent {
    event_id: String,
    kind: ActivityKind,
    target_synth_id: String,
    scheduled_at: String,
    #[serde(default)]
    payload: Map<String, Value>,
}

impl TryFrom<RawActivityEvent> for ActivityEvent {
    type Error = BlueprintError;

    fn try_from(raw: RawActivityEvent) -> Result<Self, Self::Error> {
        let scheduled_at = parse_timestamp(&raw.scheduled_at)?;
        let mut payload = raw.payload;
        let action = match raw.kind {
            ActivityKind::PageEdit => ActivityAction::PageEdit {
                append: payload_text(&payload, "append", DEFAULT_PAGE_EDIT_TEXT),
            },
            ActivityKind::CommentAdd => ActivityAction::CommentAdd {
                body: payload_text(&payload, "body", DEFAULT_COMMENT_TEXT),
            },
            ActivityKind::RowUpdate => ActivityAction::RowUpdate {
                selects: payload
                    .iter()
                    .map(|(k, v)| (k.clone(), text_of(v)))
                    .collect(),
            },
            ActivityKind::PageCreate => ActivityAction::PageCreate {
                payload: std::mem::take(&mut payload),
            },
        };
        Ok(ActivityEvent {
            event_id: raw.event_id,
            target_synth_id: raw.target_synth_id,
            scheduled_at,
            action,
        })
    }
}

impl From<ActivityEvent> for RawActivityEvent {
    fn from(event: ActivityEvent) -> Self {
        let kind = event.action.kind();
        let payload = match event.action {
            ActivityAction::PageEdit { append } => {
                Map::from_iter([("append".to_string(), Value::String(append))])
            }
            ActivityAction::CommentAdd { body } => {
                Map::from_iter([("body".to_string(), Value::String(body))])
            }
            ActivityAction::RowUpdate { selects } => selects
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
            ActivityAction::PageCreate { payload } => payload,
        };
        RawActivityEvent {
            event_id: event.event_id,
            kind,
            target_synth_id: event.target_synth_id,
            scheduled_at: event.scheduled_at.format(&Rfc3339).unwrap_or_default(),
            payload,
        }
    }
}

/// Parse an ISO-8601 timestamp; values without an offset are taken as UTC.
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, BlueprintError> {
    if let Ok(ts) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = OffsetDateTime::parse(value, &Iso8601::DEFAULT) {
        return Ok(ts);
    }
    time::PrimitiveDateTime::parse(value, &Iso8601::DEFAULT)
        .map(|ts| ts.assume_utc())
        .map_err(|e| BlueprintError::InvalidField {
            field: "scheduled_at",
            value: value.to_string(),
            reason: e.to_string(),
        })
}

fn payload_text(payload: &Map<String, Value>, key: &str, default: &str) -> String {
    payload
        .get(key)
        .map(text_of)
        .unwrap_or_else(|| default.to_string())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn decodes_each_kind_with_defaults() {
        let events: Vec<ActivityEvent> = serde_json::from_value(json!([
            {"event_id": "e1", "kind": "page_edit", "target_synth_id": "page_a",
             "scheduled_at": "2026-01-20T09:00:00+00:00"},
            {"event_id": "e2", "kind": "comment_add", "target_synth_id": "page_a",
             "scheduled_at": "2026-01-20T09:30:00Z", "payload": {"body": "Ship it"}},
            {"event_id": "e3", "kind": "row_update", "target_synth_id": "row_a",
             "scheduled_at": "2026-01-20T10:00:00", "payload": {"Status": "Done"}},
        ]))
        .expect("decode");

        assert_eq!(
            events[0].action,
            ActivityAction::PageEdit {
                append: DEFAULT_PAGE_EDIT_TEXT.into()
            }
        );
        assert_eq!(
            events[1].action,
            ActivityAction::CommentAdd {
                body: "Ship it".into()
            }
        );
        match &events[2].action {
            ActivityAction::RowUpdate { selects } => {
                assert_eq!(selects.get("Status").map(String::as_str), Some("Done"));
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(events[2].scheduled_at, datetime!(2026-01-20 10:00:00 UTC));
    }

    #[test]
    fn due_check_is_inclusive() {
        let event: ActivityEvent = serde_json::from_value(json!({
            "event_id": "e1", "kind": "page_edit", "target_synth_id": "p",
            "scheduled_at": "2026-01-20T09:00:00Z"
        }))
        .expect("decode");
        assert!(event.is_due(datetime!(2026-01-20 09:00:00 UTC)));
        assert!(!event.is_due(datetime!(2026-01-20 08:59:59 UTC)));
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let err = serde_json::from_value::<ActivityEvent>(json!({
            "event_id": "e1", "kind": "page_edit", "target_synth_id": "p",
            "scheduled_at": "next tuesday"
        }))
        .expect_err("should fail");
        assert!(err.to_string().contains("scheduled_at"));
    }
}
