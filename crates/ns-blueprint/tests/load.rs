use std::io::Write;

use ns_blueprint::{ActivityAction, Blueprint, BlueprintError, PropertyValue, load_blueprint};
use serde_json::json;

fn sample() -> serde_json::Value {
    json!({
        "format_version": 1,
        "generated_at": "2026-01-20T09:00:00+00:00",
        "seed": 2026,
        "company": "Acme Robotics",
        "org_profile": "engineering",
        "identity": {
            "users": [{"synth_user_id": "user_1", "email": "alex@acme.test",
                       "upn": "alex@acme.test", "team": "Platform"}],
            "groups": [{"synth_group_id": "group_1", "name": "Acme Robotics · Platform"}],
            "memberships": [{"group_synth_id": "group_1", "user_synth_id": "user_1"}]
        },
        "notion_plan": {
            "roots": [{"synth_id": "page_root", "title": "Platform Team"}],
            "databases": [{"synth_id": "db_tasks", "parent_synth_id": "root", "title": "Tasks",
                           "properties": {"Task": {"title": {}}}}],
            "pages": [{"synth_id": "page_a", "parent_synth_id": "page_root", "parent_type": "page",
                       "title": "Doc", "blocks": [{"type": "paragraph",
                                                   "text": "Owner [[synth:user:user_1]]"}]}],
            "rows": [{"synth_id": "row_1", "database_synth_id": "db_tasks",
                      "properties": [{"name": "Owner", "type": "people", "value": ["user_1"]}]}],
            "comments": []
        },
        "activity_stream": [{"event_id": "evt_1", "kind": "page_edit", "target_synth_id": "page_a",
                             "scheduled_at": "2026-01-20T09:00:00+00:00",
                             "payload": {"append": "Follow-up note 1."}}]
    })
}

#[test]
fn loads_and_validates_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(sample().to_string().as_bytes())
        .expect("write");

    let bp = load_blueprint(file.path()).expect("load");
    assert_eq!(bp.company, "Acme Robotics");
    assert_eq!(bp.plan.pages.len(), 1);
    assert_eq!(
        bp.plan.rows[0].properties[0].value,
        PropertyValue::People(vec!["user_1".into()])
    );
    assert_eq!(
        bp.activity_stream[0].action,
        ActivityAction::PageEdit {
            append: "Follow-up note 1.".into()
        }
    );
}

#[test]
fn content_hash_is_stable_across_reserialization() {
    let bp = Blueprint::from_json_slice(sample().to_string().as_bytes()).expect("decode");
    let reencoded = serde_json::to_vec(&bp).expect("encode");
    let again = Blueprint::from_json_slice(&reencoded).expect("decode again");
    assert_eq!(
        bp.content_hash().expect("hash"),
        again.content_hash().expect("hash")
    );
}

#[test]
fn missing_file_reports_path() {
    let err = load_blueprint("/definitely/not/here.json").expect_err("should fail");
    assert!(matches!(err, BlueprintError::Io { .. }));
    assert!(err.to_string().contains("here.json"));
}
