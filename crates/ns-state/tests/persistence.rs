use ns_blueprint::EntityKind;
use ns_state::{IdentityUpdate, ObjectUpsert, RunStatus, StateStore};

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("state.db");

    {
        let store = StateStore::open(&path).expect("open");
        store
            .upsert_object(&ObjectUpsert {
                synth_id: "page_root",
                kind: EntityKind::Page,
                provider: "notion",
                remote_id: "remote-root",
                parent_synth_id: None,
                spec_hash: "sha256:aa",
            })
            .expect("upsert");
        store
            .upsert_identity(
                "user_1",
                &IdentityUpdate {
                    notion_user_id: Some("notionuser_42".into()),
                    ..IdentityUpdate::default()
                },
            )
            .expect("identity");
        store.mark_event_run("evt_1").expect("mark");
        store.record_run_start("run-1", "apply", "sha256:bp").expect("run");
        store
            .record_run_finish("run-1", RunStatus::Succeeded)
            .expect("finish");
    }

    let reopened = StateStore::open(&path).expect("reopen");
    assert_eq!(reopened.path(), Some(path.as_path()));
    assert_eq!(
        reopened.remote_id_of("page_root").expect("lookup").as_deref(),
        Some("remote-root")
    );
    assert_eq!(
        reopened.workspace_user_of("user_1").expect("lookup").as_deref(),
        Some("notionuser_42")
    );
    assert!(reopened.was_event_run("evt_1").expect("ledger"));
    let runs = reopened.list_runs(10).expect("runs");
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Succeeded);
}

#[test]
fn in_memory_stores_are_isolated() {
    let a = StateStore::open_in_memory().expect("a");
    let b = StateStore::open_in_memory().expect("b");
    a.mark_event_run("evt_1").expect("mark");
    assert!(a.was_event_run("evt_1").expect("check"));
    assert!(!b.was_event_run("evt_1").expect("check"));
    assert!(a.path().is_none());
}

#[test]
fn delete_object_reports_removal() {
    let store = StateStore::open_in_memory().expect("store");
    store
        .upsert_object(&ObjectUpsert {
            synth_id: "row_1",
            kind: EntityKind::Row,
            provider: "notion",
            remote_id: "r",
            parent_synth_id: Some("db_1"),
            spec_hash: "h",
        })
        .expect("upsert");
    assert!(store.delete_object("row_1").expect("delete"));
    assert!(!store.delete_object("row_1").expect("delete again"));
    assert!(store.get_object("row_1").expect("get").is_none());
}
