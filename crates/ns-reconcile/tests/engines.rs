use ns_blueprint::{Blueprint, EntityKind};
use ns_provider::mock::{RecordingWorkspace, WorkspaceCall};
use ns_provider::{ProviderError, ProviderErrorKind, RemoteUser};
use ns_reconcile::{
    ActivityOptions, ApplyMode, ApplyOptions, AuditAction, DestroyOptions, MemoryAudit,
    ReconcileError, Reconciler, verify_users,
};
use ns_state::{IdentityUpdate, ObjectUpsert, StateStore};
use serde_json::{Value, json};
use time::macros::datetime;

const ROOT_PAGE: &str = "external-root";

fn blueprint(plan: Value, activity: Value) -> Blueprint {
    let doc = json!({
        "format_version": 1,
        "company": "Acme",
        "identity": {
            "users": [{"synth_user_id": "user_1", "email": "Alex@Acme.test", "upn": "alex@acme.test"}]
        },
        "notion_plan": plan,
        "activity_stream": activity,
    });
    Blueprint::from_json_slice(doc.to_string().as_bytes()).expect("blueprint")
}

fn team_space() -> Blueprint {
    blueprint(
        json!({
            "roots": [{"synth_id": "page_root", "title": "Team Space"}],
            "databases": [{"synth_id": "db_tasks", "parent_synth_id": "page_root", "parent_type": "page",
                           "title": "Tasks", "properties": {"Name": {"title": {}}, "Status": {"select": {}}}}],
            "pages": [{"synth_id": "page_a", "parent_synth_id": "page_root", "parent_type": "page",
                       "title": "Kickoff", "blocks": [{"type": "paragraph", "text": "Owner [[synth:user:user_1]]"}]}],
            "rows": [{"synth_id": "row_1", "database_synth_id": "db_tasks",
                      "properties": [{"name": "Name", "type": "title", "value": "Ship it"},
                                     {"name": "Owner", "type": "people", "value": ["user_1"]}]}],
            "comments": [{"synth_id": "comment_1", "page_synth_id": "page_a", "body": "Looks good"}]
        }),
        json!([]),
    )
}

fn apply_options() -> ApplyOptions {
    ApplyOptions {
        root_page_id: ROOT_PAGE.into(),
        ..ApplyOptions::default()
    }
}

fn map_user(store: &StateStore, synth_user_id: &str, notion_user_id: &str) {
    store
        .upsert_identity(
            synth_user_id,
            &IdentityUpdate {
                notion_user_id: Some(notion_user_id.into()),
                ..IdentityUpdate::default()
            },
        )
        .expect("identity");
}

#[tokio::test]
async fn second_apply_is_a_no_op() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    map_user(&store, "user_1", "notionuser_42");
    let engine = Reconciler::new(&store, &workspace, &audit);
    let bp = team_space();

    let first = engine.apply(&bp, &apply_options()).await.expect("apply");
    assert_eq!(first.created, 5);
    assert_eq!(first.relinked, 0);

    workspace.clear_calls();
    let second = engine.apply(&bp, &apply_options()).await.expect("reapply");
    assert_eq!((second.created, second.updated, second.skipped), (0, 0, 5));
    assert_eq!(workspace.mutation_count(), 0);
}

#[tokio::test]
async fn user_mention_resolves_and_reapply_skips() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    map_user(&store, "user_1", "notionuser_42");
    let engine = Reconciler::new(&store, &workspace, &audit);
    let bp = blueprint(
        json!({
            "roots": [{"synth_id": "page_root", "title": "Root"}],
            "pages": [{"synth_id": "page_A", "parent_synth_id": "page_root", "parent_type": "page",
                       "title": "A", "blocks": [{"type": "paragraph", "text": "Hi [[synth:user:user_1]]"}]}]
        }),
        json!([]),
    );

    let report = engine.apply(&bp, &apply_options()).await.expect("apply");
    assert_eq!(report.created, 2);

    let pages = workspace.created_payloads(EntityKind::Page);
    assert_eq!(pages[0]["parent"]["page_id"], json!(ROOT_PAGE));
    let page_a_parent = store.remote_id_of("page_root").expect("lookup").expect("root");
    assert_eq!(pages[1]["parent"]["page_id"], json!(page_a_parent));
    assert_eq!(
        pages[1]["children"][0]["paragraph"]["rich_text"][1],
        json!({"type": "mention", "mention": {"type": "user", "user": {"id": "notionuser_42"}}})
    );

    let again = engine.apply(&bp, &apply_options()).await.expect("reapply");
    assert_eq!((again.created, again.updated, again.skipped), (0, 0, 2));
}

#[tokio::test]
async fn changed_title_produces_exactly_one_update() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    map_user(&store, "user_1", "notionuser_42");
    let engine = Reconciler::new(&store, &workspace, &audit);

    let mut bp = team_space();
    engine.apply(&bp, &apply_options()).await.expect("apply");
    let remote_id = store.remote_id_of("page_a").expect("lookup").expect("page");

    bp.plan.pages[0].title = "Kickoff (revised)".into();
    workspace.clear_calls();
    let report = engine.apply(&bp, &apply_options()).await.expect("reapply");
    assert_eq!((report.created, report.updated, report.skipped), (0, 1, 4));

    let calls = workspace.calls();
    assert!(matches!(&calls[0], WorkspaceCall::Update { remote_id: id, .. } if *id == remote_id));
    assert!(matches!(&calls[1], WorkspaceCall::ReplaceBlocks { remote_id: id, .. } if *id == remote_id));
    assert_eq!(calls.len(), 2);
    assert_eq!(store.remote_id_of("page_a").expect("lookup"), Some(remote_id));
}

#[tokio::test]
async fn forward_page_reference_is_relinked() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    let bp = blueprint(
        json!({
            "roots": [{"synth_id": "page_root", "title": "Root"}],
            "pages": [
                {"synth_id": "page_b", "parent_synth_id": "page_root", "parent_type": "page",
                 "title": "B", "blocks": [{"type": "paragraph", "text": "see [[synth:page:page_c]]"}]},
                {"synth_id": "page_c", "parent_synth_id": "page_root", "parent_type": "page",
                 "title": "C", "blocks": []}
            ]
        }),
        json!([]),
    );

    let report = engine.apply(&bp, &apply_options()).await.expect("apply");
    assert_eq!(report.created, 3);
    assert_eq!(report.relinked, 1);

    let page_b = store.remote_id_of("page_b").expect("lookup").expect("b");
    let page_c = store.remote_id_of("page_c").expect("lookup").expect("c");
    let relinked = workspace
        .calls()
        .into_iter()
        .find_map(|call| match call {
            WorkspaceCall::ReplaceBlocks { remote_id, blocks } if remote_id == page_b => Some(blocks),
            _ => None,
        })
        .expect("replace call for page_b");
    assert_eq!(
        relinked[0]["paragraph"]["rich_text"][1]["mention"]["page"]["id"],
        json!(page_c)
    );
    assert!(audit.actions().contains(&AuditAction::Relinked));

    workspace.clear_calls();
    let again = engine.apply(&bp, &apply_options()).await.expect("reapply");
    assert_eq!((again.created, again.updated, again.relinked), (0, 0, 0));
    assert_eq!(workspace.mutation_count(), 0);
}

#[tokio::test]
async fn plan_mode_never_calls_the_workspace() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    let options = ApplyOptions {
        mode: ApplyMode::Plan,
        ..apply_options()
    };

    let report = engine.apply(&team_space(), &options).await.expect("plan");
    assert_eq!(report.created, 5);
    assert!(workspace.calls().is_empty());
    assert!(store.list_objects().expect("objects").is_empty());
    assert!(audit.actions().iter().all(|a| *a == AuditAction::PlanCreate));
}

#[tokio::test]
async fn entity_failure_aborts_by_default_and_rerun_resumes() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    let bp = team_space();

    workspace.fail_next(ProviderError::new("mock", ProviderErrorKind::Other, "boom"));
    let err = engine.apply(&bp, &apply_options()).await.expect_err("fails");
    assert!(matches!(err, ReconcileError::Entity { ref synth_id, .. } if synth_id == "page_root"));
    assert!(store.list_objects().expect("objects").is_empty());

    let report = engine.apply(&bp, &apply_options()).await.expect("resume");
    assert_eq!(report.created, 5);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn continue_on_error_reports_failures() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    let options = ApplyOptions {
        continue_on_error: true,
        ..apply_options()
    };

    workspace.fail_next(ProviderError::from_status("mock", 400, "{}".into(), None));
    let report = engine.apply(&team_space(), &options).await.expect("apply");

    // The root fails; everything under it has no parent.
    assert_eq!(report.created, 0);
    assert_eq!(report.failures[0].synth_id, "page_root");
    assert!(report.failures.iter().any(|f| f.synth_id == "db_tasks"));
    assert!(report.failures.iter().any(|f| f.synth_id == "row_1"));
}

#[tokio::test]
async fn destroy_archives_each_remote_object_once() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    for synth_id in ["page_x", "page_y"] {
        store
            .upsert_object(&ObjectUpsert {
                synth_id,
                kind: EntityKind::Page,
                provider: "mock",
                remote_id: "shared-remote",
                parent_synth_id: None,
                spec_hash: "sha256:00",
            })
            .expect("upsert");
    }

    let report = engine.destroy(&DestroyOptions::default()).await.expect("destroy");
    assert_eq!(report.archived, 1);
    assert_eq!(report.forgotten, 0);
    let archives = workspace
        .calls()
        .into_iter()
        .filter(|call| matches!(call, WorkspaceCall::Archive { .. }))
        .count();
    assert_eq!(archives, 1);
    assert_eq!(store.list_objects().expect("objects").len(), 2);
}

#[tokio::test]
async fn destroy_forget_clears_records_and_orphaned_comments() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    map_user(&store, "user_1", "notionuser_42");
    let engine = Reconciler::new(&store, &workspace, &audit);
    engine.apply(&team_space(), &apply_options()).await.expect("apply");

    let options = DestroyOptions {
        forget: true,
        ..DestroyOptions::default()
    };
    let report = engine.destroy(&options).await.expect("destroy");
    assert_eq!(report.archived, 4);
    assert_eq!(report.forgotten, 5);
    assert!(store.list_objects().expect("objects").is_empty());

    let archived_kinds: Vec<EntityKind> = workspace
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            WorkspaceCall::Archive { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        archived_kinds,
        vec![EntityKind::Page, EntityKind::Page, EntityKind::Database, EntityKind::Row]
    );
}

#[tokio::test]
async fn destroy_continue_on_error_skips_failed_objects() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    map_user(&store, "user_1", "notionuser_42");
    let engine = Reconciler::new(&store, &workspace, &audit);
    engine.apply(&team_space(), &apply_options()).await.expect("apply");
    let db = store.remote_id_of("db_tasks").expect("lookup").expect("db");
    workspace.fail_for(db, ProviderError::from_status("mock", 404, "{}".into(), None));

    let err = engine.destroy(&DestroyOptions::default()).await.expect_err("aborts");
    assert!(matches!(err, ReconcileError::Entity { kind: EntityKind::Database, .. }));

    let report = engine
        .destroy(&DestroyOptions {
            continue_on_error: true,
            forget: true,
        })
        .await
        .expect("destroy");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].synth_id, "db_tasks");
    assert!(store.get_object("db_tasks").expect("lookup").is_some());
    assert!(store.get_object("row_1").expect("lookup").is_none());
}

fn activity_blueprint() -> Blueprint {
    blueprint(
        json!({
            "roots": [{"synth_id": "page_root", "title": "Root"}],
            "databases": [{"synth_id": "db_tasks", "parent_synth_id": "page_root", "parent_type": "page",
                           "title": "Tasks", "properties": {"Status": {"select": {}}}}],
            "rows": [{"synth_id": "row_1", "database_synth_id": "db_tasks", "properties": []}]
        }),
        json!([
            {"event_id": "evt_edit", "kind": "page_edit", "target_synth_id": "page_root",
             "scheduled_at": "2026-01-20T09:00:00Z", "payload": {"append": "Follow-up 1."}},
            {"event_id": "evt_comment", "kind": "comment_add", "target_synth_id": "page_root",
             "scheduled_at": "2026-01-20T10:00:00Z", "payload": {}},
            {"event_id": "evt_row", "kind": "row_update", "target_synth_id": "row_1",
             "scheduled_at": "2026-01-20T11:00:00Z", "payload": {"Status": "Done"}},
            {"event_id": "evt_ghost", "kind": "page_edit", "target_synth_id": "page_missing",
             "scheduled_at": "2026-01-20T09:30:00Z", "payload": {}},
            {"event_id": "evt_create", "kind": "page_create", "target_synth_id": "page_root",
             "scheduled_at": "2026-01-20T09:30:00Z", "payload": {"title": "New"}},
            {"event_id": "evt_future", "kind": "page_edit", "target_synth_id": "page_root",
             "scheduled_at": "2027-01-01T00:00:00Z", "payload": {}}
        ]),
    )
}

#[tokio::test]
async fn activity_replays_each_due_event_at_most_once() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    let bp = activity_blueprint();
    engine.apply(&bp, &apply_options()).await.expect("apply");
    workspace.clear_calls();

    let now = datetime!(2026-01-21 00:00 UTC);
    let first = engine.run_activity_tick(&bp, now).await.expect("tick");
    let second = engine.run_activity_tick(&bp, now).await.expect("tick again");
    assert_eq!(first.executed + second.executed, 3);
    assert_eq!(second.executed, 0);
    assert_eq!(first.missing_target, vec!["evt_ghost".to_string()]);
    assert_eq!(first.unsupported, vec!["evt_create".to_string()]);

    assert!(store.was_event_run("evt_edit").expect("ledger"));
    assert!(!store.was_event_run("evt_ghost").expect("ledger"));
    assert!(!store.was_event_run("evt_create").expect("ledger"));
    assert!(!store.was_event_run("evt_future").expect("ledger"));

    let calls = workspace.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], WorkspaceCall::AppendBlocks { blocks, .. }
        if blocks[0]["paragraph"]["rich_text"][0]["text"]["content"] == json!("Follow-up 1.")));
    assert!(matches!(&calls[1], WorkspaceCall::Create { kind: EntityKind::Comment, payload, .. }
        if payload["rich_text"][0]["text"]["content"] == json!("Quick update.")));
    assert!(matches!(&calls[2], WorkspaceCall::Update { kind: EntityKind::Row, payload, .. }
        if payload == &json!({"properties": {"Status": {"select": {"name": "Done"}}}})));
}

#[tokio::test(start_paused = true)]
async fn activity_ticks_pick_up_newly_due_events() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::new();
    let audit = MemoryAudit::new();
    let engine = Reconciler::new(&store, &workspace, &audit);
    let bp = activity_blueprint();
    engine.apply(&bp, &apply_options()).await.expect("apply");
    workspace.clear_calls();

    let times = std::sync::Mutex::new(vec![
        datetime!(2027-06-01 00:00 UTC),
        datetime!(2026-01-20 09:00 UTC),
    ]);
    let clock = || {
        times
            .lock()
            .expect("clock")
            .pop()
            .unwrap_or(datetime!(2027-06-01 00:00 UTC))
    };
    let options = ActivityOptions {
        tick_minutes: 1.0,
        jitter: 0.1,
        iterations: 2,
    };
    let report = engine.run_activity(&bp, &options, clock).await.expect("activity");
    assert_eq!(report.ticks, 2);
    // first tick: evt_edit; second tick: comment, row and the future edit
    assert_eq!(report.executed, 4);
    assert_eq!(audit.actions().iter().filter(|a| **a == AuditAction::ActivityPageEdit).count(), 2);
}

#[tokio::test]
async fn verify_users_matches_by_lowercased_email() {
    let store = StateStore::open_in_memory().expect("store");
    let workspace = RecordingWorkspace::with_users([
        RemoteUser {
            id: "nu-7".into(),
            email: Some("alex@acme.TEST".into()),
        },
        RemoteUser {
            id: "bot-1".into(),
            email: None,
        },
    ]);
    let audit = MemoryAudit::new();

    let report = verify_users(&store, &workspace, &audit, &team_space()).await.expect("verify");
    assert_eq!((report.matched, report.total), (1, 1));
    assert!(report.missing.is_empty());
    let identity = store.get_identity("user_1").expect("lookup").expect("identity");
    assert_eq!(identity.notion_user_id.as_deref(), Some("nu-7"));
    assert_eq!(identity.email.as_deref(), Some("alex@acme.test"));
}
