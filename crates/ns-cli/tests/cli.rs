use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const ENV_KEYS: [&str; 6] = [
    "NOTION_TOKEN",
    "NOTION_ROOT_PAGE_ID",
    "NOTION_SYNTH_STATE_DB",
    "NOTION_SYNTH_AUDIT_DIR",
    "ENTRA_TENANT_ID",
    "ENTRA_CLIENT_SECRET",
];

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("notion-synth"));
    cmd.current_dir(dir);
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

fn write_blueprint(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("blueprint.json");
    let doc = serde_json::json!({
        "format_version": 1,
        "company": "Acme",
        "notion_plan": {
            "roots": [{"synth_id": "page_root", "title": "Root"}],
            "pages": [{"synth_id": "page_a", "parent_synth_id": "page_root", "parent_type": "page",
                       "title": "A", "blocks": [{"type": "paragraph", "text": "hello"}]}]
        },
        "activity_stream": []
    });
    fs::write(&path, doc.to_string()).expect("write blueprint");
    path
}

#[test]
fn help_lists_commands_and_global_flags() {
    let tmp = TempDir::new().expect("tmpdir");
    let output = cli(tmp.path()).arg("--help").output().expect("run help");
    assert!(output.status.success(), "--help should succeed");
    let text = String::from_utf8_lossy(&output.stdout);
    for needle in [
        "apply",
        "plan",
        "destroy",
        "activity",
        "verify-users",
        "identity",
        "--state-db",
        "--redact-emails",
        "--root-page-id",
    ] {
        assert!(text.contains(needle), "help output should contain '{needle}'");
    }
}

#[test]
fn destroy_help_mentions_forget() {
    let tmp = TempDir::new().expect("tmpdir");
    cli(tmp.path())
        .args(["destroy", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--forget").and(predicate::str::contains("--continue-on-error")));
}

#[test]
fn validate_reports_counts_as_json() {
    let tmp = TempDir::new().expect("tmpdir");
    let blueprint = write_blueprint(tmp.path());

    let assert = cli(tmp.path())
        .args(["validate", blueprint.to_str().expect("utf8"), "--json"])
        .assert()
        .success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let json: serde_json::Value = serde_json::from_str(&output).expect("json");
    assert_eq!(json["data"]["roots"], 1);
    assert_eq!(json["data"]["pages"], 1);
    assert!(json["data"]["hash"].as_str().expect("hash").starts_with("sha256:"));
}

#[test]
fn validate_rejects_unknown_format_version() {
    let tmp = TempDir::new().expect("tmpdir");
    let path = tmp.path().join("bad.json");
    fs::write(&path, r#"{"format_version": 2}"#).expect("write");

    cli(tmp.path())
        .args(["validate", path.to_str().expect("utf8")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.json"));
}

#[test]
fn apply_without_token_fails_before_any_run() {
    let tmp = TempDir::new().expect("tmpdir");
    let blueprint = write_blueprint(tmp.path());

    cli(tmp.path())
        .args([
            "apply",
            blueprint.to_str().expect("utf8"),
            "--root-page-id",
            "external-root",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOTION_TOKEN"));
    assert!(!tmp.path().join("state.db").exists());
}

#[test]
fn state_runs_on_fresh_store_is_empty() {
    let tmp = TempDir::new().expect("tmpdir");
    let db = tmp.path().join("synth.db");

    let assert = cli(tmp.path())
        .args(["state", "runs", "--json", "--state-db", db.to_str().expect("utf8")])
        .assert()
        .success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let json: serde_json::Value = serde_json::from_str(&output).expect("json");
    assert_eq!(json["data"], serde_json::json!([]));
    assert!(db.exists());
}

#[test]
fn dotenv_supplies_the_state_db() {
    let tmp = TempDir::new().expect("tmpdir");
    fs::write(tmp.path().join(".env"), "NOTION_SYNTH_STATE_DB=from-dotenv.db\n").expect("write");

    cli(tmp.path())
        .args(["state", "objects"])
        .assert()
        .success();
    assert!(tmp.path().join("from-dotenv.db").exists());
}

#[test]
fn plan_runs_without_a_token() {
    let tmp = TempDir::new().expect("tmpdir");
    let blueprint = write_blueprint(tmp.path());

    let assert = cli(tmp.path())
        .args([
            "plan",
            blueprint.to_str().expect("utf8"),
            "--root-page-id",
            "external-root",
            "--json",
        ])
        .assert()
        .success();
    let output = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let json: serde_json::Value = serde_json::from_str(&output).expect("json");
    assert_eq!(json["data"]["created"], 2);
    assert_eq!(json["meta"]["mode"], "plan");
    assert!(tmp.path().join("state.db").exists());
}
