//! Append-only record of every state-changing action.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use ns_blueprint::EntityKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{ReconcileError, ReconcileResult};

pub const REDACTED_EMAIL: &str = "[redacted-email]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    PlanCreate,
    PlanUpdate,
    Relinked,
    Archived,
    Forgotten,
    ActivityPageEdit,
    ActivityCommentAdd,
    ActivityRowUpdate,
    DirectoryUserCreated,
    DirectoryGroupCreated,
    DirectoryMemberAdded,
    WorkspaceUserMatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: AuditAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    pub synth_id: String,
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl AuditEntry {
    pub fn new(
        action: AuditAction,
        kind: Option<EntityKind>,
        synth_id: impl Into<String>,
        remote_id: Option<&str>,
    ) -> Self {
        Self {
            action,
            kind,
            synth_id: synth_id.into(),
            remote_id: remote_id.map(str::to_string),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry) -> ReconcileResult<()>;
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: String,
    #[serde(flatten)]
    entry: &'a AuditEntry,
}

/// One JSON object per line in `<dir>/<run_id>.jsonl`.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    redact_emails: bool,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    pub fn open(dir: impl AsRef<Path>, run_id: &str, redact_emails: bool) -> ReconcileResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|source| ReconcileError::Audit {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(format!("{run_id}.jsonl"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ReconcileError::Audit {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            redact_emails,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, entry: &AuditEntry) -> ReconcileResult<()> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|e| ReconcileError::State(e.into()))?;
        let mut value = serde_json::to_value(AuditLine { timestamp, entry })?;
        if self.redact_emails {
            redact_value(&mut value);
        }
        let mut line = serde_json::to_string(&value)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| ReconcileError::State(ns_state::StateError::Poisoned))?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ReconcileError::Audit {
                path: self.path.clone(),
                source,
            })
    }
}

/// Keeps entries in memory; used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries().into_iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAudit {
    fn record(&self, entry: &AuditEntry) -> ReconcileResult<()> {
        self.entries
            .lock()
            .map_err(|_| ReconcileError::State(ns_state::StateError::Poisoned))?
            .push(entry.clone());
        Ok(())
    }
}

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        match Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}") {
            Ok(re) => re,
            Err(_) => unreachable!("static regex pattern is valid"),
        }
    })
}

/// Replace every email-like substring in string values, recursively.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::String(text) => {
            if email_regex().is_match(text) {
                *text = email_regex().replace_all(text, REDACTED_EMAIL).into_owned();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        Value::Object(map) => map.values_mut().for_each(redact_value),
        _ => {}
    }
}
