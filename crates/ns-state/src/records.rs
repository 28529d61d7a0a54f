use std::fmt;
use std::str::FromStr;

use ns_blueprint::EntityKind;
use serde::Serialize;

/// One row of the `objects` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRecord {
    pub synth_id: String,
    pub kind: EntityKind,
    pub provider: String,
    pub remote_id: String,
    pub parent_synth_id: Option<String>,
    pub spec_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields written on every successful create, update or relink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUpsert<'a> {
    pub synth_id: &'a str,
    pub kind: EntityKind,
    pub provider: &'a str,
    pub remote_id: &'a str,
    pub parent_synth_id: Option<&'a str>,
    pub spec_hash: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityRecord {
    pub synth_user_id: String,
    pub entra_object_id: Option<String>,
    pub notion_user_id: Option<String>,
    pub email: Option<String>,
    pub updated_at: String,
}

/// Partial identity update; `None` fields keep whatever is already stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub entra_object_id: Option<String>,
    pub notion_user_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub run_id: String,
    pub command: String,
    pub blueprint_hash: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
}
