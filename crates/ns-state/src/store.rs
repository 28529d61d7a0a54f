use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ns_blueprint::EntityKind;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::records::{
    IdentityRecord, IdentityUpdate, ObjectRecord, ObjectUpsert, RunRecord, RunStatus,
};
use crate::{StateError, StateResult};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS objects (
    synth_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    provider TEXT NOT NULL,
    remote_id TEXT NOT NULL,
    parent_synth_id TEXT,
    spec_hash TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS objects_kind ON objects(kind);
CREATE TABLE IF NOT EXISTS runs (
    run_id TEXT PRIMARY KEY,
    command TEXT NOT NULL,
    blueprint_hash TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    status TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS identity_map (
    synth_user_id TEXT PRIMARY KEY,
    entra_object_id TEXT,
    notion_user_id TEXT,
    email TEXT,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS activity_events (
    event_id TEXT PRIMARY KEY,
    last_run_at TEXT NOT NULL
);
";

/// SQLite-backed state store. The handle is passed explicitly to every engine;
/// there is no process-wide connection.
#[derive(Debug)]
pub struct StateStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl StateStore {
    /// Open (creating if needed) a store file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> StateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn, Some(path))
    }

    /// Fresh, isolated in-memory store.
    pub fn open_in_memory() -> StateResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StateResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Backing file, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> StateResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::Poisoned)
    }

    // -----------------------------------------------------------------------
    // objects
    // -----------------------------------------------------------------------

    pub fn upsert_object(&self, object: &ObjectUpsert<'_>) -> StateResult<()> {
        let now = now_rfc3339()?;
        self.conn()?.execute(
            "INSERT INTO objects (synth_id, kind, provider, remote_id, parent_synth_id, spec_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(synth_id) DO UPDATE SET
                kind = excluded.kind,
                provider = excluded.provider,
                remote_id = excluded.remote_id,
                parent_synth_id = excluded.parent_synth_id,
                spec_hash = excluded.spec_hash,
                updated_at = excluded.updated_at",
            params![
                object.synth_id,
                object.kind.as_str(),
                object.provider,
                object.remote_id,
                object.parent_synth_id,
                object.spec_hash,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_object(&self, synth_id: &str) -> StateResult<Option<ObjectRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT synth_id, kind, provider, remote_id, parent_synth_id, spec_hash, created_at, updated_at
                 FROM objects WHERE synth_id = ?1",
                params![synth_id],
                object_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Convenience lookup used by resolution and replay.
    pub fn remote_id_of(&self, synth_id: &str) -> StateResult<Option<String>> {
        Ok(self.get_object(synth_id)?.map(|o| o.remote_id))
    }

    /// Records of one kind in insertion order.
    pub fn list_objects_by_kind(&self, kind: EntityKind) -> StateResult<Vec<ObjectRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT synth_id, kind, provider, remote_id, parent_synth_id, spec_hash, created_at, updated_at
             FROM objects WHERE kind = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![kind.as_str()], object_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn list_objects(&self) -> StateResult<Vec<ObjectRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT synth_id, kind, provider, remote_id, parent_synth_id, spec_hash, created_at, updated_at
             FROM objects ORDER BY rowid",
        )?;
        let rows = stmt.query_map([], object_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Returns whether a row was removed.
    pub fn delete_object(&self, synth_id: &str) -> StateResult<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM objects WHERE synth_id = ?1", params![synth_id])?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // identity map
    // -----------------------------------------------------------------------

    pub fn upsert_identity(&self, synth_user_id: &str, update: &IdentityUpdate) -> StateResult<()> {
        let now = now_rfc3339()?;
        self.conn()?.execute(
            "INSERT INTO identity_map (synth_user_id, entra_object_id, notion_user_id, email, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(synth_user_id) DO UPDATE SET
                entra_object_id = COALESCE(excluded.entra_object_id, identity_map.entra_object_id),
                notion_user_id = COALESCE(excluded.notion_user_id, identity_map.notion_user_id),
                email = COALESCE(excluded.email, identity_map.email),
                updated_at = excluded.updated_at",
            params![
                synth_user_id,
                update.entra_object_id,
                update.notion_user_id,
                update.email,
                now,
            ],
        )?;
        Ok(())
    }

    pub fn get_identity(&self, synth_user_id: &str) -> StateResult<Option<IdentityRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT synth_user_id, entra_object_id, notion_user_id, email, updated_at
                 FROM identity_map WHERE synth_user_id = ?1",
                params![synth_user_id],
                identity_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Remote workspace user id for a synthetic user, if verified.
    pub fn workspace_user_of(&self, synth_user_id: &str) -> StateResult<Option<String>> {
        Ok(self
            .get_identity(synth_user_id)?
            .and_then(|identity| identity.notion_user_id))
    }

    pub fn list_identities(&self) -> StateResult<Vec<IdentityRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT synth_user_id, entra_object_id, notion_user_id, email, updated_at
             FROM identity_map ORDER BY synth_user_id",
        )?;
        let rows = stmt.query_map([], identity_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -----------------------------------------------------------------------
    // run ledger
    // -----------------------------------------------------------------------

    pub fn record_run_start(
        &self,
        run_id: &str,
        command: &str,
        blueprint_hash: &str,
    ) -> StateResult<()> {
        let now = now_rfc3339()?;
        self.conn()?.execute(
            "INSERT INTO runs (run_id, command, blueprint_hash, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                command,
                blueprint_hash,
                now,
                RunStatus::Running.as_str()
            ],
        )?;
        Ok(())
    }

    pub fn record_run_finish(&self, run_id: &str, status: RunStatus) -> StateResult<()> {
        let now = now_rfc3339()?;
        let changed = self.conn()?.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2 WHERE run_id = ?3",
            params![now, status.as_str(), run_id],
        )?;
        if changed == 0 {
            return Err(StateError::UnknownRun(run_id.to_string()));
        }
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> StateResult<Option<RunRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT run_id, command, blueprint_hash, started_at, finished_at, status
                 FROM runs WHERE run_id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> StateResult<Vec<RunRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, command, blueprint_hash, started_at, finished_at, status
             FROM runs ORDER BY started_at DESC, rowid DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], run_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // -----------------------------------------------------------------------
    // activity ledger
    // -----------------------------------------------------------------------

    pub fn was_event_run(&self, event_id: &str) -> StateResult<bool> {
        Ok(self.event_last_run(event_id)?.is_some())
    }

    pub fn event_last_run(&self, event_id: &str) -> StateResult<Option<String>> {
        let conn = self.conn()?;
        let last = conn
            .query_row(
                "SELECT last_run_at FROM activity_events WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(last)
    }

    pub fn mark_event_run(&self, event_id: &str) -> StateResult<()> {
        let now = now_rfc3339()?;
        self.conn()?.execute(
            "INSERT INTO activity_events (event_id, last_run_at) VALUES (?1, ?2)
             ON CONFLICT(event_id) DO UPDATE SET last_run_at = excluded.last_run_at",
            params![event_id, now],
        )?;
        Ok(())
    }
}

fn now_rfc3339() -> StateResult<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

fn object_from_row(row: &Row<'_>) -> rusqlite::Result<ObjectRecord> {
    let kind: String = row.get(1)?;
    let kind = kind
        .parse::<EntityKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;
    Ok(ObjectRecord {
        synth_id: row.get(0)?,
        kind,
        provider: row.get(2)?,
        remote_id: row.get(3)?,
        parent_synth_id: row.get(4)?,
        spec_hash: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<IdentityRecord> {
    Ok(IdentityRecord {
        synth_user_id: row.get(0)?,
        entra_object_id: row.get(1)?,
        notion_user_id: row.get(2)?,
        email: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(5)?;
    let status = status.parse::<RunStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
    })?;
    Ok(RunRecord {
        run_id: row.get(0)?,
        command: row.get(1)?,
        blueprint_hash: row.get(2)?,
        started_at: row.get(3)?,
        finished_at: row.get(4)?,
        status,
    })
}
