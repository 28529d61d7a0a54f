//! CLI command handlers.

pub mod activity;
pub mod apply;
pub mod destroy;
pub mod identity;
pub mod state;
pub mod validate;

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ns_blueprint::{Blueprint, load_blueprint};
use ns_provider::{DirectoryClientConfig, GraphClient, NotionClient, RetryPolicy, WorkspaceClientConfig};
use ns_reconcile::JsonlAuditLog;
use ns_state::{RunStatus, StateStore};
use uuid::Uuid;

use crate::opts::GlobalOpts;

/// Recorded in the run ledger for commands without a blueprint.
const NO_BLUEPRINT_HASH: &str = "-";

pub fn open_store(opts: &GlobalOpts) -> Result<StateStore> {
    StateStore::open(&opts.state_db)
        .with_context(|| format!("open state db {}", opts.state_db.display()))
}

pub fn read_blueprint(path: &Path) -> Result<Blueprint> {
    load_blueprint(path).with_context(|| format!("load blueprint {}", path.display()))
}

/// One ledger entry plus its audit log, open for the duration of a command.
pub struct Run {
    pub id: String,
    pub store: StateStore,
    pub audit: JsonlAuditLog,
}

impl Run {
    pub fn start(opts: &GlobalOpts, command: &str, blueprint: Option<&Blueprint>) -> Result<Self> {
        let store = open_store(opts)?;
        let hash = match blueprint {
            Some(blueprint) => blueprint.content_hash()?.to_hex(),
            None => NO_BLUEPRINT_HASH.to_string(),
        };
        let id = Uuid::new_v4().to_string();
        store
            .record_run_start(&id, command, &hash)
            .context("record run start")?;
        let audit = JsonlAuditLog::open(&opts.audit_dir, &id, opts.redact_emails)
            .context("open audit log")?;
        tracing::info!(run_id = %id, command, "run started");
        Ok(Self { id, store, audit })
    }

    /// Await `work` and close the ledger entry with its outcome.
    pub async fn finish<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = work.await;
        let status = if result.is_ok() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        self.store
            .record_run_finish(&self.id, status)
            .context("record run finish")?;
        tracing::info!(run_id = %self.id, %status, "run finished");
        result
    }
}

fn retry_policy(opts: &GlobalOpts) -> RetryPolicy {
    RetryPolicy::default().with_max_retries(opts.max_retries)
}

pub fn workspace_client(opts: &GlobalOpts) -> Result<NotionClient> {
    let token = opts
        .notion_token
        .clone()
        .ok_or_else(|| anyhow!("missing workspace token; pass --notion-token or set NOTION_TOKEN"))?;
    let client = NotionClient::new(WorkspaceClientConfig {
        token,
        base_url: opts.notion_base_url.clone(),
        notion_version: opts.notion_version.clone(),
        timeout_secs: opts.http_timeout_secs,
        retry: retry_policy(opts),
    })?;
    Ok(client)
}

pub fn directory_client(opts: &GlobalOpts) -> Result<GraphClient> {
    let required = |value: &Option<String>, flag: &str, env: &str| {
        value
            .clone()
            .ok_or_else(|| anyhow!("missing directory credential; pass --{flag} or set {env}"))
    };
    let client = GraphClient::new(DirectoryClientConfig {
        tenant_id: required(&opts.entra_tenant_id, "entra-tenant-id", "ENTRA_TENANT_ID")?,
        client_id: required(&opts.entra_client_id, "entra-client-id", "ENTRA_CLIENT_ID")?,
        client_secret: required(
            &opts.entra_client_secret,
            "entra-client-secret",
            "ENTRA_CLIENT_SECRET",
        )?,
        timeout_secs: opts.http_timeout_secs,
        retry: retry_policy(opts),
        ..DirectoryClientConfig::default()
    })?;
    Ok(client)
}

pub fn root_page_id(opts: &GlobalOpts) -> Result<String> {
    opts.root_page_id
        .clone()
        .ok_or_else(|| anyhow!("missing root page; pass --root-page-id or set NOTION_ROOT_PAGE_ID"))
}
