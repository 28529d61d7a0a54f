//! Global CLI options.

use std::path::PathBuf;

use clap::Args;

/// Global options for CLI commands.
///
/// These options apply to all commands and can be set via env vars or a
/// `.env` file in the working directory.
#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// SQLite state database (env: NOTION_SYNTH_STATE_DB)
    #[arg(long, global = true, env = "NOTION_SYNTH_STATE_DB", default_value = "state.db")]
    pub state_db: PathBuf,

    /// Directory for per-run audit logs (env: NOTION_SYNTH_AUDIT_DIR)
    #[arg(long, global = true, env = "NOTION_SYNTH_AUDIT_DIR", default_value = "audit")]
    pub audit_dir: PathBuf,

    /// Replace email addresses in audit logs
    #[arg(long, global = true, env = "NOTION_SYNTH_REDACT_EMAILS")]
    pub redact_emails: bool,

    /// Workspace integration token (env: NOTION_TOKEN)
    #[arg(long, global = true, env = "NOTION_TOKEN", hide_env_values = true)]
    pub notion_token: Option<String>,

    /// Workspace API base URL (env: NOTION_BASE_URL)
    #[arg(
        long,
        global = true,
        env = "NOTION_BASE_URL",
        default_value = ns_provider::workspace::DEFAULT_WORKSPACE_BASE_URL
    )]
    pub notion_base_url: String,

    /// Workspace API version header (env: NOTION_VERSION)
    #[arg(
        long,
        global = true,
        env = "NOTION_VERSION",
        default_value = ns_provider::workspace::DEFAULT_NOTION_VERSION
    )]
    pub notion_version: String,

    /// Existing page every blueprint root is created under (env: NOTION_ROOT_PAGE_ID)
    #[arg(long, global = true, env = "NOTION_ROOT_PAGE_ID")]
    pub root_page_id: Option<String>,

    /// Directory tenant (env: ENTRA_TENANT_ID)
    #[arg(long, global = true, env = "ENTRA_TENANT_ID")]
    pub entra_tenant_id: Option<String>,

    /// Directory application id (env: ENTRA_CLIENT_ID)
    #[arg(long, global = true, env = "ENTRA_CLIENT_ID")]
    pub entra_client_id: Option<String>,

    /// Directory application secret (env: ENTRA_CLIENT_SECRET)
    #[arg(long, global = true, env = "ENTRA_CLIENT_SECRET", hide_env_values = true)]
    pub entra_client_secret: Option<String>,

    /// Per-request HTTP timeout in seconds (env: NOTION_SYNTH_HTTP_TIMEOUT_SECS)
    #[arg(long, global = true, env = "NOTION_SYNTH_HTTP_TIMEOUT_SECS", default_value_t = 30.0)]
    pub http_timeout_secs: f64,

    /// Retries per remote call for transient failures (env: NOTION_SYNTH_MAX_RETRIES)
    #[arg(long, global = true, env = "NOTION_SYNTH_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,

    /// JSON output envelope
    #[arg(long, global = true)]
    pub json: bool,

    /// Pretty-print JSON output (implies --json)
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Suppress notices
    #[arg(long, global = true)]
    pub quiet: bool,
}
