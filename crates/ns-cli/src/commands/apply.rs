//! `notion-synth apply` and `notion-synth plan` commands.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use ns_provider::{OfflineWorkspace, WorkspaceProvider};
use ns_reconcile::{ApplyMode, ApplyOptions, Reconciler};
use serde_json::json;

use crate::opts::GlobalOpts;
use crate::output::print_success;

use super::{Run, read_blueprint, root_page_id, workspace_client};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Blueprint JSON file
    pub blueprint: PathBuf,

    /// Record entity failures and keep going instead of aborting
    #[arg(long)]
    pub continue_on_error: bool,
}

pub async fn cmd_apply(opts: &GlobalOpts, args: &ApplyArgs, mode: ApplyMode) -> Result<()> {
    let blueprint = read_blueprint(&args.blueprint)?;
    let options = ApplyOptions {
        root_page_id: root_page_id(opts)?,
        mode,
        continue_on_error: args.continue_on_error,
    };
    // Plan mode never reaches the workspace, so it runs without a token.
    let workspace: Box<dyn WorkspaceProvider> = match (mode, opts.notion_token.is_some()) {
        (ApplyMode::Plan, false) => Box::new(OfflineWorkspace),
        _ => Box::new(workspace_client(opts)?),
    };
    let run = Run::start(opts, mode.as_str(), Some(&blueprint))?;

    let meta = json!({ "run_id": run.id, "mode": mode, "audit_log": run.audit.path() });
    run.finish(async {
        let engine = Reconciler::new(&run.store, workspace.as_ref(), &run.audit);
        let report = engine.apply(&blueprint, &options).await?;
        let failed = report.failures.len();
        print_success(opts, serde_json::to_value(&report)?, Some(meta), vec![])?;
        if failed > 0 {
            bail!("{failed} entities failed; see the report above");
        }
        Ok(())
    })
    .await
}
