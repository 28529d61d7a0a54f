//! `notion-synth destroy` command.

use anyhow::{Result, bail};
use clap::Args;
use ns_reconcile::{DestroyOptions, Reconciler};
use serde_json::json;

use crate::opts::GlobalOpts;
use crate::output::print_success;

use super::{Run, workspace_client};

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Delete the state records of archived objects
    #[arg(long)]
    pub forget: bool,

    /// Keep archiving after a failure and report it at the end
    #[arg(long)]
    pub continue_on_error: bool,
}

/// Archive every remote object recorded in the state store.
pub async fn cmd_destroy(opts: &GlobalOpts, args: &DestroyArgs) -> Result<()> {
    let options = DestroyOptions {
        continue_on_error: args.continue_on_error,
        forget: args.forget,
    };
    let workspace = workspace_client(opts)?;
    let run = Run::start(opts, "destroy", None)?;

    let meta = json!({ "run_id": run.id, "audit_log": run.audit.path() });
    run.finish(async {
        let engine = Reconciler::new(&run.store, &workspace, &run.audit);
        let report = engine.destroy(&options).await?;
        let failed = report.failures.len();
        print_success(opts, serde_json::to_value(&report)?, Some(meta), vec![])?;
        if failed > 0 {
            bail!("{failed} objects could not be archived");
        }
        Ok(())
    })
    .await
}
