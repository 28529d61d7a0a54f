//! `notion-synth activity` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ns_reconcile::{ActivityOptions, Reconciler};
use serde_json::json;
use time::OffsetDateTime;

use crate::opts::GlobalOpts;
use crate::output::print_success;

use super::{Run, read_blueprint, workspace_client};

#[derive(Args, Debug)]
pub struct ActivityArgs {
    /// Blueprint JSON file
    pub blueprint: PathBuf,

    /// Minutes between ticks
    #[arg(long, default_value_t = 5.0)]
    pub tick_minutes: f64,

    /// Fractional spread applied to each pause (0.0 to 1.0)
    #[arg(long, default_value_t = 0.2)]
    pub jitter: f64,

    /// Number of passes over the activity stream
    #[arg(long, default_value_t = 1)]
    pub iterations: usize,
}

/// Replay due activity events that have not run yet.
pub async fn cmd_activity(opts: &GlobalOpts, args: &ActivityArgs) -> Result<()> {
    let blueprint = read_blueprint(&args.blueprint)?;
    let options = ActivityOptions {
        tick_minutes: args.tick_minutes,
        jitter: args.jitter,
        iterations: args.iterations,
    };
    let workspace = workspace_client(opts)?;
    let run = Run::start(opts, "activity", Some(&blueprint))?;

    let meta = json!({ "run_id": run.id, "audit_log": run.audit.path() });
    run.finish(async {
        let engine = Reconciler::new(&run.store, &workspace, &run.audit);
        let report = engine
            .run_activity(&blueprint, &options, OffsetDateTime::now_utc)
            .await?;
        let mut warnings = Vec::new();
        if !report.missing_target.is_empty() {
            warnings.push(format!(
                "{} due events skipped because their target was never created",
                report.missing_target.len()
            ));
        }
        if !report.unsupported.is_empty() {
            warnings.push(format!(
                "{} page_create events are not replayed",
                report.unsupported.len()
            ));
        }
        print_success(opts, serde_json::to_value(&report)?, Some(meta), warnings)
    })
    .await
}
