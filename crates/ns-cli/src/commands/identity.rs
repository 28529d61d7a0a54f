//! Identity commands: `verify-users` and `identity provision|verify`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use ns_reconcile::{
    ProvisionMode, ProvisionOptions, provision_identity, verify_provisioning, verify_users,
};
use serde_json::json;

use crate::opts::GlobalOpts;
use crate::output::print_success;

use super::{Run, directory_client, read_blueprint, workspace_client};

#[derive(Args, Debug)]
pub struct BlueprintArg {
    /// Blueprint JSON file
    pub blueprint: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Create missing users and groups
    Create,
    /// Only record users and groups that already exist
    Sync,
}

impl From<ModeArg> for ProvisionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => ProvisionMode::Create,
            ModeArg::Sync => ProvisionMode::Sync,
        }
    }
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Blueprint JSON file
    pub blueprint: PathBuf,

    #[arg(long, value_enum, default_value_t = ModeArg::Create)]
    pub mode: ModeArg,

    /// Report what would change without writing to the directory
    #[arg(long)]
    pub dry_run: bool,
}

/// Match blueprint users to workspace users by email.
pub async fn cmd_verify_users(opts: &GlobalOpts, args: &BlueprintArg) -> Result<()> {
    let blueprint = read_blueprint(&args.blueprint)?;
    let workspace = workspace_client(opts)?;
    let run = Run::start(opts, "verify-users", Some(&blueprint))?;

    let meta = json!({ "run_id": run.id });
    run.finish(async {
        let report = verify_users(&run.store, &workspace, &run.audit, &blueprint).await?;
        let warnings = report
            .missing
            .iter()
            .map(|email| format!("no workspace user for {email}"))
            .collect();
        print_success(opts, serde_json::to_value(&report)?, Some(meta), warnings)
    })
    .await
}

pub async fn cmd_provision(opts: &GlobalOpts, args: &ProvisionArgs) -> Result<()> {
    let blueprint = read_blueprint(&args.blueprint)?;
    let directory = directory_client(opts)?;
    let options = ProvisionOptions {
        mode: args.mode.into(),
        dry_run: args.dry_run,
    };
    let run = Run::start(opts, "identity-provision", Some(&blueprint))?;

    let meta = json!({ "run_id": run.id, "mode": options.mode, "dry_run": options.dry_run });
    run.finish(async {
        let report = provision_identity(&run.store, &directory, &run.audit, &blueprint, options).await?;
        print_success(opts, serde_json::to_value(&report)?, Some(meta), vec![])
    })
    .await
}

pub async fn cmd_verify_provisioning(opts: &GlobalOpts, args: &BlueprintArg) -> Result<()> {
    let blueprint = read_blueprint(&args.blueprint)?;
    let directory = directory_client(opts)?;
    let workspace = workspace_client(opts)?;
    let run = Run::start(opts, "identity-verify", Some(&blueprint))?;

    let meta = json!({ "run_id": run.id });
    run.finish(async {
        let report =
            verify_provisioning(&run.store, &directory, &workspace, &run.audit, &blueprint).await?;
        print_success(opts, serde_json::to_value(&report)?, Some(meta), vec![])
    })
    .await
}
