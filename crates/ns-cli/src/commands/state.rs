//! `notion-synth state` read-only commands.

use anyhow::{Result, anyhow};
use clap::Args;
use ns_blueprint::EntityKind;
use ns_provider::WorkspaceProvider;
use serde_json::json;

use crate::opts::GlobalOpts;
use crate::output::print_success;

use super::{open_store, workspace_client};

#[derive(Args, Debug)]
pub struct ObjectsArgs {
    /// Only list objects of this kind (page, database, row, comment)
    #[arg(long)]
    pub kind: Option<EntityKind>,
}

#[derive(Args, Debug)]
pub struct RunsArgs {
    /// Maximum number of runs to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Synthetic id of a tracked object
    pub synth_id: String,

    /// Fetch the current remote body as well
    #[arg(long)]
    pub remote: bool,
}

pub fn cmd_objects(opts: &GlobalOpts, args: &ObjectsArgs) -> Result<()> {
    let store = open_store(opts)?;
    let objects = match args.kind {
        Some(kind) => store.list_objects_by_kind(kind)?,
        None => store.list_objects()?,
    };
    let meta = json!({ "count": objects.len() });
    print_success(opts, serde_json::to_value(&objects)?, Some(meta), vec![])
}

pub fn cmd_runs(opts: &GlobalOpts, args: &RunsArgs) -> Result<()> {
    let store = open_store(opts)?;
    let runs = store.list_runs(args.limit)?;
    print_success(opts, serde_json::to_value(&runs)?, None, vec![])
}

pub async fn cmd_inspect(opts: &GlobalOpts, args: &InspectArgs) -> Result<()> {
    let store = open_store(opts)?;
    let record = store
        .get_object(&args.synth_id)?
        .ok_or_else(|| anyhow!("no tracked object with synth id '{}'", args.synth_id))?;
    let mut data = json!({ "record": record });
    if args.remote {
        let workspace = workspace_client(opts)?;
        let remote = workspace.get_object(record.kind, &record.remote_id).await?;
        data["remote"] = remote;
    }
    print_success(opts, data, None, vec![])
}
