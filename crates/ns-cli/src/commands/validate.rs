//! `notion-synth validate` command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde_json::json;

use crate::opts::GlobalOpts;
use crate::output::print_success;

use super::read_blueprint;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Blueprint JSON file
    pub blueprint: PathBuf,
}

/// Decode and structurally validate a blueprint without touching the store.
pub fn cmd_validate(opts: &GlobalOpts, args: &ValidateArgs) -> Result<()> {
    let blueprint = read_blueprint(&args.blueprint)?;
    let plan = &blueprint.plan;
    let data = json!({
        "blueprint": args.blueprint.display().to_string(),
        "hash": blueprint.content_hash()?.to_hex(),
        "company": blueprint.company,
        "roots": plan.roots.len(),
        "databases": plan.databases.len(),
        "pages": plan.pages.len(),
        "rows": plan.rows.len(),
        "comments": plan.comments.len(),
        "users": blueprint.identity.users.len(),
        "events": blueprint.activity_stream.len(),
    });
    print_success(opts, data, None, vec![])
}
