mod commands;
mod opts;
mod output;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ns_reconcile::ApplyMode;

use commands::activity::ActivityArgs;
use commands::apply::ApplyArgs;
use commands::destroy::DestroyArgs;
use commands::identity::{BlueprintArg, ProvisionArgs};
use commands::state::{InspectArgs, ObjectsArgs, RunsArgs};
use commands::validate::ValidateArgs;
use opts::GlobalOpts;

#[derive(Parser, Debug)]
#[command(
    name = "notion-synth",
    version,
    about = "Reconcile a synthetic workspace blueprint against a remote workspace"
)]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a blueprint without touching any remote
    Validate(ValidateArgs),

    /// Show what apply would create or update
    Plan(ApplyArgs),

    /// Create or update remote objects to match a blueprint
    Apply(ApplyArgs),

    /// Archive every remote object recorded in the state store
    Destroy(DestroyArgs),

    /// Replay scheduled activity events
    Activity(ActivityArgs),

    /// Match blueprint users to workspace users by email
    VerifyUsers(BlueprintArg),

    /// Identity directory provisioning
    #[command(subcommand)]
    Identity(IdentityCommand),

    /// Inspect the state store
    #[command(subcommand)]
    State(StateCommand),
}

#[derive(Subcommand, Debug)]
enum IdentityCommand {
    /// Find or create directory users, groups and memberships
    Provision(ProvisionArgs),

    /// Report users and groups missing in the directory or the workspace
    Verify(BlueprintArg),
}

#[derive(Subcommand, Debug)]
enum StateCommand {
    /// List tracked remote objects
    Objects(ObjectsArgs),

    /// List recent runs
    Runs(RunsArgs),

    /// Show one tracked object
    Inspect(InspectArgs),
}

fn main() -> Result<()> {
    let cwd = std::env::current_dir().context("get current directory")?;
    util::load_dotenv(&cwd)?;
    let cli = Cli::parse();
    util::setup_logging();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let opts = &cli.opts;

    match cli.command {
        Command::Validate(args) => commands::validate::cmd_validate(opts, &args),
        Command::Plan(args) => commands::apply::cmd_apply(opts, &args, ApplyMode::Plan).await,
        Command::Apply(args) => commands::apply::cmd_apply(opts, &args, ApplyMode::Apply).await,
        Command::Destroy(args) => commands::destroy::cmd_destroy(opts, &args).await,
        Command::Activity(args) => commands::activity::cmd_activity(opts, &args).await,
        Command::VerifyUsers(args) => commands::identity::cmd_verify_users(opts, &args).await,
        Command::Identity(cmd) => match cmd {
            IdentityCommand::Provision(args) => commands::identity::cmd_provision(opts, &args).await,
            IdentityCommand::Verify(args) => {
                commands::identity::cmd_verify_provisioning(opts, &args).await
            }
        },
        Command::State(cmd) => match cmd {
            StateCommand::Objects(args) => commands::state::cmd_objects(opts, &args),
            StateCommand::Runs(args) => commands::state::cmd_runs(opts, &args),
            StateCommand::Inspect(args) => commands::state::cmd_inspect(opts, &args).await,
        },
    }
}
