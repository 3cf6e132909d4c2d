//! `xc` — operator CLI for the execution core's HTTP surface (§6).
//!
//! Every mutating subcommand (`arm`, `disarm`, `halt`, `flatten`) signs its
//! own request body the same way the daemon verifies it: HMAC-SHA256 over
//! the canonical JSON of `{action, operatorId, reason, pin}`. Read-only
//! subcommands (`status`, `health`) and the offline hashing utilities
//! (`config-hash`, `policy-hash`) need no secret.

mod commands;

use clap::{Parser, Subcommand};

use commands::operator::OperatorArgs;

#[derive(Parser)]
#[command(name = "xc")]
#[command(about = "Execution core operator CLI", long_about = None)]
struct Cli {
    /// Base URL of the running xc-daemon instance.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8899")]
    base_url: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET /status — current mode, reasons, suggested actions, confidence.
    Status,

    /// GET /health — bus, WAL, venue adapter health.
    Health,

    /// POST /arm — Defensive->Cautious, or Cautious->Normal once confidence
    /// has recovered (§4.6).
    Arm(OperatorCommandArgs),

    /// POST /disarm — Normal/Cautious->Cautious, an operator-requested
    /// precaution short of a full halt.
    Disarm(OperatorCommandArgs),

    /// POST /halt — immediate transition to Defensive (§4.6, §7).
    Halt(OperatorCommandArgs),

    /// POST /flatten — close every open position with reduceOnly Close
    /// intents (§6).
    Flatten(OperatorCommandArgs),

    /// Compute a layered config's canonical hash (offline).
    ConfigHash {
        /// Paths in merge order (base -> env -> venue -> ...).
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Compute a RiskPolicy file's canonical hash (offline).
    PolicyHash {
        /// Path to a RiskPolicy JSON document.
        path: String,
    },
}

#[derive(clap::Args)]
struct OperatorCommandArgs {
    /// Identifier of the operator issuing the command (audit trail only).
    #[arg(long)]
    operator_id: String,

    /// Human-readable justification, journaled verbatim.
    #[arg(long)]
    reason: String,

    /// Operator PIN; part of the signed payload, never transmitted alone.
    #[arg(long)]
    pin: String,

    /// Env var holding the HMAC secret used to sign this command.
    #[arg(long, default_value = "XC_HMAC_SECRET")]
    secret_env: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Status => commands::status::status(&cli.base_url).await,
        Commands::Health => commands::status::health(&cli.base_url).await,
        Commands::Arm(a) => commands::operator::arm(to_operator_args(&cli.base_url, &a)).await,
        Commands::Disarm(a) => commands::operator::disarm(to_operator_args(&cli.base_url, &a)).await,
        Commands::Halt(a) => commands::operator::halt(to_operator_args(&cli.base_url, &a)).await,
        Commands::Flatten(a) => commands::operator::flatten(to_operator_args(&cli.base_url, &a)).await,
        Commands::ConfigHash { paths } => commands::policy::config_hash(&paths),
        Commands::PolicyHash { path } => commands::policy::policy_hash(&path),
    }
}

fn to_operator_args<'a>(base_url: &'a str, args: &'a OperatorCommandArgs) -> OperatorArgs<'a> {
    OperatorArgs {
        base_url,
        operator_id: &args.operator_id,
        reason: &args.reason,
        pin: &args.pin,
        secret_env: &args.secret_env,
    }
}
