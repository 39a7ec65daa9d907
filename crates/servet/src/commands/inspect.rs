//! Inspect command - runs a SQL string through the query denylist.

use anyhow::Result;
use clap::Args;

use servet_server::{QueryDetails, guard_query};

use super::Context;

/// Arguments for the inspect command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// SQL text to check
    pub sql: String,

    /// Accept the query even if it matches the denylist
    #[arg(long)]
    pub disable_protection: bool,
}

/// Run the inspect command.
///
/// Exits non-zero when the query is rejected so it can gate scripts.
pub fn run(args: InspectArgs, ctx: &Context) -> Result<()> {
    let envelope = guard_query(&args.sql, args.disable_protection);

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else {
        let verdict = match envelope.details {
            QueryDetails::Accepted => "accepted",
            QueryDetails::DangerQuery => "rejected",
            QueryDetails::InvalidEntries => "invalid",
        };
        println!("{}: {}", verdict, envelope.message);
    }

    if !envelope.success {
        std::process::exit(1);
    }
    Ok(())
}
