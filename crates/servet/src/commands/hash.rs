//! Hash command - prints the identity hash a client address maps to.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Arguments for the hash command.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// Client address (e.g. 203.0.113.7)
    pub address: String,
}

/// Run the hash command.
pub fn run(args: HashArgs, ctx: &Context) -> Result<()> {
    let hash = servet_session::identity_hash(&args.address);

    if ctx.json_output {
        let output = serde_json::json!({
            "address": args.address,
            "identity_hash": hash.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", hash);
    }

    Ok(())
}
