//! Watch subcommand for module-config CLI

use super::resolve::IdentityArgs;
use crate::format::OutputFormat;
use clap::Args;

/// Arguments for the watch subcommand
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub target: IdentityArgs,

    /// Print only the value at this dotted path
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<String>,

    /// Output format: json (default), yaml, or markdown
    #[arg(short, long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,
}
