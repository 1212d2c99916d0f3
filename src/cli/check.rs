//! Check subcommand for module-config CLI
//!
//! Resolves every module that has a schema document and reports problems.

use crate::format::OutputFormat;
use clap::Args;

/// Arguments for the check subcommand
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Modules to check (default: every module with a schema document)
    #[arg(value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Output format: markdown (default) or json
    #[arg(short, long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Treat informational diagnostics (unknown keys, missing schemas) as failures
    #[arg(long)]
    pub deny_warnings: bool,
}
