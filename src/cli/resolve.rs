//! Resolve and explain subcommands.

use crate::format::OutputFormat;
use crate::types::{ConfigIdentity, MountContext};
use clap::Args;

/// Which configuration to resolve.
///
/// `MODULE` alone names a module's own configuration. With `--extension-id`
/// it names the host module whose slot mounts the extension.
#[derive(Args, Debug)]
pub struct IdentityArgs {
    /// Module to resolve, or the slot owner when resolving an extension
    #[arg(value_name = "MODULE")]
    pub module: String,

    /// Extension instance id (e.g. fooExt)
    #[arg(long, requires_all = ["slot", "extension_module"])]
    pub extension_id: Option<String>,

    /// Slot the extension is mounted in
    #[arg(long, requires = "extension_id")]
    pub slot: Option<String>,

    /// Module that supplies the extension
    #[arg(long, requires = "extension_id")]
    pub extension_module: Option<String>,
}

impl IdentityArgs {
    pub fn context(&self) -> MountContext {
        let context = MountContext::module(&self.module);
        match (&self.extension_id, &self.slot, &self.extension_module) {
            (Some(id), Some(slot), Some(module)) => context.with_extension(slot, module, id),
            _ => context,
        }
    }

    pub fn identity(&self) -> ConfigIdentity {
        self.context().identity()
    }
}

/// Arguments for the resolve subcommand
#[derive(Args, Debug)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub target: IdentityArgs,

    /// Print only the value at this dotted path
    #[arg(short, long, value_name = "PATH")]
    pub key: Option<String>,

    /// Output format: json (default), yaml, or markdown
    #[arg(short, long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Print values, provenance and diagnostics as one JSON report
    #[arg(long)]
    pub report: bool,
}

/// Arguments for the explain subcommand
#[derive(Args, Debug)]
pub struct ExplainArgs {
    #[command(flatten)]
    pub target: IdentityArgs,

    /// Output format: markdown (default) or json
    #[arg(short, long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,
}
