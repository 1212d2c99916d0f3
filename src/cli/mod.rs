//! CLI command definitions for module-config
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod check;
pub mod resolve;
pub mod watch;

use check::CheckArgs;
use clap::{Parser, Subcommand};
use resolve::{ExplainArgs, ResolveArgs};
use std::path::PathBuf;
use watch::WatchArgs;

/// Resolve layered module configuration from schema and override documents
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to settings file (bypasses settings tiers)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,

    /// Directory of schema documents (overrides settings)
    #[arg(long, global = true, value_name = "DIR")]
    pub schema_dir: Option<PathBuf>,

    /// Directory of override documents (overrides settings)
    #[arg(long, global = true, value_name = "DIR")]
    pub overrides_dir: Option<PathBuf>,

    /// Fail on modules that have no schema
    #[arg(long, global = true)]
    pub strict: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved configuration of a module or extension instance
    Resolve(ResolveArgs),

    /// Resolve every module with a schema document and report diagnostics
    Check(CheckArgs),

    /// Show which layer every resolved value came from
    Explain(ExplainArgs),

    /// Re-resolve whenever schema or override documents change
    Watch(WatchArgs),
}
