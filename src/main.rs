//! module-config
//!
//! Resolves layered module configuration from schema and override documents
//! and explains where every value came from.

use anyhow::{Result, bail};
use clap::Parser;
use module_config::cli::check::CheckArgs;
use module_config::cli::resolve::{ExplainArgs, ResolveArgs};
use module_config::cli::watch::WatchArgs;
use module_config::cli::{Cli, Command};
use module_config::config::files::document_files;
use module_config::config::watcher::{DocumentChangeEvent, WatchPaths, start_document_watcher};
use module_config::config::{Settings, SettingsLoader, load_documents};
use module_config::engine::{ConfigEngine, DirectorySchemaSource};
use module_config::error::ConfigDiagnostic;
use module_config::format::{
    OutputFormat, format_diagnostics_markdown, format_provenance_markdown, render_resolved,
    resolved_report,
};
use module_config::logging::{self, LogTarget};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Load settings through the tiers, then apply command-line overrides.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match cli.settings {
        Some(ref path) => Settings::load(path)?,
        None => SettingsLoader::load()?.into_settings(),
    };

    if let Some(ref dir) = cli.schema_dir {
        settings.sources.schema_dir = dir.clone();
    }
    if let Some(ref dir) = cli.overrides_dir {
        settings.sources.overrides_dir = dir.clone();
    }
    if cli.strict {
        settings.resolution.strict = true;
    }
    Ok(settings)
}

/// Build an engine with lazily loaded schemas and all override documents applied.
fn open_engine(settings: &Settings) -> Result<(ConfigEngine, Vec<ConfigDiagnostic>)> {
    let source = DirectorySchemaSource::new(&settings.sources.schema_dir);
    let engine = ConfigEngine::builder()
        .policy(settings.policy())
        .source(Arc::new(source))
        .build();
    let diagnostics = apply_overrides(&engine, settings)?;
    Ok((engine, diagnostics))
}

fn apply_overrides(engine: &ConfigEngine, settings: &Settings) -> Result<Vec<ConfigDiagnostic>> {
    let documents = load_documents(None, Some(settings.sources.overrides_dir.as_path()))?;
    let diagnostics = documents.apply(engine)?;
    for diag in &diagnostics {
        warn!("{}", diag);
    }
    Ok(diagnostics)
}

async fn run_resolve(settings: &Settings, args: ResolveArgs) -> Result<()> {
    let (engine, _) = open_engine(settings)?;
    let resolved = engine.get(&args.target.identity()).await?;

    if args.report {
        println!("{}", serde_json::to_string_pretty(&resolved_report(&resolved))?);
    } else {
        println!(
            "{}",
            render_resolved(&resolved, args.key.as_deref(), args.format)?
        );
    }
    Ok(())
}

async fn run_explain(settings: &Settings, args: ExplainArgs) -> Result<()> {
    let (engine, _) = open_engine(settings)?;
    let resolved = engine.get(&args.target.identity()).await?;

    match args.format {
        OutputFormat::Markdown => {
            print!("{}", format_provenance_markdown(&resolved));
            if !resolved.diagnostics().is_empty() {
                println!();
                print!("{}", format_diagnostics_markdown(resolved.diagnostics()));
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&resolved_report(&resolved))?),
    }
    Ok(())
}

async fn run_check(settings: &Settings, args: CheckArgs) -> Result<()> {
    let (engine, ingest) = open_engine(settings)?;

    let modules: Vec<String> = if args.modules.is_empty() {
        document_files(&settings.sources.schema_dir)?
            .iter()
            .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect()
    } else {
        args.modules.clone()
    };
    if modules.is_empty() {
        warn!(
            "No schema documents found in {}",
            settings.sources.schema_dir.display()
        );
    }

    let fails = |diag: &ConfigDiagnostic| diag.is_error() || args.deny_warnings;
    let mut failures = ingest.iter().filter(|&d| fails(d)).count();
    let mut results: Vec<(String, Vec<ConfigDiagnostic>)> = Vec::new();
    for module in &modules {
        let diagnostics = match engine.get_config(module).await {
            Ok(resolved) => resolved.diagnostics().to_vec(),
            Err(e) => {
                failures += 1;
                vec![ConfigDiagnostic::new(e.code(), e.to_string())]
            }
        };
        failures += diagnostics.iter().filter(|&d| fails(d)).count();
        results.push((module.clone(), diagnostics));
    }
    debug!(stats = ?engine.stats(), "Check finished");

    match args.format {
        OutputFormat::Markdown => {
            if !ingest.is_empty() {
                println!("## Override documents\n");
                println!("{}", format_diagnostics_markdown(&ingest));
            }
            for (module, diagnostics) in &results {
                if diagnostics.is_empty() {
                    println!("## {}: ok\n", module);
                } else {
                    println!("## {}\n", module);
                    println!("{}", format_diagnostics_markdown(diagnostics));
                }
            }
        }
        _ => {
            let modules: Map<String, Value> = results
                .iter()
                .map(|(module, diagnostics)| (module.clone(), json!(diagnostics)))
                .collect();
            let report = json!({
                "overrides": ingest,
                "modules": modules,
                "failures": failures,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if failures > 0 {
        bail!("{} configuration problem(s) found", failures);
    }
    Ok(())
}

async fn run_watch(settings: &Settings, args: WatchArgs) -> Result<()> {
    if !settings.watch.enabled {
        bail!("Watching is disabled in settings (watch.enabled = false)");
    }

    let (engine, _) = open_engine(settings)?;
    let identity = args.target.identity();
    let mut subscription = engine.subscribe(&identity);

    let mut last = engine.get(&identity).await?;
    println!("{}", render_resolved(&last, args.key.as_deref(), args.format)?);

    let paths = WatchPaths {
        schema_dir: Some(settings.sources.schema_dir.clone()),
        overrides_dir: Some(settings.sources.overrides_dir.clone()),
    };
    let mut handle = start_document_watcher(paths, settings.watch.debounce())?;
    info!("Watching {} for changes", identity);

    loop {
        tokio::select! {
            event = handle.wait_for_change() => match event {
                Some(DocumentChangeEvent::Error(message)) => {
                    warn!("Document watcher error: {}", message);
                    continue;
                }
                Some(event) => {
                    debug!("Reloading after {:?}", event);
                    reload(&engine, settings);
                }
                None => {
                    info!("Document watcher stopped");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watch");
                return Ok(());
            }
        }

        if !subscription.has_pending_change() {
            continue;
        }
        let version = subscription.mark_seen();
        match engine.get(&identity).await {
            Ok(resolved) => {
                if !resolved.same_values(&last) {
                    debug!(version, "Resolution changed");
                    println!("{}", render_resolved(&resolved, args.key.as_deref(), args.format)?);
                }
                last = resolved;
            }
            Err(e) => warn!("Failed to resolve {}: {}", identity, e),
        }
    }
}

/// Rebuild the engine state from disk. Keeps the old state if the override
/// documents cannot be read.
fn reload(engine: &ConfigEngine, settings: &Settings) {
    let documents = match load_documents(None, Some(settings.sources.overrides_dir.as_path())) {
        Ok(documents) => documents,
        Err(e) => {
            warn!("Keeping previous configuration: {}", e);
            return;
        }
    };
    // Schemas are fetched again from the source on the next access.
    engine.clear_all();
    match documents.apply(engine) {
        Ok(diagnostics) => {
            for diag in &diagnostics {
                warn!("{}", diag);
            }
        }
        Err(e) => warn!("Failed to apply override documents: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let settings = load_settings(&cli)?;
    debug!(?settings, "Settings loaded");

    match cli.command {
        Command::Resolve(args) => run_resolve(&settings, args).await,
        Command::Check(args) => run_check(&settings, args).await,
        Command::Explain(args) => run_explain(&settings, args).await,
        Command::Watch(args) => run_watch(&settings, args).await,
    }
}
