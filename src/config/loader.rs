//! Settings loader with tier-based merging.
//!
//! Loads settings from multiple tiers and merges them field-by-field.

use super::types::Settings;
use crate::resolve::merge::deep_merge_all;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name looked up in each tier directory.
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Settings tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingsTier {
    /// Built-in defaults (lowest priority)
    Defaults = 0,
    /// Project-level settings ($CWD/module-config/)
    Project = 1,
    /// User-level settings (~/.module-config/)
    User = 2,
    /// Environment variables (highest priority)
    Environment = 3,
}

impl std::fmt::Display for SettingsTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsTier::Defaults => write!(f, "defaults"),
            SettingsTier::Project => write!(f, "project"),
            SettingsTier::User => write!(f, "user"),
            SettingsTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories for each settings tier.
#[derive(Debug, Clone)]
pub struct SettingsPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for SettingsPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl SettingsPaths {
    /// Discover tier directories from environment and defaults.
    pub fn discover() -> Self {
        // User dir: MODULE_CONFIG_USER_DIR or ~/.module-config
        let user_dir = std::env::var("MODULE_CONFIG_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".module-config")));

        // Project dir: MODULE_CONFIG_PROJECT_DIR or $CWD/module-config
        let project_dir = std::env::var("MODULE_CONFIG_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("module-config")));

        Self {
            project_dir,
            user_dir,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    fn tier_file(&self, tier: SettingsTier) -> Option<PathBuf> {
        let dir = match tier {
            SettingsTier::Project => self.project_dir.as_ref(),
            SettingsTier::User => self.user_dir.as_ref(),
            SettingsTier::Defaults | SettingsTier::Environment => None,
        }?;
        Some(dir.join(SETTINGS_FILE))
    }
}

/// Loads [`Settings`] across tiers.
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    pub paths: SettingsPaths,
    settings: Settings,
    /// Files that contributed, lowest tier first.
    sources: Vec<(SettingsTier, PathBuf)>,
}

impl SettingsLoader {
    /// Load settings from all tiers and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(SettingsPaths::discover())
    }

    pub fn load_with_paths(paths: SettingsPaths) -> Result<Self> {
        Self::load_with_env(paths, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup.
    pub fn load_with_env<F>(paths: SettingsPaths, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Explicit settings file bypasses the tiers
        if let Some(explicit) = env("MODULE_CONFIG_SETTINGS_PATH") {
            let path = PathBuf::from(explicit);
            let mut settings = Settings::load(&path)?;
            Self::apply_env_overrides(&mut settings, &env);
            return Ok(Self {
                paths,
                settings,
                sources: vec![(SettingsTier::Environment, path)],
            });
        }

        let mut layers: Vec<Value> = vec![serde_json::to_value(Settings::default())?];
        let mut sources = Vec::new();

        for tier in [SettingsTier::Project, SettingsTier::User] {
            let Some(file) = paths.tier_file(tier) else {
                continue;
            };
            if !file.exists() {
                continue;
            }
            match read_yaml(&file) {
                Ok(Value::Null) => {}
                Ok(value) => {
                    debug!(tier = %tier, path = %file.display(), "Loaded settings tier");
                    layers.push(value);
                    sources.push((tier, file));
                }
                Err(e) => warn!("Skipping {} settings {}: {:#}", tier, file.display(), e),
            }
        }

        let merged = deep_merge_all(layers);
        let mut settings: Settings =
            serde_json::from_value(merged).context("Invalid settings after merging tiers")?;
        Self::apply_env_overrides(&mut settings, &env);

        Ok(Self {
            paths,
            settings,
            sources,
        })
    }

    /// Apply environment variable overrides to settings.
    fn apply_env_overrides<F>(settings: &mut Settings, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strict) = env("MODULE_CONFIG_STRICT") {
            match parse_flag(&strict) {
                Some(flag) => settings.resolution.strict = flag,
                None => warn!("Ignoring MODULE_CONFIG_STRICT={:?}, expected a boolean", strict),
            }
        }

        if let Some(schema_dir) = env("MODULE_CONFIG_SCHEMA_DIR") {
            settings.sources.schema_dir = PathBuf::from(schema_dir);
        }

        if let Some(overrides_dir) = env("MODULE_CONFIG_OVERRIDES_DIR") {
            settings.sources.overrides_dir = PathBuf::from(overrides_dir);
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn into_settings(self) -> Settings {
        self.settings
    }

    /// Settings files that were merged, lowest tier first.
    pub fn sources(&self) -> &[(SettingsTier, PathBuf)] {
        &self.sources
    }

    pub fn project_dir(&self) -> Option<&Path> {
        self.paths.project_dir.as_deref()
    }

    pub fn user_dir(&self) -> Option<&Path> {
        self.paths.user_dir.as_deref()
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str::<Value>(&content)?)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
