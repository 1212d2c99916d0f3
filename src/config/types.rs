//! Settings types for the tool itself.
//!
//! These are not module configuration; they say where schemas and override
//! documents live and how strictly to resolve them.

use crate::resolve::ResolvePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolution policy as written in settings files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionSettings {
    /// Fail when a module has no schema instead of resolving overrides only.
    #[serde(default)]
    pub strict: bool,

    /// Replace invalid values with the key's default (default: true).
    #[serde(default = "default_true")]
    pub validation_fallback: bool,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            strict: false,
            validation_fallback: true,
        }
    }
}

impl ResolutionSettings {
    pub fn policy(&self) -> ResolvePolicy {
        ResolvePolicy {
            strict: self.strict,
            validation_fallback: self.validation_fallback,
        }
    }
}

/// Where schema and override documents are read from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Directory of `<module>.yaml|yml|json` schema documents.
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Directory of provide payloads, applied in file-name order.
    #[serde(default = "default_overrides_dir")]
    pub overrides_dir: PathBuf,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            schema_dir: default_schema_dir(),
            overrides_dir: default_overrides_dir(),
        }
    }
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("module-config/schemas")
}

fn default_overrides_dir() -> PathBuf {
    PathBuf::from("module-config/overrides")
}

/// File watching for `watch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Debounce window for coalescing rapid edits (default: 300ms).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

/// Settings for the `module-config` tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub resolution: ResolutionSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default)]
    pub watch: WatchSettings,
}

impl Settings {
    /// Load settings from a single YAML file, without tiering.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        // Empty or comment-only files parse as null
        let settings: Option<Settings> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings.unwrap_or_default())
    }

    pub fn policy(&self) -> ResolvePolicy {
        self.resolution.policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(!settings.resolution.strict);
        assert!(settings.resolution.validation_fallback);
        assert_eq!(settings.watch.debounce(), Duration::from_millis(300));
        assert_eq!(settings.policy(), ResolvePolicy::default());
    }

    #[test]
    fn test_load_partial_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        std::fs::write(&path, "resolution:\n  strict: true\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.resolution.strict);
        assert!(settings.resolution.validation_fallback);
        assert_eq!(
            settings.sources.schema_dir,
            PathBuf::from("module-config/schemas")
        );
    }

    #[test]
    fn test_load_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.yaml");
        std::fs::write(&path, "# nothing here\n").unwrap();
        let settings = Settings::load(&path).unwrap();
        assert!(settings.watch.enabled);
    }
}
