//! Lazy schema sources.
//!
//! A schema that is not registered when an identity is first requested can be
//! fetched on demand. The accessor suspends on the fetch exactly once per
//! identity; afterwards the schema lives in the registry like any other.

use crate::config::files::{SCHEMA_EXTENSIONS, parse_document};
use crate::schema::ConfigSchema;
use anyhow::Context;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Something that can produce a module's schema asynchronously.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Fetch the schema for `module`. `Ok(None)` means the module has none.
    async fn load_schema(&self, module: &str) -> anyhow::Result<Option<ConfigSchema>>;
}

/// Loads `<dir>/<module>.{yaml,yml,json}` on first use.
#[derive(Debug, Clone)]
pub struct DirectorySchemaSource {
    dir: PathBuf,
}

impl DirectorySchemaSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl SchemaSource for DirectorySchemaSource {
    async fn load_schema(&self, module: &str) -> anyhow::Result<Option<ConfigSchema>> {
        if module.is_empty() || module.contains(['/', '\\']) || module.contains("..") {
            warn!(module = %module, "Refusing to look up schema for unsafe module name");
            return Ok(None);
        }

        for ext in SCHEMA_EXTENSIONS {
            let path = self.dir.join(format!("{}.{}", module, ext));
            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    debug!(path = %path.display(), "Loading schema on demand");
                    let doc = parse_document(&path, &text)?;
                    let schema = ConfigSchema::from_value(module, &doc)?;
                    return Ok(Some(schema));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            }
        }
        Ok(None)
    }
}
