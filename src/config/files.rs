//! Schema and override documents on disk.
//!
//! - `schema_dir/<module>.{yaml,yml,json}`: the schema document for `<module>`
//! - `overrides_dir/*.{yaml,yml,json}`: provide payloads, applied in file-name
//!   order; `_global.*` holds a plain tree applied to every identity

use crate::engine::ConfigEngine;
use crate::error::{ConfigDiagnostic, EngineError, EngineResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extensions recognised as documents, in lookup order.
pub const SCHEMA_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// File stem of the global override document.
pub const GLOBAL_STEM: &str = "_global";

/// Parse a document, choosing JSON or YAML from the file extension.
pub fn parse_document(path: &Path, text: &str) -> EngineResult<Value> {
    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let value = if is_json {
        serde_json::from_str(text).map_err(|e| EngineError::document(path.display(), e))?
    } else {
        serde_yaml::from_str(text).map_err(|e| EngineError::document(path.display(), e))?
    };
    Ok(value)
}

pub fn read_document(path: &Path) -> EngineResult<Value> {
    let text =
        std::fs::read_to_string(path).map_err(|e| EngineError::document(path.display(), e))?;
    parse_document(path, &text)
}

/// Whether `path` names a document file.
pub fn is_document(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SCHEMA_EXTENSIONS.contains(&ext))
}

/// Document files directly inside `dir`, sorted by file name.
///
/// A missing directory holds no documents.
pub fn document_files(dir: &Path) -> EngineResult<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::document(dir.display(), e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| EngineError::document(dir.display(), e))?
            .path();
        if path.is_file() && is_document(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
}

/// A schema document and the module it belongs to.
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub module: String,
    pub path: PathBuf,
    pub document: Value,
}

/// An override document.
#[derive(Debug, Clone)]
pub struct OverrideDocument {
    pub path: PathBuf,
    /// `_global.*`: the whole document is one global layer.
    pub global: bool,
    pub document: Value,
}

/// Everything read from the schema and override directories.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    pub schemas: Vec<SchemaDocument>,
    pub overrides: Vec<OverrideDocument>,
}

impl DocumentSet {
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.overrides.is_empty()
    }

    /// Paths of every document, schemas first.
    pub fn paths(&self) -> Vec<&Path> {
        self.schemas
            .iter()
            .map(|d| d.path.as_path())
            .chain(self.overrides.iter().map(|d| d.path.as_path()))
            .collect()
    }

    /// Register all schemas, then all overrides, with `engine`.
    ///
    /// Returns the ingestion diagnostics of every override document.
    pub fn apply(&self, engine: &ConfigEngine) -> EngineResult<Vec<ConfigDiagnostic>> {
        for schema in &self.schemas {
            engine
                .define_schema_value(&schema.module, &schema.document)
                .map_err(|e| EngineError::document(schema.path.display(), e))?;
        }

        let mut diagnostics = Vec::new();
        for doc in &self.overrides {
            if doc.global {
                engine
                    .provide_global(doc.document.clone())
                    .map_err(|e| EngineError::document(doc.path.display(), e))?;
                continue;
            }
            let report = engine
                .provide(&doc.document)
                .map_err(|e| EngineError::document(doc.path.display(), e))?;
            debug!(
                path = %doc.path.display(),
                layers = report.layer_count(),
                "Applied override document"
            );
            diagnostics.extend(report.diagnostics);
        }

        info!(
            schemas = self.schemas.len(),
            overrides = self.overrides.len(),
            diagnostics = diagnostics.len(),
            "Documents applied"
        );
        Ok(diagnostics)
    }
}

/// Read schema and override documents. Either directory may be absent.
pub fn load_documents(
    schema_dir: Option<&Path>,
    overrides_dir: Option<&Path>,
) -> EngineResult<DocumentSet> {
    let mut set = DocumentSet::default();

    if let Some(dir) = schema_dir {
        for path in document_files(dir)? {
            let Some(module) = file_stem(&path) else {
                continue;
            };
            let document = read_document(&path)?;
            set.schemas.push(SchemaDocument {
                module,
                path,
                document,
            });
        }
    }

    if let Some(dir) = overrides_dir {
        for path in document_files(dir)? {
            let global = file_stem(&path).as_deref() == Some(GLOBAL_STEM);
            let document = read_document(&path)?;
            // An empty file carries no layers.
            if document.is_null() {
                continue;
            }
            set.overrides.push(OverrideDocument {
                path,
                global,
                document,
            });
        }
    }

    Ok(set)
}
