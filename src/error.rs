//! Structured error types for configuration resolution.
//!
//! Two families live here:
//! - [`ConfigDiagnostic`]: a per-key report collected alongside a
//!   [`ResolvedConfig`](crate::types::ResolvedConfig). Diagnostics never abort
//!   resolution of sibling keys.
//! - [`EngineError`]: hard failures returned to the caller (strict-mode missing
//!   schema, unusable payloads, lazy loader failures).

use crate::overrides::LayerRef;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Error codes for programmatic handling of diagnostics.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Resolution
    SchemaNotFound,
    ValidationFailure,
    RequiredKeyMissing,

    // Override shape
    MalformedOverride,
    UnknownKey,

    // Definition / loading
    InvalidSchema,
    SourceFailure,
}

impl ErrorCode {
    /// Whether this code means a value the caller sees is not what was asked for.
    ///
    /// `SchemaNotFound` in lenient mode and `UnknownKey` are informational.
    pub fn is_error(&self) -> bool {
        !matches!(self, ErrorCode::SchemaNotFound | ErrorCode::UnknownKey)
    }
}

/// A per-key problem found while ingesting or resolving configuration.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConfigDiagnostic {
    pub code: ErrorCode,
    pub message: String,
    /// Dotted key path, e.g. `server.port`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// Override layer the offending value came from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerRef>,
    /// The offending value, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ConfigDiagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            key_path: None,
            layer: None,
            value: None,
        }
    }

    pub fn with_key(mut self, key_path: impl Into<String>) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    pub fn with_layer(mut self, layer: LayerRef) -> Self {
        self.layer = Some(layer);
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    // Convenience constructors

    pub fn schema_not_found(module: &str) -> Self {
        Self::new(
            ErrorCode::SchemaNotFound,
            format!("No schema registered for module {}; using overrides only", module),
        )
    }

    pub fn validation_failure(key_path: &str, reason: &str, value: Value, layer: LayerRef) -> Self {
        Self::new(
            ErrorCode::ValidationFailure,
            format!("Invalid value for {}: {}", key_path, reason),
        )
        .with_key(key_path)
        .with_value(value)
        .with_layer(layer)
    }

    pub fn required_missing(key_path: &str) -> Self {
        Self::new(
            ErrorCode::RequiredKeyMissing,
            format!("{} is required but no layer provides a value", key_path),
        )
        .with_key(key_path)
    }

    pub fn malformed(key_path: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MalformedOverride,
            format!("Malformed override at {}: {}", key_path, reason),
        )
        .with_key(key_path)
    }

    pub fn unknown_key(key_path: &str, module: &str) -> Self {
        Self::new(
            ErrorCode::UnknownKey,
            format!("{} is not declared in the schema of {}", key_path, module),
        )
        .with_key(key_path)
    }

    /// Whether this diagnostic reports an error rather than information.
    pub fn is_error(&self) -> bool {
        self.code.is_error()
    }
}

impl fmt::Display for ConfigDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref layer) = self.layer {
            write!(f, " (from {})", layer)?;
        }
        Ok(())
    }
}

/// Hard failures surfaced to callers instead of being collected.
///
/// `Clone` because one in-flight resolution hands its outcome to every waiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("no schema registered for module {0}")]
    SchemaNotFound(String),

    #[error("invalid schema for module {module}: {reason}")]
    InvalidSchema { module: String, reason: String },

    #[error("malformed provide payload: {0}")]
    MalformedProvide(String),

    #[error("schema source failed for module {module}: {reason}")]
    Source { module: String, reason: String },

    #[error("failed to load {path}: {reason}")]
    Document { path: String, reason: String },
}

impl EngineError {
    pub fn invalid_schema(module: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidSchema {
            module: module.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn source(module: &str, err: impl fmt::Display) -> Self {
        Self::Source {
            module: module.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn document(path: impl fmt::Display, err: impl fmt::Display) -> Self {
        Self::Document {
            path: path.to_string(),
            reason: err.to_string(),
        }
    }

    /// Map a hard failure onto the diagnostic code space, for reporting.
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::SchemaNotFound(_) => ErrorCode::SchemaNotFound,
            EngineError::InvalidSchema { .. } => ErrorCode::InvalidSchema,
            EngineError::MalformedProvide(_) => ErrorCode::MalformedOverride,
            EngineError::Source { .. } | EngineError::Document { .. } => ErrorCode::SourceFailure,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
