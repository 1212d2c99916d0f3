//! Layered configuration resolution for plugin-composed applications.
//!
//! Modules register a schema with defaults; a host registers scoped override
//! layers (global, module, slot, extension instance); the engine resolves and
//! caches one merged configuration per identity, and invalidates exactly the
//! identities a later write affects.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod overrides;
pub mod resolve;
pub mod schema;
pub mod subscriptions;
pub mod types;

pub use engine::{CacheStats, ConfigEngine, SchemaSource};
pub use error::{ConfigDiagnostic, EngineError, EngineResult, ErrorCode};
pub use overrides::{LayerRef, OverrideScope, ProvideReport};
pub use resolve::ResolvePolicy;
pub use schema::{ConfigSchema, KeyDescriptor, Validator, ValueType};
pub use types::{ConfigIdentity, ExtensionIdentity, MountContext, ResolvedConfig};
