//! Core types: resolution identities and resolved configuration snapshots.

use crate::error::ConfigDiagnostic;
use crate::overrides::LayerRef;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One mounted instance of a module's extension inside a host's slot.
///
/// Two instances of the same module are distinct resolution targets when
/// their id, slot, or owner differ, even though they share a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtensionIdentity {
    /// Instance id, e.g. `fooExt` or `barExt#id1`.
    pub extension_id: String,
    /// Module that supplies the extension and owns its schema.
    pub extension_module: String,
    /// Slot the extension is mounted in.
    pub slot_name: String,
    /// Host module that owns the slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owning_module: Option<String>,
}

impl ExtensionIdentity {
    pub fn new(
        extension_id: impl Into<String>,
        extension_module: impl Into<String>,
        slot_name: impl Into<String>,
    ) -> Self {
        Self {
            extension_id: extension_id.into(),
            extension_module: extension_module.into(),
            slot_name: slot_name.into(),
            owning_module: None,
        }
    }

    pub fn owned_by(mut self, owning_module: impl Into<String>) -> Self {
        self.owning_module = Some(owning_module.into());
        self
    }
}

/// What a resolution request is for: a module's own configuration, or the
/// configuration one mounted extension instance sees.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigIdentity {
    Module(String),
    Extension(ExtensionIdentity),
}

impl ConfigIdentity {
    pub fn module(name: impl Into<String>) -> Self {
        ConfigIdentity::Module(name.into())
    }

    /// The module whose schema applies.
    ///
    /// For an extension this is the extension's own module, not the owner.
    pub fn schema_module(&self) -> &str {
        match self {
            ConfigIdentity::Module(name) => name,
            ConfigIdentity::Extension(ext) => &ext.extension_module,
        }
    }

    pub fn extension(&self) -> Option<&ExtensionIdentity> {
        match self {
            ConfigIdentity::Module(_) => None,
            ConfigIdentity::Extension(ext) => Some(ext),
        }
    }
}

impl From<ExtensionIdentity> for ConfigIdentity {
    fn from(ext: ExtensionIdentity) -> Self {
        ConfigIdentity::Extension(ext)
    }
}

impl fmt::Display for ConfigIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIdentity::Module(name) => write!(f, "{}", name),
            ConfigIdentity::Extension(ext) => {
                write!(f, "{}", ext.extension_module)?;
                match ext.owning_module {
                    Some(ref owner) => write!(f, "@{}/{}", owner, ext.slot_name)?,
                    None => write!(f, "@{}", ext.slot_name)?,
                }
                write!(f, "#{}", ext.extension_id)
            }
        }
    }
}

/// Extension half of a [`MountContext`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMount {
    pub extension_id: String,
    pub extension_module: String,
    pub slot_name: String,
}

/// Position of a caller in the host application's component tree.
///
/// The presentation layer knows which module is rendering and, when rendering
/// inside a slot, which extension instance. `identity()` turns that ambient
/// position into the explicit identity every engine call takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountContext {
    /// Module currently rendering (the slot owner when inside an extension).
    pub module_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<ExtensionMount>,
}

impl MountContext {
    pub fn module(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            extension: None,
        }
    }

    pub fn with_extension(
        mut self,
        slot_name: impl Into<String>,
        extension_module: impl Into<String>,
        extension_id: impl Into<String>,
    ) -> Self {
        self.extension = Some(ExtensionMount {
            extension_id: extension_id.into(),
            extension_module: extension_module.into(),
            slot_name: slot_name.into(),
        });
        self
    }

    pub fn identity(&self) -> ConfigIdentity {
        match self.extension {
            None => ConfigIdentity::Module(self.module_name.clone()),
            Some(ref ext) => ConfigIdentity::Extension(ExtensionIdentity {
                extension_id: ext.extension_id.clone(),
                extension_module: ext.extension_module.clone(),
                slot_name: ext.slot_name.clone(),
                owning_module: Some(self.module_name.clone()),
            }),
        }
    }
}

/// Fully merged configuration for one identity at one point in time.
///
/// Immutable: a change to a contributing schema or layer produces a new
/// snapshot rather than mutating this one.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub identity: ConfigIdentity,
    values: Map<String, Value>,
    /// Dotted leaf path -> layer its final value came from.
    provenance: BTreeMap<String, LayerRef>,
    diagnostics: Vec<ConfigDiagnostic>,
    /// Engine snapshot version this was computed from.
    pub version: u64,
    pub resolved_at: DateTime<Utc>,
}

impl ResolvedConfig {
    pub(crate) fn new(
        identity: ConfigIdentity,
        values: Map<String, Value>,
        provenance: BTreeMap<String, LayerRef>,
        diagnostics: Vec<ConfigDiagnostic>,
        version: u64,
    ) -> Self {
        Self {
            identity,
            values,
            provenance,
            diagnostics,
            version,
            resolved_at: Utc::now(),
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The merged tree as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Look up a value by dotted path.
    ///
    /// Key names that themselves contain `.` are matched too; the longest
    /// matching key wins at each level.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.values, path)
    }

    /// Look up and deserialize a value by dotted path.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.get(path)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Deserialize the whole tree into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.to_value())
    }

    /// Layer the value at `path` came from.
    pub fn source_of(&self, path: &str) -> Option<&LayerRef> {
        self.provenance.get(path)
    }

    pub fn provenance(&self) -> &BTreeMap<String, LayerRef> {
        &self.provenance
    }

    pub fn diagnostics(&self) -> &[ConfigDiagnostic] {
        &self.diagnostics
    }

    /// Diagnostics that are errors rather than information.
    pub fn errors(&self) -> impl Iterator<Item = &ConfigDiagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Value equality, ignoring timestamps and snapshot versions.
    pub fn same_values(&self, other: &ResolvedConfig) -> bool {
        self.identity == other.identity
            && self.values == other.values
            && self.diagnostics == other.diagnostics
    }
}

fn lookup<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if let Some(value) = map.get(path) {
        return Some(value);
    }
    for (i, _) in path.rmatch_indices('.') {
        if let Some(Value::Object(child)) = map.get(&path[..i])
            && let Some(value) = lookup(child, &path[i + 1..])
        {
            return Some(value);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mount_context_identity() {
        let ctx = MountContext::module("slot-2-module").with_extension("slot2", "foo-module", "fooExt");
        let identity = ctx.identity();
        assert_eq!(identity.schema_module(), "foo-module");
        let ext = identity.extension().unwrap();
        assert_eq!(ext.owning_module.as_deref(), Some("slot-2-module"));
        assert_eq!(identity.to_string(), "foo-module@slot-2-module/slot2#fooExt");

        let own = MountContext::module("slot-2-module").identity();
        assert_eq!(own, ConfigIdentity::module("slot-2-module"));
        assert_eq!(own.to_string(), "slot-2-module");
    }

    #[test]
    fn test_extension_instances_are_distinct() {
        let a: ConfigIdentity = ExtensionIdentity::new("fooExt", "foo-module", "slot1").into();
        let b: ConfigIdentity = ExtensionIdentity::new("fooExt", "foo-module", "slot2").into();
        assert_ne!(a, b);
        assert_eq!(a.schema_module(), b.schema_module());
    }

    #[test]
    fn test_resolved_get_paths() {
        let values = json!({"a": {"b": {"c": 3}}, "s": "x"});
        let resolved = ResolvedConfig::new(
            ConfigIdentity::module("m"),
            values.as_object().unwrap().clone(),
            BTreeMap::new(),
            Vec::new(),
            1,
        );
        assert_eq!(resolved.get("a.b.c"), Some(&json!(3)));
        assert_eq!(resolved.get_as::<i64>("a.b.c"), Some(3));
        assert!(resolved.get("s.x").is_none());
        assert!(resolved.get("missing").is_none());
        assert!(!resolved.has_errors());
    }

    #[test]
    fn test_resolved_get_dotted_key_names() {
        let values = json!({"retry.count": 3, "api": {"key.id": "k", "key": {"id": "nested"}}});
        let resolved = ResolvedConfig::new(
            ConfigIdentity::module("m"),
            values.as_object().unwrap().clone(),
            BTreeMap::new(),
            Vec::new(),
            1,
        );
        assert_eq!(resolved.get("retry.count"), Some(&json!(3)));
        assert_eq!(resolved.get("api.key.id"), Some(&json!("k")));
        assert!(resolved.get("retry").is_none());
    }
}
