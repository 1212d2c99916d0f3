//! Configuration schemas declared by modules.
//!
//! A schema is a tree: each key is either a leaf [`KeyDescriptor`] (default
//! value, validators, metadata) or a nested group holding another
//! [`ConfigSchema`]. The tree shape is what the resolver uses to detect
//! malformed overrides structurally.
//!
//! ## Document form
//! ```yaml
//! title:
//!   default: "Patient list"
//!   description: Heading shown above the list
//!   type: string
//! paging:
//!   size:
//!     default: 25
//!     validators:
//!       - { min: 1, max: 100 }
//! apiKey:
//!   required: true
//! ```
//! An object with a `default` or `required` key is a leaf; any other object
//! is a group.

pub mod registry;
pub mod validate;

pub use registry::SchemaRegistry;
pub use validate::{Validator, ValueType};

use crate::error::{EngineError, EngineResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Description of one leaf configuration key.
#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    /// Default value; `None` only for required keys.
    pub default: Option<Value>,
    /// Whether some layer must supply the value.
    pub required: bool,
    pub description: Option<String>,
    /// Declared type, also installed as the first validator.
    pub value_type: Option<ValueType>,
    pub validators: Vec<Validator>,
}

impl KeyDescriptor {
    /// A leaf with a default value.
    pub fn with_default(default: Value) -> Self {
        Self {
            default: Some(default),
            required: false,
            description: None,
            value_type: None,
            validators: Vec::new(),
        }
    }

    /// A leaf with no default that some override layer must supply.
    pub fn required() -> Self {
        Self {
            default: None,
            required: true,
            description: None,
            value_type: None,
            validators: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Whether an object may be supplied for this leaf without being malformed.
    pub fn accepts_object(&self) -> bool {
        match self.value_type {
            Some(ValueType::Object) | Some(ValueType::Any) => true,
            Some(_) => false,
            None => self.default.as_ref().is_none_or(|d| d.is_object()),
        }
    }

    /// Run the declared type and every validator. Returns the first failure.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if let Some(ty) = self.value_type {
            Validator::Type(ty).check(value)?;
        }
        for validator in &self.validators {
            validator.check(value)?;
        }
        Ok(())
    }

    /// Value the key starts from before any layer applies.
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    fn from_value(module: &str, path: &str, obj: &Map<String, Value>) -> EngineResult<Self> {
        let required = match obj.get("required") {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(EngineError::invalid_schema(
                    module,
                    format!("{}: required must be a boolean, got {}", path, other),
                ));
            }
        };
        let default = obj.get("default").cloned();
        if default.is_none() && !required {
            return Err(EngineError::invalid_schema(
                module,
                format!("{}: leaf needs a default or required: true", path),
            ));
        }

        let value_type = match obj.get("type") {
            None => None,
            Some(ty) => {
                let name = ty.as_str().unwrap_or_default();
                Some(ValueType::from_str(name).ok_or_else(|| {
                    EngineError::invalid_schema(module, format!("{}: unknown type {}", path, ty))
                })?)
            }
        };

        let mut validators = Vec::new();
        match obj.get("validators") {
            None => {}
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let validator = Validator::from_value(entry).map_err(|reason| {
                        EngineError::invalid_schema(module, format!("{}: {}", path, reason))
                    })?;
                    validators.push(validator);
                }
            }
            Some(_) => {
                return Err(EngineError::invalid_schema(
                    module,
                    format!("{}: validators must be a list", path),
                ));
            }
        }

        Ok(Self {
            default,
            required,
            description: obj
                .get("description")
                .and_then(|d| d.as_str())
                .map(str::to_string),
            value_type,
            validators,
        })
    }
}

/// One node of a schema tree.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Leaf(KeyDescriptor),
    Group(ConfigSchema),
}

/// A module's declared configuration keys.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    keys: BTreeMap<String, SchemaNode>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf key.
    pub fn key(mut self, name: impl Into<String>, descriptor: KeyDescriptor) -> Self {
        self.keys.insert(name.into(), SchemaNode::Leaf(descriptor));
        self
    }

    /// Add a nested group.
    pub fn group(mut self, name: impl Into<String>, schema: ConfigSchema) -> Self {
        self.keys.insert(name.into(), SchemaNode::Group(schema));
        self
    }

    pub fn get(&self, key: &str) -> Option<&SchemaNode> {
        self.keys.get(key)
    }

    /// Look up a node by dotted path, e.g. `paging.size`.
    pub fn lookup(&self, path: &str) -> Option<&SchemaNode> {
        let mut parts = path.split('.');
        let mut node = self.keys.get(parts.next()?)?;
        for part in parts {
            match node {
                SchemaNode::Group(group) => node = group.keys.get(part)?,
                SchemaNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SchemaNode)> {
        self.keys.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// All leaves with their dotted paths, in key order.
    pub fn leaves(&self) -> Vec<(String, &KeyDescriptor)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a KeyDescriptor)>) {
        for (key, node) in &self.keys {
            let path = join_path(prefix, key);
            match node {
                SchemaNode::Leaf(desc) => out.push((path, desc)),
                SchemaNode::Group(group) => group.collect_leaves(&path, out),
            }
        }
    }

    /// The defaults tree. Required keys without a default start as `null`.
    pub fn defaults(&self) -> Map<String, Value> {
        self.keys
            .iter()
            .map(|(key, node)| {
                let value = match node {
                    SchemaNode::Leaf(desc) => desc.initial_value(),
                    SchemaNode::Group(group) => Value::Object(group.defaults()),
                };
                (key.clone(), value)
            })
            .collect()
    }

    /// Merge `other` into this schema, key by key.
    ///
    /// Groups present in both merge recursively; otherwise `other` wins.
    pub fn merge(&mut self, other: ConfigSchema) {
        for (key, incoming) in other.keys {
            match (self.keys.get_mut(&key), incoming) {
                (Some(SchemaNode::Group(existing)), SchemaNode::Group(group)) => {
                    existing.merge(group);
                }
                (_, incoming) => {
                    self.keys.insert(key, incoming);
                }
            }
        }
    }

    /// Parse a schema document.
    pub fn from_value(module: &str, value: &Value) -> EngineResult<Self> {
        let Some(obj) = value.as_object() else {
            return Err(EngineError::invalid_schema(
                module,
                format!("schema must be an object, got {}", ValueType::name_of(value)),
            ));
        };
        Self::from_map(module, "", obj)
    }

    fn from_map(module: &str, prefix: &str, obj: &Map<String, Value>) -> EngineResult<Self> {
        let mut keys = BTreeMap::new();
        for (key, node) in obj {
            let path = join_path(prefix, key);
            let Some(node_obj) = node.as_object() else {
                return Err(EngineError::invalid_schema(
                    module,
                    format!("{}: expected a key descriptor or group, got {}", path, node),
                ));
            };
            let parsed = if is_descriptor(node_obj) {
                SchemaNode::Leaf(KeyDescriptor::from_value(module, &path, node_obj)?)
            } else {
                SchemaNode::Group(Self::from_map(module, &path, node_obj)?)
            };
            keys.insert(key.clone(), parsed);
        }
        Ok(Self { keys })
    }
}

fn is_descriptor(obj: &Map<String, Value>) -> bool {
    obj.contains_key("default") || obj.contains_key("required")
}

/// Join a dotted key path.
pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_leaf_and_group() {
        let schema = ConfigSchema::from_value(
            "m",
            &json!({
                "thing": {"default": "The first thing"},
                "paging": {
                    "size": {"default": 25, "validators": [{"min": 1}]},
                    "infinite": {"default": false, "type": "boolean"}
                },
                "apiKey": {"required": true}
            }),
        )
        .unwrap();

        assert!(matches!(schema.get("thing"), Some(SchemaNode::Leaf(_))));
        assert!(matches!(schema.get("paging"), Some(SchemaNode::Group(_))));
        assert!(matches!(schema.lookup("paging.size"), Some(SchemaNode::Leaf(_))));
        assert!(schema.lookup("thing.nope").is_none());

        let leaves: Vec<String> = schema.leaves().into_iter().map(|(p, _)| p).collect();
        assert_eq!(leaves, vec!["apiKey", "paging.infinite", "paging.size", "thing"]);
    }

    #[test]
    fn test_leaf_without_default_rejected() {
        let err = ConfigSchema::from_value("m", &json!({"a": {"b": {"description": "x"}}}))
            .unwrap_err();
        // {"description": "x"} is a group whose member is not an object
        assert!(matches!(err, EngineError::InvalidSchema { .. }));

        let err = ConfigSchema::from_value("m", &json!({"a": {"required": false}})).unwrap_err();
        assert!(err.to_string().contains("needs a default"));
    }

    #[test]
    fn test_defaults_tree() {
        let schema = ConfigSchema::new()
            .key("a", KeyDescriptor::with_default(json!(1)))
            .group(
                "nested",
                ConfigSchema::new()
                    .key("b", KeyDescriptor::with_default(json!("x")))
                    .key("c", KeyDescriptor::required()),
            );
        assert_eq!(
            Value::Object(schema.defaults()),
            json!({"a": 1, "nested": {"b": "x", "c": null}})
        );
    }

    #[test]
    fn test_merge_is_additive() {
        let mut schema = ConfigSchema::new()
            .key("a", KeyDescriptor::with_default(json!(1)))
            .group(
                "g",
                ConfigSchema::new().key("x", KeyDescriptor::with_default(json!(true))),
            );
        schema.merge(
            ConfigSchema::new()
                .key("a", KeyDescriptor::with_default(json!(2)))
                .group(
                    "g",
                    ConfigSchema::new().key("y", KeyDescriptor::with_default(json!(false))),
                ),
        );
        assert_eq!(
            Value::Object(schema.defaults()),
            json!({"a": 2, "g": {"x": true, "y": false}})
        );
    }

    #[test]
    fn test_accepts_object() {
        assert!(!KeyDescriptor::with_default(json!("s")).accepts_object());
        assert!(KeyDescriptor::with_default(json!({})).accepts_object());
        assert!(KeyDescriptor::required().accepts_object());
        assert!(!KeyDescriptor::required().typed(ValueType::String).accepts_object());
        assert!(
            KeyDescriptor::with_default(json!(1))
                .typed(ValueType::Any)
                .accepts_object()
        );
    }

    #[test]
    fn test_descriptor_check_runs_type_first() {
        let desc = KeyDescriptor::with_default(json!(5))
            .typed(ValueType::Integer)
            .validator(Validator::Range {
                min: Some(1.0),
                max: None,
            });
        assert!(desc.check(&json!(3)).is_ok());
        assert_eq!(desc.check(&json!("3")).unwrap_err(), "expected integer, got string");
        assert!(desc.check(&json!(0)).is_err());
    }
}
