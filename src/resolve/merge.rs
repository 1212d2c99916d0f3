//! Deep merge of configuration trees.
//!
//! Two flavours:
//! - [`deep_merge`]: plain JSON merge, used for the tool's own settings tiers
//!   and for modules that have no registered schema.
//! - [`overlay_with_schema`]: merge guided by a [`ConfigSchema`], which knows
//!   where groups and leaves are and so can report shape mismatches instead of
//!   silently replacing a group with a scalar.
//!
//! In both, `null` in an overlay means "not specified" and keeps the base.

use crate::error::ConfigDiagnostic;
use crate::overrides::LayerRef;
use crate::schema::{ConfigSchema, SchemaNode, ValueType, join_path};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// - Objects are merged recursively: keys in overlay override keys in base
/// - Arrays, strings, numbers, booleans are replaced entirely
/// - If overlay is null, the base value is preserved
///
/// # Example
/// ```
/// use serde_json::json;
/// use module_config::resolve::merge::deep_merge;
///
/// let base = json!({"paging": {"size": 25, "infinite": false}});
/// let overlay = json!({"paging": {"size": 10}});
/// assert_eq!(
///     deep_merge(base, overlay),
///     json!({"paging": {"size": 10, "infinite": false}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = if let Some(base_value) = base_map.remove(&key) {
                    deep_merge(base_value, overlay_value)
                } else {
                    overlay_value
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge multiple values in order, with later values taking precedence.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

/// Bookkeeping carried through one resolution.
#[derive(Debug, Default)]
pub struct MergeState {
    /// Dotted leaf path -> layer that last wrote it.
    pub provenance: BTreeMap<String, LayerRef>,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

impl MergeState {
    /// Record `layer` as the source of the leaf at `path`.
    fn set_leaf(&mut self, path: &str, layer: &LayerRef) {
        self.provenance.insert(path.to_string(), layer.clone());
    }

    /// Record `layer` as the source of `value` written at `path`, replacing
    /// whatever was recorded below that path.
    fn set_tree(&mut self, path: &str, value: &Value, layer: &LayerRef) {
        let nested = format!("{}.", path);
        self.provenance
            .retain(|p, _| p != path && !p.starts_with(&nested));
        self.record_leaves(path, value, layer);
    }

    fn record_leaves(&mut self, path: &str, value: &Value, layer: &LayerRef) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    self.record_leaves(&join_path(path, key), child, layer);
                }
            }
            _ => self.set_leaf(path, layer),
        }
    }

    /// Seed provenance for the default tree.
    pub fn record_defaults(&mut self, schema: &ConfigSchema) {
        for (path, _) in schema.leaves() {
            self.set_leaf(&path, &LayerRef::Default);
        }
    }
}

/// Overlay `overlay` onto `target` for a module without a schema.
///
/// Every key flows through; nested objects merge recursively.
pub fn overlay_untyped(
    target: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    prefix: &str,
    layer: &LayerRef,
    state: &mut MergeState,
) {
    for (key, value) in overlay {
        if value.is_null() {
            continue;
        }
        let path = join_path(prefix, key);
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                overlay_untyped(existing, incoming, &path, layer, state);
            }
            _ => {
                target.insert(key.clone(), value.clone());
                state.set_tree(&path, value, layer);
            }
        }
    }
}

/// Overlay `overlay` onto `target`, following the shape of `schema`.
///
/// - keys not declared in the schema are reported and dropped
/// - a group given a non-object is reported as malformed and skipped
/// - a leaf given an object it cannot hold is reported as malformed and skipped
/// - leaves are replaced wholesale; only groups merge recursively
pub fn overlay_with_schema(
    schema: &ConfigSchema,
    module: &str,
    target: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    prefix: &str,
    layer: &LayerRef,
    state: &mut MergeState,
) {
    for (key, value) in overlay {
        if value.is_null() {
            continue;
        }
        let path = join_path(prefix, key);
        match schema.get(key) {
            None => {
                state.diagnostics.push(
                    ConfigDiagnostic::unknown_key(&path, module)
                        .with_layer(layer.clone())
                        .with_value(value.clone()),
                );
            }
            Some(SchemaNode::Group(group)) => {
                let Some(incoming) = value.as_object() else {
                    state.diagnostics.push(
                        ConfigDiagnostic::malformed(
                            &path,
                            format!("expected a group, got {}", ValueType::name_of(value)),
                        )
                        .with_layer(layer.clone())
                        .with_value(value.clone()),
                    );
                    continue;
                };
                let entry = target
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(group.defaults()));
                if !entry.is_object() {
                    *entry = Value::Object(group.defaults());
                }
                if let Value::Object(existing) = entry {
                    overlay_with_schema(group, module, existing, incoming, &path, layer, state);
                }
            }
            Some(SchemaNode::Leaf(desc)) => {
                if value.is_object() && !desc.accepts_object() {
                    state.diagnostics.push(
                        ConfigDiagnostic::malformed(&path, "expected a value, got a nested object")
                            .with_layer(layer.clone())
                            .with_value(value.clone()),
                    );
                    continue;
                }
                target.insert(key.clone(), value.clone());
                state.set_leaf(&path, layer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::overrides::OverrideScope;
    use crate::schema::KeyDescriptor;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn module_layer(seq: u64) -> LayerRef {
        LayerRef::Override {
            scope: OverrideScope::module("m"),
            seq,
        }
    }

    #[test]
    fn test_merge_nested_objects() {
        let base = json!({
            "server": {"host": "localhost", "port": 8080},
            "debug": true
        });
        let overlay = json!({"server": {"port": 9000}});
        assert_eq!(
            deep_merge(base, overlay),
            json!({"server": {"host": "localhost", "port": 9000}, "debug": true})
        );
    }

    #[test]
    fn test_arrays_replaced_not_merged() {
        let result = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4, 5]}));
        assert_eq!(result, json!({"items": [4, 5]}));
    }

    #[test]
    fn test_null_preserves_base() {
        let base = json!({"a": 1, "b": {"c": 2}});
        let overlay = json!({"a": null, "b": {"c": null}});
        assert_eq!(deep_merge(base, overlay), json!({"a": 1, "b": {"c": 2}}));
    }

    #[test]
    fn test_merge_all() {
        let values = vec![json!({"a": 1}), json!({"b": 2}), json!({"a": 3, "c": 4})];
        assert_eq!(deep_merge_all(values), json!({"a": 3, "b": 2, "c": 4}));
    }

    #[test]
    fn test_schema_overlay_keeps_sibling_defaults() {
        let schema = ConfigSchema::new().group(
            "a",
            ConfigSchema::new()
                .key("b", KeyDescriptor::with_default(json!(1)))
                .key("c", KeyDescriptor::with_default(json!(2))),
        );
        let mut target = schema.defaults();
        let mut state = MergeState::default();
        state.record_defaults(&schema);

        overlay_with_schema(
            &schema,
            "m",
            &mut target,
            &obj(json!({"a": {"b": 10}})),
            "",
            &module_layer(1),
            &mut state,
        );

        assert_eq!(Value::Object(target), json!({"a": {"b": 10, "c": 2}}));
        assert_eq!(state.provenance["a.b"], module_layer(1));
        assert_eq!(state.provenance["a.c"], LayerRef::Default);
        assert!(state.diagnostics.is_empty());
    }

    #[test]
    fn test_schema_overlay_reports_shape_mismatches() {
        let schema = ConfigSchema::new()
            .key("leaf", KeyDescriptor::with_default(json!("x")))
            .group(
                "group",
                ConfigSchema::new().key("inner", KeyDescriptor::with_default(json!(true))),
            );
        let mut target = schema.defaults();
        let mut state = MergeState::default();

        overlay_with_schema(
            &schema,
            "m",
            &mut target,
            &obj(json!({
                "leaf": {"oops": 1},
                "group": "flat",
                "extra": 3
            })),
            "",
            &module_layer(2),
            &mut state,
        );

        assert_eq!(
            Value::Object(target),
            json!({"leaf": "x", "group": {"inner": true}})
        );
        let codes: Vec<(ErrorCode, Option<&str>)> = state
            .diagnostics
            .iter()
            .map(|d| (d.code, d.key_path.as_deref()))
            .collect();
        assert_eq!(
            codes,
            vec![
                (ErrorCode::UnknownKey, Some("extra")),
                (ErrorCode::MalformedOverride, Some("group")),
                (ErrorCode::MalformedOverride, Some("leaf")),
            ]
        );
    }

    #[test]
    fn test_object_leaf_replaced_wholesale() {
        let schema = ConfigSchema::new().key(
            "headers",
            KeyDescriptor::with_default(json!({"a": "1", "b": "2"})),
        );
        let mut target = schema.defaults();
        let mut state = MergeState::default();
        overlay_with_schema(
            &schema,
            "m",
            &mut target,
            &obj(json!({"headers": {"c": "3"}})),
            "",
            &module_layer(3),
            &mut state,
        );
        assert_eq!(Value::Object(target), json!({"headers": {"c": "3"}}));
    }

    #[test]
    fn test_untyped_overlay_tracks_replaced_subtrees() {
        let mut target = obj(json!({"a": {"x": 1, "y": 2}}));
        let mut state = MergeState::default();
        state.record_leaves("a", &json!({"x": 1, "y": 2}), &LayerRef::Default);

        overlay_untyped(
            &mut target,
            &obj(json!({"a": {"x": 5}, "b": [1]})),
            "",
            &module_layer(4),
            &mut state,
        );
        assert_eq!(Value::Object(target.clone()), json!({"a": {"x": 5, "y": 2}, "b": [1]}));
        assert_eq!(state.provenance["a.x"], module_layer(4));
        assert_eq!(state.provenance["a.y"], LayerRef::Default);
        assert_eq!(state.provenance["b"], module_layer(4));

        overlay_untyped(
            &mut target,
            &obj(json!({"a": 7})),
            "",
            &module_layer(5),
            &mut state,
        );
        assert_eq!(target["a"], json!(7));
        assert!(!state.provenance.contains_key("a.y"));
        assert_eq!(state.provenance["a"], module_layer(5));
    }
}
