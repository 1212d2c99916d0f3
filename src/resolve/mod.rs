//! The resolution algorithm.
//!
//! `resolve` is pure: given a registry and an override store it builds one
//! [`ResolvedConfig`] and touches nothing else.
//!
//! Order of application:
//! 1. schema defaults of the identity's own module (the extension's module,
//!    never the slot owner)
//! 2. global layers
//! 3. module layers for that module
//! 4. slot layers of the owner's slot (extensions only)
//! 5. per-instance layers (extensions only)
//!
//! and finally every leaf is validated.

pub mod merge;

use crate::error::{ConfigDiagnostic, EngineError, EngineResult};
use crate::overrides::{LayerRef, OverrideStore};
use crate::schema::{ConfigSchema, KeyDescriptor, SchemaNode, SchemaRegistry, join_path};
use crate::types::{ConfigIdentity, ResolvedConfig};
use merge::{MergeState, overlay_untyped, overlay_with_schema};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Resolution policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvePolicy {
    /// Fail with `SchemaNotFound` instead of resolving from overrides alone.
    pub strict: bool,
    /// Replace a value that fails validation with the key's default.
    pub validation_fallback: bool,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            strict: false,
            validation_fallback: true,
        }
    }
}

/// Resolves identities against one registry/store snapshot.
pub struct Resolver<'a> {
    registry: &'a SchemaRegistry,
    overrides: &'a OverrideStore,
    policy: ResolvePolicy,
    version: u64,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a SchemaRegistry, overrides: &'a OverrideStore) -> Self {
        Self {
            registry,
            overrides,
            policy: ResolvePolicy::default(),
            version: 0,
        }
    }

    pub fn with_policy(mut self, policy: ResolvePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stamp results with the snapshot version they were computed from.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn resolve(&self, identity: &ConfigIdentity) -> EngineResult<ResolvedConfig> {
        let module = identity.schema_module();
        let schema = self.registry.get(module);

        let mut state = MergeState::default();
        let mut values: Map<String, Value> = match schema {
            Some(ref schema) => {
                state.record_defaults(schema);
                schema.defaults()
            }
            None if self.policy.strict => {
                return Err(EngineError::SchemaNotFound(module.to_string()));
            }
            None => {
                debug!(module = %module, "No schema registered, resolving from overrides only");
                state
                    .diagnostics
                    .push(ConfigDiagnostic::schema_not_found(module));
                Map::new()
            }
        };

        let layers = self.overrides.layers_for(identity);
        for layer in &layers {
            let layer_ref = layer.layer_ref();
            match schema {
                Some(ref schema) => overlay_with_schema(
                    schema,
                    module,
                    &mut values,
                    &layer.tree,
                    "",
                    &layer_ref,
                    &mut state,
                ),
                None => overlay_untyped(&mut values, &layer.tree, "", &layer_ref, &mut state),
            }
        }

        if let Some(ref schema) = schema {
            self.validate(schema, &mut values, &mut state);
        }

        for diag in state.diagnostics.iter().filter(|d| d.is_error()) {
            warn!(identity = %identity, code = ?diag.code, "{}", diag);
        }
        debug!(
            identity = %identity,
            layers = layers.len(),
            diagnostics = state.diagnostics.len(),
            "Resolved configuration"
        );

        Ok(ResolvedConfig::new(
            identity.clone(),
            values,
            state.provenance,
            state.diagnostics,
            self.version,
        ))
    }

    /// Check every leaf's final value.
    ///
    /// A failing value is reported with the layer it came from and, under the
    /// default policy, replaced by the key's own default. Siblings are never
    /// affected.
    fn validate(&self, schema: &ConfigSchema, values: &mut Map<String, Value>, state: &mut MergeState) {
        self.validate_group(schema, values, "", state);
    }

    /// Walk the schema and the value tree together, one key at a time, so a
    /// key name containing `.` is matched as a single segment.
    fn validate_group(
        &self,
        schema: &ConfigSchema,
        values: &mut Map<String, Value>,
        prefix: &str,
        state: &mut MergeState,
    ) {
        for (key, node) in schema.iter() {
            let path = join_path(prefix, key);
            let Some(value) = values.get_mut(key) else {
                if let SchemaNode::Leaf(desc) = node
                    && desc.required
                {
                    state.diagnostics.push(ConfigDiagnostic::required_missing(&path));
                }
                continue;
            };
            match node {
                SchemaNode::Group(group) => {
                    if let Value::Object(children) = value {
                        self.validate_group(group, children, &path, state);
                    }
                }
                SchemaNode::Leaf(desc) => self.validate_leaf(desc, value, path, state),
            }
        }
    }

    fn validate_leaf(&self, desc: &KeyDescriptor, value: &mut Value, path: String, state: &mut MergeState) {
        if value.is_null() {
            if desc.required {
                state.diagnostics.push(ConfigDiagnostic::required_missing(&path));
            }
            return;
        }
        let Err(reason) = desc.check(value) else {
            return;
        };

        let source = state
            .provenance
            .get(&path)
            .cloned()
            .unwrap_or(LayerRef::Default);
        state.diagnostics.push(ConfigDiagnostic::validation_failure(
            &path,
            &reason,
            value.clone(),
            source.clone(),
        ));

        if self.policy.validation_fallback
            && source != LayerRef::Default
            && let Some(ref default) = desc.default
        {
            *value = default.clone();
            state.provenance.insert(path, LayerRef::Default);
        }
    }
}
