//! Parsing of module-keyed `provide` payloads into scoped layers.
//!
//! ```yaml
//! slot-2-module:            # owning module
//!   title: "Own override"   # direct keys: module scope for slot-2-module
//!   configOverrides:        # same as direct keys, applied after them
//!     paging: { size: 10 }
//!   extensions:
//!     slot2:
//!       config:             # every extension mounted in slot2
//!         compact: true
//!       configure:
//!         fooExt:           # only the fooExt instance in slot2
//!           thing: "another thing"
//! ```
//!
//! Under a slot, any other key holding an object is shorthand for
//! `configure.<key>` and must be an object. The slot composition keys (`add`,
//! `remove`, `order`) are not configuration; they are skipped with a warning.

use super::OverrideScope;
use crate::error::{ConfigDiagnostic, EngineError, EngineResult, ErrorCode};
use crate::schema::ValueType;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

const EXTENSIONS_KEY: &str = "extensions";
const CONFIG_OVERRIDES_KEY: &str = "configOverrides";
const SLOT_CONFIG_KEY: &str = "config";
const SLOT_CONFIGURE_KEY: &str = "configure";
const SLOT_COMPOSITION_KEYS: [&str; 3] = ["add", "remove", "order"];

/// Layers extracted from one payload plus the subtrees that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct ParsedProvide {
    pub layers: Vec<(OverrideScope, Map<String, Value>)>,
    pub diagnostics: Vec<ConfigDiagnostic>,
}

/// Outcome of a `provide` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvideReport {
    /// Scopes of the layers that were registered, in registration order.
    pub scopes: Vec<OverrideScope>,
    /// Sequence numbers assigned to those layers.
    pub seqs: Vec<u64>,
    /// Malformed or ignored parts of the payload.
    pub diagnostics: Vec<ConfigDiagnostic>,
}

impl ProvideReport {
    pub fn layer_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Split a payload into scoped layers.
///
/// Fails only when the top level is not an object; every deeper shape problem
/// becomes a diagnostic and the offending subtree is skipped.
pub fn parse_provide(payload: &Value) -> EngineResult<ParsedProvide> {
    let Some(modules) = payload.as_object() else {
        return Err(EngineError::MalformedProvide(format!(
            "expected an object keyed by module, got {}",
            ValueType::name_of(payload)
        )));
    };

    let mut parsed = ParsedProvide::default();
    for (module, body) in modules {
        let Some(body) = expect_object(body, module, &mut parsed.diagnostics) else {
            continue;
        };
        parse_module(module, body, &mut parsed);
    }
    Ok(parsed)
}

fn parse_module(module: &str, body: &Map<String, Value>, parsed: &mut ParsedProvide) {
    let mut own: Map<String, Value> = body
        .iter()
        .filter(|(k, _)| k.as_str() != EXTENSIONS_KEY && k.as_str() != CONFIG_OVERRIDES_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if let Some(extra) = body.get(CONFIG_OVERRIDES_KEY) {
        let path = format!("{}.{}", module, CONFIG_OVERRIDES_KEY);
        if let Some(extra) = expect_object(extra, &path, &mut parsed.diagnostics) {
            for (k, v) in extra {
                own.insert(k.clone(), v.clone());
            }
        }
    }

    if !own.is_empty() {
        parsed.layers.push((OverrideScope::module(module), own));
    }

    if let Some(extensions) = body.get(EXTENSIONS_KEY) {
        let path = format!("{}.{}", module, EXTENSIONS_KEY);
        if let Some(slots) = expect_object(extensions, &path, &mut parsed.diagnostics) {
            for (slot, slot_body) in slots {
                let slot_path = format!("{}.{}", path, slot);
                if let Some(slot_body) = expect_object(slot_body, &slot_path, &mut parsed.diagnostics) {
                    parse_slot(module, slot, &slot_path, slot_body, parsed);
                }
            }
        }
    }
}

fn parse_slot(
    owner: &str,
    slot: &str,
    slot_path: &str,
    slot_body: &Map<String, Value>,
    parsed: &mut ParsedProvide,
) {
    for (key, value) in slot_body {
        let path = format!("{}.{}", slot_path, key);
        match key.as_str() {
            SLOT_CONFIG_KEY => {
                if let Some(tree) = expect_object(value, &path, &mut parsed.diagnostics)
                    && !tree.is_empty()
                {
                    parsed
                        .layers
                        .push((OverrideScope::slot(owner, slot), tree.clone()));
                }
            }
            SLOT_CONFIGURE_KEY => {
                let Some(instances) = expect_object(value, &path, &mut parsed.diagnostics) else {
                    continue;
                };
                for (extension_id, tree) in instances {
                    let instance_path = format!("{}.{}", path, extension_id);
                    if let Some(tree) = expect_object(tree, &instance_path, &mut parsed.diagnostics)
                        && !tree.is_empty()
                    {
                        parsed.layers.push((
                            OverrideScope::extension(owner, slot, extension_id),
                            tree.clone(),
                        ));
                    }
                }
            }
            key if SLOT_COMPOSITION_KEYS.contains(&key) => {
                warn!(path = %path, "Ignoring slot composition key in provide payload");
                parsed.diagnostics.push(
                    ConfigDiagnostic::new(
                        ErrorCode::UnknownKey,
                        format!("{} is not an override key and was ignored", path),
                    )
                    .with_key(path),
                );
            }
            extension_id => {
                if let Some(tree) = expect_object(value, &path, &mut parsed.diagnostics)
                    && !tree.is_empty()
                {
                    parsed.layers.push((
                        OverrideScope::extension(owner, slot, extension_id),
                        tree.clone(),
                    ));
                }
            }
        }
    }
}

fn expect_object<'a>(
    value: &'a Value,
    path: &str,
    diagnostics: &mut Vec<ConfigDiagnostic>,
) -> Option<&'a Map<String, Value>> {
    match value.as_object() {
        Some(obj) => Some(obj),
        None => {
            let diag = ConfigDiagnostic::malformed(
                path,
                format!("expected an object, got {}", ValueType::name_of(value)),
            )
            .with_value(value.clone());
            warn!("{}", diag);
            diagnostics.push(diag);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_extension_configure() {
        let parsed = parse_provide(&json!({
            "slot-2-module": {
                "extensions": {
                    "slot2": {
                        "configure": {
                            "fooExt": {"thing": "another thing"}
                        }
                    }
                }
            }
        }))
        .unwrap();

        assert!(parsed.diagnostics.is_empty());
        assert_eq!(parsed.layers.len(), 1);
        let (scope, tree) = &parsed.layers[0];
        assert_eq!(
            *scope,
            OverrideScope::extension("slot-2-module", "slot2", "fooExt")
        );
        assert_eq!(tree["thing"], "another thing");
    }

    #[test]
    fn test_parse_module_slot_and_config_overrides() {
        let parsed = parse_provide(&json!({
            "host": {
                "title": "direct",
                "configOverrides": {"title": "later", "size": 3},
                "extensions": {
                    "main": {
                        "config": {"compact": true},
                        "order": ["a", "b"]
                    }
                }
            }
        }))
        .unwrap();

        let scopes: Vec<&OverrideScope> = parsed.layers.iter().map(|(s, _)| s).collect();
        assert_eq!(
            scopes,
            vec![
                &OverrideScope::module("host"),
                &OverrideScope::slot("host", "main")
            ]
        );
        assert_eq!(parsed.layers[0].1["title"], "later");
        assert_eq!(parsed.layers[0].1["size"], 3);

        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].code, ErrorCode::UnknownKey);
        assert_eq!(
            parsed.diagnostics[0].key_path.as_deref(),
            Some("host.extensions.main.order")
        );
    }

    #[test]
    fn test_malformed_subtrees_skipped() {
        let parsed = parse_provide(&json!({
            "bad": 5,
            "good": {"a": 1, "extensions": {"s": {"configure": {"x": "nope", "y": {"b": 2}}}}}
        }))
        .unwrap();

        assert_eq!(parsed.layers.len(), 2);
        let paths: Vec<&str> = parsed
            .diagnostics
            .iter()
            .filter_map(|d| d.key_path.as_deref())
            .collect();
        assert_eq!(paths, vec!["bad", "good.extensions.s.configure.x"]);
        assert!(
            parsed
                .diagnostics
                .iter()
                .all(|d| d.code == ErrorCode::MalformedOverride)
        );
    }

    #[test]
    fn test_bare_extension_id_under_slot() {
        let parsed = parse_provide(&json!({
            "host": {
                "extensions": {
                    "main": {
                        "barExt": {"size": 3},
                        "add": {"x": 1},
                        "remove": ["y"]
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(parsed.layers.len(), 1);
        assert_eq!(
            parsed.layers[0].0,
            OverrideScope::extension("host", "main", "barExt")
        );
        let ignored: Vec<&str> = parsed
            .diagnostics
            .iter()
            .filter_map(|d| d.key_path.as_deref())
            .collect();
        assert_eq!(
            ignored,
            vec!["host.extensions.main.add", "host.extensions.main.remove"]
        );
    }

    #[test]
    fn test_non_object_extension_under_slot_is_malformed() {
        let parsed = parse_provide(&json!({
            "host": {
                "extensions": {
                    "main": {
                        "barExt": 5,
                        "order": ["barExt"]
                    }
                }
            }
        }))
        .unwrap();

        assert!(parsed.layers.is_empty());
        let found: Vec<(ErrorCode, &str)> = parsed
            .diagnostics
            .iter()
            .map(|d| (d.code, d.key_path.as_deref().unwrap_or_default()))
            .collect();
        assert_eq!(
            found,
            vec![
                (ErrorCode::MalformedOverride, "host.extensions.main.barExt"),
                (ErrorCode::UnknownKey, "host.extensions.main.order"),
            ]
        );
        assert_eq!(parsed.diagnostics[0].value, Some(json!(5)));
    }

    #[test]
    fn test_top_level_must_be_object() {
        assert!(matches!(
            parse_provide(&json!(["nope"])),
            Err(EngineError::MalformedProvide(_))
        ));
    }

    #[test]
    fn test_empty_module_produces_no_layers() {
        let parsed = parse_provide(&json!({"m": {}})).unwrap();
        assert!(parsed.layers.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }
}
