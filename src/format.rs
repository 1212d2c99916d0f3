//! Output formatting for resolved configurations and diagnostics.

use crate::error::ConfigDiagnostic;
use crate::overrides::LayerRef;
use crate::types::ResolvedConfig;
use anyhow::Result;
use serde_json::{Value, json};

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "yaml" | "yml" => Some(OutputFormat::Yaml),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::from_str(s).ok_or_else(|| {
            format!(
                "Invalid format '{}'. Valid options: json, yaml, markdown",
                s
            )
        })
    }
}

/// Render the values of a resolution, or one value when `key` is given.
pub fn render_resolved(
    resolved: &ResolvedConfig,
    key: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    let value = match key {
        Some(key) => resolved.get(key).cloned().unwrap_or(Value::Null),
        None => resolved.to_value(),
    };
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&value)?),
        OutputFormat::Markdown => Ok(format_resolved_markdown(resolved, key)),
    }
}

/// Machine-readable report: values, provenance and diagnostics.
pub fn resolved_report(resolved: &ResolvedConfig) -> Value {
    json!({
        "identity": resolved.identity.to_string(),
        "version": resolved.version,
        "resolved_at": resolved.resolved_at,
        "values": resolved.to_value(),
        "provenance": resolved
            .provenance()
            .iter()
            .map(|(path, layer)| (path.clone(), Value::String(layer.to_string())))
            .collect::<serde_json::Map<String, Value>>(),
        "diagnostics": resolved.diagnostics(),
    })
}

/// Format a resolution as markdown.
pub fn format_resolved_markdown(resolved: &ResolvedConfig, key: Option<&str>) -> String {
    let mut md = String::new();
    md.push_str(&format!("## Config: {}\n", resolved.identity));

    let mut leaves: Vec<(String, &Value)> = Vec::new();
    collect_leaves(resolved.values(), "", &mut leaves);
    for (path, value) in leaves {
        if key.is_some_and(|k| path != k && !path.starts_with(&format!("{}.", k))) {
            continue;
        }
        md.push_str(&format!("- **{}**: `{}`\n", path, value));
    }

    if !resolved.diagnostics().is_empty() {
        md.push('\n');
        md.push_str(&format_diagnostics_markdown(resolved.diagnostics()));
    }
    md
}

/// Format where every value came from.
pub fn format_provenance_markdown(resolved: &ResolvedConfig) -> String {
    let mut md = String::new();
    md.push_str(&format!("## Provenance: {}\n\n", resolved.identity));
    md.push_str("| key | value | source |\n|---|---|---|\n");

    for (path, layer) in resolved.provenance() {
        let value = resolved
            .get(path)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let source = match layer {
            LayerRef::Default => "_default_".to_string(),
            other => other.to_string(),
        };
        md.push_str(&format!("| `{}` | `{}` | {} |\n", path, value, source));
    }
    md
}

/// Format diagnostics as a markdown list.
pub fn format_diagnostics_markdown(diagnostics: &[ConfigDiagnostic]) -> String {
    let mut md = String::new();
    md.push_str(&format!("### Diagnostics ({})\n", diagnostics.len()));
    for diag in diagnostics {
        let marker = if diag.is_error() { "error" } else { "info" };
        md.push_str(&format!("- [{}] {}\n", marker, diag));
    }
    md
}

fn collect_leaves<'a>(
    map: &'a serde_json::Map<String, Value>,
    prefix: &str,
    out: &mut Vec<(String, &'a Value)>,
) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(child) if !child.is_empty() => collect_leaves(child, &path, out),
            _ => out.push((path, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overrides::OverrideScope;
    use crate::types::ConfigIdentity;
    use std::collections::BTreeMap;

    fn resolved() -> ResolvedConfig {
        let values = json!({"paging": {"size": 10, "infinite": false}, "title": "x"});
        let mut provenance = BTreeMap::new();
        provenance.insert("paging.infinite".to_string(), LayerRef::Default);
        provenance.insert(
            "paging.size".to_string(),
            LayerRef::Override {
                scope: OverrideScope::module("m"),
                seq: 2,
            },
        );
        provenance.insert("title".to_string(), LayerRef::Default);
        ResolvedConfig::new(
            ConfigIdentity::module("m"),
            values.as_object().cloned().unwrap(),
            provenance,
            vec![ConfigDiagnostic::unknown_key("extra", "m")],
            4,
        )
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::from_str("YML"), Some(OutputFormat::Yaml));
        assert_eq!(OutputFormat::from_str("md"), Some(OutputFormat::Markdown));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_render_single_key() {
        let out = render_resolved(&resolved(), Some("paging.size"), OutputFormat::Json).unwrap();
        assert_eq!(out, "10");
    }

    #[test]
    fn test_markdown_lists_leaves_and_diagnostics() {
        let md = format_resolved_markdown(&resolved(), None);
        assert!(md.contains("## Config: m"));
        assert!(md.contains("- **paging.size**: `10`"));
        assert!(md.contains("[info]"));

        let filtered = format_resolved_markdown(&resolved(), Some("paging"));
        assert!(filtered.contains("paging.infinite"));
        assert!(!filtered.contains("**title**"));
    }

    #[test]
    fn test_provenance_table() {
        let md = format_provenance_markdown(&resolved());
        assert!(md.contains("| `paging.size` | `10` | module m (#2) |"));
        assert!(md.contains("| `title` | `\"x\"` | _default_ |"));
    }

    #[test]
    fn test_report_shape() {
        let report = resolved_report(&resolved());
        assert_eq!(report["identity"], "m");
        assert_eq!(report["provenance"]["paging.size"], "module m (#2)");
        assert_eq!(report["diagnostics"][0]["code"], "UNKNOWN_KEY");
    }
}
