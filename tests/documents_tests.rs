//! Integration tests for document loading and settings tiers.
//!
//! Schema and override documents are written to temporary directories, loaded
//! the way the command-line tool loads them, and resolved through the engine.

use module_config::config::{SettingsLoader, SettingsPaths, SettingsTier, load_documents};
use module_config::engine::DirectorySchemaSource;
use module_config::{ConfigEngine, ConfigIdentity, EngineError, ErrorCode, LayerRef, MountContext, OverrideScope};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Workspace {
    _root: TempDir,
    schemas: std::path::PathBuf,
    overrides: std::path::PathBuf,
}

/// Create a fresh workspace with empty schema and override directories.
fn setup_workspace() -> Workspace {
    let root = TempDir::new().expect("Failed to create temp directory");
    let schemas = root.path().join("schemas");
    let overrides = root.path().join("overrides");
    fs::create_dir_all(&schemas).unwrap();
    fs::create_dir_all(&overrides).unwrap();
    Workspace {
        _root: root,
        schemas,
        overrides,
    }
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).expect("Failed to write document");
}

fn open(ws: &Workspace) -> (ConfigEngine, Vec<module_config::ConfigDiagnostic>) {
    let documents = load_documents(Some(ws.schemas.as_path()), Some(ws.overrides.as_path())).unwrap();
    let engine = ConfigEngine::new();
    let diagnostics = documents.apply(&engine).unwrap();
    (engine, diagnostics)
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

mod document_tests {
    use super::*;

    #[test]
    fn schemas_and_overrides_resolve_together() {
        let ws = setup_workspace();
        write(
            &ws.schemas,
            "foo-module.yaml",
            "thing:\n  default: foo thing\npaging:\n  size:\n    default: 25\n    type: integer\n",
        );
        write(
            &ws.overrides,
            "10-app.yaml",
            r#"
slot-2-module:
  extensions:
    slot2:
      configure:
        fooExt:
          thing: another thing
foo-module:
  paging:
    size: 50
"#,
        );

        let (engine, diagnostics) = open(&ws);
        assert!(diagnostics.is_empty());
        assert_eq!(engine.modules(), vec!["foo-module"]);

        let own = engine.resolve(&ConfigIdentity::module("foo-module")).unwrap();
        assert_eq!(own.to_value(), json!({"thing": "foo thing", "paging": {"size": 50}}));

        let mounted = MountContext::module("slot-2-module")
            .with_extension("slot2", "foo-module", "fooExt")
            .identity();
        let ext = engine.resolve(&mounted).unwrap();
        assert_eq!(ext.get("thing"), Some(&json!("another thing")));
        assert_eq!(ext.get("paging.size"), Some(&json!(50)));
    }

    #[test]
    fn override_files_apply_in_name_order() {
        let ws = setup_workspace();
        write(&ws.schemas, "m.json", r#"{"title": {"default": "base"}}"#);
        write(&ws.overrides, "20-late.yaml", "m:\n  title: late\n");
        write(&ws.overrides, "10-early.yaml", "m:\n  title: early\n");

        let (engine, _) = open(&ws);
        let resolved = engine.resolve(&ConfigIdentity::module("m")).unwrap();
        assert_eq!(resolved.get("title"), Some(&json!("late")));
    }

    #[test]
    fn global_document_is_one_global_layer() {
        let ws = setup_workspace();
        write(&ws.schemas, "a.yaml", "theme:\n  default: light\n");
        write(&ws.schemas, "b.yaml", "theme:\n  default: light\n");
        write(&ws.overrides, "_global.yaml", "theme: dark\n");
        write(&ws.overrides, "z-b.yaml", "b:\n  theme: contrast\n");

        let (engine, _) = open(&ws);
        let a = engine.resolve(&ConfigIdentity::module("a")).unwrap();
        let b = engine.resolve(&ConfigIdentity::module("b")).unwrap();
        assert_eq!(a.get("theme"), Some(&json!("dark")));
        assert!(matches!(
            a.source_of("theme"),
            Some(LayerRef::Override {
                scope: OverrideScope::Global,
                ..
            })
        ));
        // Module scope outranks global regardless of file order.
        assert_eq!(b.get("theme"), Some(&json!("contrast")));
    }

    #[test]
    fn empty_and_foreign_files_are_skipped() {
        let ws = setup_workspace();
        write(&ws.schemas, "m.yaml", "x:\n  default: 1\n");
        write(&ws.schemas, "README.md", "# not a schema\n");
        write(&ws.overrides, "empty.yaml", "# nothing yet\n");

        let documents = load_documents(Some(ws.schemas.as_path()), Some(ws.overrides.as_path())).unwrap();
        assert_eq!(documents.schemas.len(), 1);
        assert!(documents.overrides.is_empty());
    }

    #[test]
    fn missing_directories_load_nothing() {
        let ws = setup_workspace();
        let schemas = ws.schemas.join("nope");
        let overrides = ws.overrides.join("nope");
        let documents = load_documents(Some(schemas.as_path()), Some(overrides.as_path())).unwrap();
        assert!(documents.is_empty());
    }

    #[test]
    fn ingestion_diagnostics_are_returned() {
        let ws = setup_workspace();
        write(&ws.overrides, "bad.yaml", "m:\n  extensions: 3\n");

        let (_, diagnostics) = open(&ws);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, ErrorCode::MalformedOverride);
    }

    #[test]
    fn invalid_schema_document_names_the_file() {
        let ws = setup_workspace();
        write(&ws.schemas, "broken.yaml", "thing: 5\n");

        let documents = load_documents(Some(ws.schemas.as_path()), None).unwrap();
        let err = documents.apply(&ConfigEngine::new()).unwrap_err();
        assert!(matches!(err, EngineError::Document { .. }));
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn unparseable_document_fails_to_load() {
        let ws = setup_workspace();
        write(&ws.overrides, "bad.json", "{ not json");

        let err = load_documents(None, Some(ws.overrides.as_path())).unwrap_err();
        assert_eq!(err.code(), ErrorCode::SourceFailure);
    }
}

// ---------------------------------------------------------------------------
// Lazy schema source
// ---------------------------------------------------------------------------

mod lazy_source_tests {
    use super::*;

    #[tokio::test]
    async fn schema_loaded_on_first_access() {
        let ws = setup_workspace();
        write(&ws.schemas, "foo-module.yml", "thing:\n  default: foo thing\n");

        let engine = ConfigEngine::builder()
            .source(Arc::new(DirectorySchemaSource::new(&ws.schemas)))
            .build();
        assert!(engine.modules().is_empty());

        let resolved = engine.get_config("foo-module").await.unwrap();
        assert_eq!(resolved.get("thing"), Some(&json!("foo thing")));
        assert_eq!(engine.modules(), vec!["foo-module"]);
    }

    #[tokio::test]
    async fn unknown_module_resolves_leniently() {
        let ws = setup_workspace();
        let engine = ConfigEngine::builder()
            .source(Arc::new(DirectorySchemaSource::new(&ws.schemas)))
            .build();
        engine.provide(&json!({"ghost": {"a": 1}})).unwrap();

        let resolved = engine.get_config("ghost").await.unwrap();
        assert_eq!(resolved.get("a"), Some(&json!(1)));
        assert_eq!(resolved.diagnostics()[0].code, ErrorCode::SchemaNotFound);
    }

    #[tokio::test]
    async fn broken_schema_file_is_a_source_failure() {
        let ws = setup_workspace();
        write(&ws.schemas, "m.yaml", "thing: [1, 2]\n");
        let engine = ConfigEngine::builder()
            .source(Arc::new(DirectorySchemaSource::new(&ws.schemas)))
            .build();

        let err = engine.get_config("m").await.unwrap_err();
        assert!(matches!(err, EngineError::Source { .. }));
        assert_eq!(engine.cached_len(), 0);
    }
}

// ---------------------------------------------------------------------------
// Settings tiers
// ---------------------------------------------------------------------------

mod settings_tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn tiers_merge_and_env_wins() {
        let project = TempDir::new().unwrap();
        let user = TempDir::new().unwrap();
        write(
            project.path(),
            "settings.yaml",
            "sources:\n  schema_dir: project/schemas\n  overrides_dir: project/overrides\nwatch:\n  debounce_ms: 50\n",
        );
        write(user.path(), "settings.yaml", "sources:\n  overrides_dir: user/overrides\n");

        let paths = SettingsPaths::with_dirs(
            Some(project.path().to_path_buf()),
            Some(user.path().to_path_buf()),
        );
        let loader = SettingsLoader::load_with_env(paths.clone(), no_env).unwrap();
        let settings = loader.settings();
        assert_eq!(settings.sources.schema_dir, Path::new("project/schemas"));
        assert_eq!(settings.sources.overrides_dir, Path::new("user/overrides"));
        assert_eq!(settings.watch.debounce_ms, 50);
        assert!(settings.watch.enabled);
        let tiers: Vec<SettingsTier> = loader.sources().iter().map(|(t, _)| *t).collect();
        assert_eq!(tiers, vec![SettingsTier::Project, SettingsTier::User]);

        let loader = SettingsLoader::load_with_env(paths, |key| match key {
            "MODULE_CONFIG_STRICT" => Some("true".into()),
            "MODULE_CONFIG_SCHEMA_DIR" => Some("env/schemas".into()),
            _ => None,
        })
        .unwrap();
        assert!(loader.settings().resolution.strict);
        assert_eq!(loader.settings().sources.schema_dir, Path::new("env/schemas"));
        assert_eq!(loader.settings().sources.overrides_dir, Path::new("user/overrides"));
    }

    #[test]
    fn strict_settings_drive_the_engine() {
        let project = TempDir::new().unwrap();
        write(project.path(), "settings.yaml", "resolution:\n  strict: true\n");
        let paths = SettingsPaths::with_dirs(Some(project.path().to_path_buf()), None);
        let settings = SettingsLoader::load_with_env(paths, no_env)
            .unwrap()
            .into_settings();

        let engine = ConfigEngine::builder().policy(settings.policy()).build();
        let err = engine.resolve(&ConfigIdentity::module("m")).unwrap_err();
        assert_eq!(err, EngineError::SchemaNotFound("m".into()));
    }
}
