//! Settings for the tool and the documents it loads.
//!
//! Settings come from three tiers with field-by-field YAML merging:
//! 1. **Defaults** - `Settings::default()`
//! 2. **Project** - `$CWD/module-config/settings.yaml`
//! 3. **User** - `~/.module-config/settings.yaml` and environment variables
//!
//! ## Environment Variables
//! - `MODULE_CONFIG_SETTINGS_PATH` - Explicit settings file (overrides all tiers)
//! - `MODULE_CONFIG_STRICT` - Strict schema lookup (`true`/`false`)
//! - `MODULE_CONFIG_SCHEMA_DIR` - Schema document directory
//! - `MODULE_CONFIG_OVERRIDES_DIR` - Override document directory
//! - `MODULE_CONFIG_USER_DIR` - User settings dir (default: `~/.module-config`)
//! - `MODULE_CONFIG_PROJECT_DIR` - Project settings dir (default: `./module-config`)

pub mod files;
mod loader;
mod types;
pub mod watcher;

pub use files::{DocumentSet, load_documents};
pub use loader::{SETTINGS_FILE, SettingsLoader, SettingsPaths, SettingsTier};
pub use types::*;
