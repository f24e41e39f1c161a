//! Vault directory layout, per-vault configuration, and initialization.

use crate::error::{CoreError, Result};
use crate::fsutil::atomic_write;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-vault metadata directory (`<root>/<CONFIG_DIR>/`).
pub const CONFIG_DIR: &str = ".vault";
const CONFIG_FILE: &str = "config.yml";
const DB_FILE: &str = "index.db";
const BACKUPS_DIR: &str = "backups";

/// Current schema version written by this crate. Bumping this forces
/// [`Workspace::initialize`] to rewrite the config file with merged defaults.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Default note types seeded by [`Workspace::initialize_vault`].
const DEFAULT_NOTE_TYPES: &[&str] = &["general", "daily"];

/// How [`crate::note::NoteManager::delete_note`] and `bulk_delete_notes`
/// behave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionPolicy {
    #[serde(default = "default_confirm")]
    pub confirm: bool,
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
    #[serde(default = "default_allow_type_delete")]
    pub allow_type_delete: bool,
    #[serde(default = "default_max_bulk")]
    pub max_bulk: usize,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        Self {
            confirm: default_confirm(),
            backup_path: None,
            allow_type_delete: default_allow_type_delete(),
            max_bulk: default_max_bulk(),
        }
    }
}

fn default_confirm() -> bool {
    true
}
fn default_allow_type_delete() -> bool {
    false
}
fn default_max_bulk() -> usize {
    100
}

/// Database-related vault settings (separate from the deletion policy so a
/// config upgrade can add keys to either section independently).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_search_enabled")]
    pub search_enabled: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self { search_enabled: default_search_enabled() }
    }
}

fn default_search_enabled() -> bool {
    true
}

/// The `<root>/.vault/config.yml` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "current_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_note_type")]
    pub default_note_type: String,
    #[serde(default)]
    pub deletion: DeletionPolicy,
    #[serde(default)]
    pub database: DatabaseSection,
}

fn current_schema_version() -> u32 {
    CURRENT_SCHEMA_VERSION
}
fn default_note_type() -> String {
    "general".to_string()
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            default_note_type: default_note_type(),
            deletion: DeletionPolicy::default(),
            database: DatabaseSection::default(),
        }
    }
}

/// Owns one vault directory: its config file and note-type directory layout.
/// [`crate::note_type::NoteTypeManager`] owns the note type directories
/// underneath it; `Workspace` itself only owns the config file.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: VaultConfig,
}

impl Workspace {
    /// Open an existing vault, seeding or upgrading its config as needed.
    /// Never creates note type directories; use [`Workspace::initialize_vault`]
    /// for a brand-new vault.
    pub fn initialize(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CoreError::NotFound(format!("vault root {}", root.display())));
        }
        let config = Self::load_or_seed_config(&root)?;
        Ok(Self { root, config })
    }

    /// Initialize a brand-new vault: ensure the config directory and config
    /// file exist, and seed the default note types. Never touches existing
    /// user content; this is pure creation for an empty or partially-set-up
    /// directory.
    pub fn initialize_vault(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CoreError::io("create_dir_all", &root, e))?;
        let config = Self::load_or_seed_config(&root)?;
        let workspace = Self { root, config };

        for type_name in DEFAULT_NOTE_TYPES {
            let dir = workspace.note_type_dir(type_name);
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(|e| CoreError::io("create_dir_all", &dir, e))?;
            }
        }

        Ok(workspace)
    }

    /// Load the config file, seeding defaults if absent and merging in any
    /// keys a newer schema version added, preserving the user's existing
    /// values. Rewrites the file atomically only if something changed.
    fn load_or_seed_config(root: &Path) -> Result<VaultConfig> {
        let config_dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).map_err(|e| CoreError::io("create_dir_all", &config_dir, e))?;
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            let config = VaultConfig::default();
            Self::write_config(&config_path, &config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&config_path).map_err(|e| CoreError::io("read", &config_path, e))?;

        // Parse as a loose YAML value first so we can detect which keys were
        // actually present on disk, then deserialize into VaultConfig (which
        // fills defaults for anything missing via #[serde(default = ...)]).
        let on_disk: serde_yaml::Value = serde_yaml::from_str(&raw)
            .map_err(|_| CoreError::ValidationFailed(format!("malformed config at {}", config_path.display())))?;
        let config: VaultConfig = serde_yaml::from_value(on_disk.clone())
            .map_err(|_| CoreError::ValidationFailed(format!("malformed config at {}", config_path.display())))?;

        let had_all_keys = matches!(&on_disk, serde_yaml::Value::Mapping(m) if
            m.contains_key("schema_version")
            && m.contains_key("default_note_type")
            && m.contains_key("deletion")
            && m.contains_key("database"));

        if !had_all_keys || config.schema_version < CURRENT_SCHEMA_VERSION {
            let mut upgraded = config.clone();
            upgraded.schema_version = CURRENT_SCHEMA_VERSION;
            Self::write_config(&config_path, &upgraded)?;
            return Ok(upgraded);
        }

        Ok(config)
    }

    fn write_config(path: &Path, config: &VaultConfig) -> Result<()> {
        let yaml = serde_yaml::to_string(config)?;
        atomic_write(path, yaml.as_bytes())
    }

    /// Persist a config change made by the caller (e.g. policy update).
    pub fn save_config(&self) -> Result<()> {
        Self::write_config(&self.config_path(), &self.config)
    }

    pub fn config_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir().join(CONFIG_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.config_dir().join(DB_FILE)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.config_dir().join(BACKUPS_DIR)
    }

    pub fn note_type_dir(&self, type_name: &str) -> PathBuf {
        self.root.join(type_name)
    }

    pub fn note_path(&self, type_name: &str, filename: &str) -> PathBuf {
        self.note_type_dir(type_name).join(filename)
    }

    pub fn description_path(&self, type_name: &str) -> PathBuf {
        self.note_type_dir(type_name).join("_description.md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn initialize_vault_seeds_defaults() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        assert!(ws.note_type_dir("general").is_dir());
        assert!(ws.note_type_dir("daily").is_dir());
        assert!(ws.config_path().is_file());
    }

    #[test]
    fn initialize_existing_vault_reloads_config() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let reopened = Workspace::initialize(dir.path()).unwrap();
        assert_eq!(ws.config.schema_version, reopened.config.schema_version);
    }

    #[test]
    fn initialize_on_nonexistent_dir_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(Workspace::initialize(&missing).is_err());
    }

    #[test]
    fn config_upgrade_preserves_user_values() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        let partial = "schema_version: 1\ndefault_note_type: journal\n";
        fs::write(dir.path().join(CONFIG_DIR).join(CONFIG_FILE), partial).unwrap();

        let ws = Workspace::initialize(dir.path()).unwrap();
        assert_eq!(ws.config.default_note_type, "journal");
        assert!(ws.config.deletion.confirm);

        let raw = fs::read_to_string(ws.config_path()).unwrap();
        assert!(raw.contains("deletion"));
        assert!(raw.contains("database"));
    }

    #[test]
    fn never_touches_existing_note_content() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let note_path = ws.note_path("general", "keep-me.md");
        fs::write(&note_path, "---\ntitle: Keep\n---\nBody").unwrap();

        let _ = Workspace::initialize(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(&note_path).unwrap(), "---\ntitle: Keep\n---\nBody");
    }
}
