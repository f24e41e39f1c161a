//! The process-wide registry of known vaults, and path validation shared by
//! every operation that takes a caller-supplied path.

use crate::error::{CoreError, Result};
use crate::fsutil::atomic_write;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const REGISTRY_FILE: &str = "vaults.yml";

fn default_registry_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notecore")
        .join(REGISTRY_FILE)
}

/// One entry in the global registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created: String,
    pub last_accessed: String,
}

/// The `vaults.yml` document: every vault this installation knows about, plus
/// which one is active when a caller doesn't name one explicitly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    vaults: BTreeMap<String, VaultEntry>,
    #[serde(default)]
    current_vault_id: Option<String>,
}

/// Process-wide registry of known vaults, backed by a single YAML file
/// (default `$XDG_CONFIG_HOME/notecore/vaults.yml`, grounded on the same
/// `dirs::config_dir()` idiom the teacher uses for its own config file).
#[derive(Debug)]
pub struct GlobalRegistry {
    path: PathBuf,
    doc: RegistryDocument,
}

impl GlobalRegistry {
    /// Load the registry from the default path, creating an empty one if it
    /// doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(default_registry_path())
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| CoreError::io("read", &path, e))?;
            serde_yaml::from_str(&raw)?
        } else {
            RegistryDocument::default()
        };
        Ok(Self { path, doc })
    }

    fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.doc)?;
        atomic_write(&self.path, yaml.as_bytes())
    }

    pub fn vaults(&self) -> impl Iterator<Item = &VaultEntry> {
        self.doc.vaults.values()
    }

    pub fn get(&self, id: &str) -> Option<&VaultEntry> {
        self.doc.vaults.get(id)
    }

    pub fn current_vault_id(&self) -> Option<&str> {
        self.doc.current_vault_id.as_deref()
    }

    /// Register a vault at `path` under `id`, failing if that id or that
    /// exact path is already registered.
    pub fn register(
        &mut self,
        id: &str,
        name: &str,
        path: &Path,
        description: Option<String>,
        now: &str,
    ) -> Result<()> {
        if self.doc.vaults.contains_key(id) {
            return Err(CoreError::AlreadyExists(format!("vault id '{}'", id)));
        }
        if self.doc.vaults.values().any(|v| v.path == path) {
            return Err(CoreError::AlreadyExists(format!(
                "a vault is already registered at {}",
                path.display()
            )));
        }
        self.doc.vaults.insert(
            id.to_string(),
            VaultEntry {
                id: id.to_string(),
                name: name.to_string(),
                path: path.to_path_buf(),
                description,
                created: now.to_string(),
                last_accessed: now.to_string(),
            },
        );
        if self.doc.current_vault_id.is_none() {
            self.doc.current_vault_id = Some(id.to_string());
        }
        self.save()
    }

    pub fn unregister(&mut self, id: &str) -> Result<()> {
        if self.doc.vaults.remove(id).is_none() {
            return Err(CoreError::not_found(format!("vault id '{}'", id)));
        }
        if self.doc.current_vault_id.as_deref() == Some(id) {
            self.doc.current_vault_id = self.doc.vaults.keys().next().cloned();
        }
        self.save()
    }

    pub fn set_current(&mut self, id: &str) -> Result<()> {
        if !self.doc.vaults.contains_key(id) {
            return Err(CoreError::not_found(format!("vault id '{}'", id)));
        }
        self.doc.current_vault_id = Some(id.to_string());
        self.save()
    }

    pub fn touch(&mut self, id: &str, now: &str) -> Result<()> {
        let entry = self
            .doc
            .vaults
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found(format!("vault id '{}'", id)))?;
        entry.last_accessed = now.to_string();
        self.save()
    }
}

/// Validates and normalizes a caller-supplied path against a vault root,
/// rejecting anything that would escape it (symlink traversal, `..`
/// components, or an absolute path outside the root).
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `relative` against the vault root and confirm the result
    /// stays within it. `relative` may use `/` regardless of platform.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        if relative.is_empty() {
            return Err(CoreError::PathUnsafe("empty path".to_string()));
        }

        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Err(CoreError::PathUnsafe(format!(
                "absolute paths are not permitted: {}",
                relative
            )));
        }

        let mut normalized = PathBuf::new();
        for component in candidate.components() {
            use std::path::Component;
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(CoreError::PathUnsafe(format!(
                        "path escapes vault root: {}",
                        relative
                    )));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(CoreError::PathUnsafe(format!(
                        "absolute paths are not permitted: {}",
                        relative
                    )));
                }
            }
        }

        let full = self.root.join(&normalized);
        self.ensure_within_root(&full)?;
        Ok(full)
    }

    /// Confirm an already-joined path's canonical form (if it exists) still
    /// lives under the vault root, catching symlinks that point outside.
    pub fn ensure_within_root(&self, path: &Path) -> Result<()> {
        let to_check = if path.exists() {
            path.canonicalize().map_err(|e| CoreError::io("canonicalize", path, e))?
        } else {
            path.to_path_buf()
        };
        let root = if self.root.exists() {
            self.root.canonicalize().unwrap_or_else(|_| self.root.clone())
        } else {
            self.root.clone()
        };
        if !to_check.starts_with(&root) {
            return Err(CoreError::PathUnsafe(format!(
                "{} escapes vault root {}",
                path.display(),
                self.root.display()
            )));
        }
        Ok(())
    }
}
