//! Note types: the typed "kind" a note belongs to, each with its own prose
//! description, optional agent instructions, and metadata schema.
//!
//! A note type is represented on disk as a directory under the vault root
//! (the note type's name) containing a `_description.md` document. That
//! document's frontmatter carries `agent_instructions` and `metadata_schema`;
//! its body is the human-readable description shown to callers.

use crate::db::DatabaseStore;
use crate::error::{CoreError, Result};
use crate::frontmatter::{parse_frontmatter, serialize_frontmatter, split_frontmatter};
use crate::fsutil::atomic_write;
use crate::hash::hash_note_type;
use crate::schema::MetadataSchema;
use crate::workspace::Workspace;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::fs;
use std::sync::LazyLock;

static TYPE_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Filesystem names a note type must not collide with: Windows device
/// names (still rejected on other platforms so vaults stay portable) and
/// this crate's own per-vault config directory.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1", "LPT2",
    "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn validate_type_name(name: &str) -> Result<()> {
    if !TYPE_NAME.is_match(name) {
        return Err(CoreError::ValidationFailed(format!(
            "note type name '{}' must match {}",
            name,
            TYPE_NAME.as_str()
        )));
    }
    let config_dir_name = crate::workspace::CONFIG_DIR.trim_start_matches('.');
    if RESERVED_NAMES.iter().any(|r| name.eq_ignore_ascii_case(r)) || name.eq_ignore_ascii_case(config_dir_name) {
        return Err(CoreError::ValidationFailed(format!("note type name '{}' is reserved", name)));
    }
    Ok(())
}

/// What to do with existing notes of a type being deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction<'a> {
    /// Fail if any note of this type exists.
    ErrorIfNotEmpty,
    /// Delete the note type directory and every note inside it.
    DeleteNotes,
    /// Move every note to another note type's directory first.
    Migrate(&'a str),
}

/// A fully loaded note type: its description document plus the derived
/// content hash used for optimistic-concurrency updates.
#[derive(Debug, Clone)]
pub struct NoteType {
    pub name: String,
    pub description: String,
    pub agent_instructions: Option<String>,
    pub metadata_schema: MetadataSchema,
    pub content_hash: String,
}

#[derive(Serialize, Deserialize, Default)]
struct DescriptionFrontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    agent_instructions: Option<String>,
    #[serde(default)]
    metadata_schema: MetadataSchema,
}

/// Creates, reads, updates, and deletes note types within one vault.
pub struct NoteTypeManager<'a> {
    workspace: &'a Workspace,
    db: &'a DatabaseStore,
}

impl<'a> NoteTypeManager<'a> {
    pub fn new(workspace: &'a Workspace, db: &'a DatabaseStore) -> Self {
        Self { workspace, db }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.workspace.description_path(name).is_file()
    }

    /// Create a new note type, validating its schema definition and failing
    /// if the type directory or description document already exists.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        agent_instructions: Option<&str>,
        schema: MetadataSchema,
    ) -> Result<NoteType> {
        validate_type_name(name)?;
        if self.exists(name) {
            return Err(CoreError::AlreadyExists(format!("note type '{}'", name)));
        }
        schema.validate_definition()?;

        let dir = self.workspace.note_type_dir(name);
        fs::create_dir_all(&dir).map_err(|e| CoreError::io("create_dir_all", &dir, e))?;

        self.write_description(name, description, agent_instructions, &schema)?;
        self.get(name)
    }

    /// Load a note type's description document and compute its current hash.
    pub fn get(&self, name: &str) -> Result<NoteType> {
        let path = self.workspace.description_path(name);
        if !path.is_file() {
            return Err(CoreError::not_found(format!("note type '{}'", name)));
        }
        let content = fs::read_to_string(&path).map_err(|e| CoreError::io("read", &path, e))?;
        let split = split_frontmatter(&content);
        let fm: DescriptionFrontmatter = match split.yaml {
            Some(yaml) if !yaml.trim().is_empty() => serde_yaml::from_str(yaml)?,
            _ => DescriptionFrontmatter::default(),
        };
        fm.metadata_schema.validate_definition()?;

        let content_hash = hash_note_type(split.body.trim(), fm.agent_instructions.as_deref(), &fm.metadata_schema);

        Ok(NoteType {
            name: name.to_string(),
            description: split.body.trim().to_string(),
            agent_instructions: fm.agent_instructions,
            metadata_schema: fm.metadata_schema,
            content_hash,
        })
    }

    /// Every note type registered in this vault, sorted by name.
    pub fn list(&self) -> Result<Vec<NoteType>> {
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.workspace.root)
            .map_err(|e| CoreError::io("read_dir", &self.workspace.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io("read_dir_entry", &self.workspace.root, e))?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(String::from) else { continue };
            if name.starts_with('.') {
                continue;
            }
            if self.exists(&name) {
                names.push(name);
            }
        }
        names.sort();
        names.into_iter().map(|n| self.get(&n)).collect()
    }

    /// Update a note type's description, instructions, and/or schema,
    /// rejecting the write if `expected_hash` doesn't match the current
    /// content hash (optimistic concurrency, same protocol as notes).
    pub fn update(
        &self,
        name: &str,
        expected_hash: &str,
        new_description: Option<&str>,
        new_agent_instructions: Option<Option<&str>>,
        new_schema: Option<MetadataSchema>,
    ) -> Result<NoteType> {
        let current = self.get(name)?;
        if current.content_hash != expected_hash {
            return Err(CoreError::ContentHashMismatch {
                current: current.content_hash,
                provided: expected_hash.to_string(),
            });
        }

        let description = new_description.unwrap_or(&current.description);
        let agent_instructions = match new_agent_instructions {
            Some(explicit) => explicit,
            None => current.agent_instructions.as_deref(),
        };
        let schema = new_schema.unwrap_or(current.metadata_schema);
        schema.validate_definition()?;

        self.write_description(name, description, agent_instructions, &schema)?;
        self.get(name)
    }

    /// Delete a note type, applying `action` to whatever notes already exist
    /// of that type. Gated by the vault's deletion policy: disallowed
    /// entirely unless `deletion.allow_type_delete` is set, and further
    /// requires `confirm` when `deletion.confirm` is set.
    pub fn delete(&self, name: &str, action: DeleteAction<'_>, confirm: bool) -> Result<()> {
        if !self.workspace.config.deletion.allow_type_delete {
            return Err(CoreError::PolicyDenied(
                "note type deletion is disabled by deletion policy (allow_type_delete=false)".to_string(),
            ));
        }
        if self.workspace.config.deletion.confirm && !confirm {
            return Err(CoreError::PolicyDenied("note type deletion requires confirm=true per deletion policy".to_string()));
        }
        if !self.exists(name) {
            return Err(CoreError::not_found(format!("note type '{}'", name)));
        }
        let dir = self.workspace.note_type_dir(name);
        let has_notes = self.count_notes(&dir)? > 0;

        if has_notes {
            match action {
                DeleteAction::ErrorIfNotEmpty => {
                    return Err(CoreError::ValidationFailed(format!(
                        "note type '{}' still has notes; pass a delete action",
                        name
                    )));
                }
                DeleteAction::DeleteNotes => {
                    for entry in fs::read_dir(&dir).map_err(|e| CoreError::io("read_dir", &dir, e))? {
                        let entry = entry.map_err(|e| CoreError::io("read_dir_entry", &dir, e))?;
                        let path = entry.path();
                        let Some(fname) = path.file_name().and_then(|n| n.to_str()) else { continue };
                        if fname == "_description.md" {
                            continue;
                        }
                        if path.extension().and_then(|e| e.to_str()) == Some("md") {
                            self.db.delete_note(&format!("{}/{}", name, fname))?;
                        }
                    }
                }
                DeleteAction::Migrate(target) => {
                    if !self.exists(target) {
                        return Err(CoreError::not_found(format!("note type '{}'", target)));
                    }
                    let target_dir = self.workspace.note_type_dir(target);
                    for entry in fs::read_dir(&dir).map_err(|e| CoreError::io("read_dir", &dir, e))? {
                        let entry = entry.map_err(|e| CoreError::io("read_dir_entry", &dir, e))?;
                        let path = entry.path();
                        if path.file_name().and_then(|n| n.to_str()) == Some("_description.md") {
                            continue;
                        }
                        if path.is_file() {
                            let Some(fname) = path.file_name().and_then(|n| n.to_str()).map(String::from) else { continue };
                            let dest = target_dir.join(&fname);
                            fs::rename(&path, &dest).map_err(|e| CoreError::io("rename", &path, e))?;
                            self.db.delete_note(&format!("{}/{}", name, fname))?;
                            crate::note::NoteManager::new(self.workspace, self.db).reindex_from_disk(target, &fname)?;
                        }
                    }
                }
            }
        }

        fs::remove_dir_all(&dir).map_err(|e| CoreError::io("remove_dir_all", &dir, e))
    }

    fn count_notes(&self, dir: &std::path::Path) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(dir).map_err(|e| CoreError::io("read_dir", dir, e))? {
            let entry = entry.map_err(|e| CoreError::io("read_dir_entry", dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md")
                && path.file_name().and_then(|n| n.to_str()) != Some("_description.md")
            {
                count += 1;
            }
        }
        Ok(count)
    }

    fn write_description(
        &self,
        name: &str,
        description: &str,
        agent_instructions: Option<&str>,
        schema: &MetadataSchema,
    ) -> Result<()> {
        let fm = DescriptionFrontmatter {
            agent_instructions: agent_instructions.map(String::from),
            metadata_schema: schema.clone(),
        };
        let yaml: YamlValue = serde_yaml::to_value(&fm)?;
        let header = serialize_frontmatter(&yaml)?;
        let doc = format!("{}\n{}\n", header, description.trim());
        atomic_write(&self.workspace.description_path(name), doc.as_bytes())
    }
}

/// Parse a description document's frontmatter without a [`Workspace`], used
/// by callers that already hold the raw file content (e.g. import tooling).
pub fn parse_description_document(content: &str) -> Result<(String, Option<String>, MetadataSchema)> {
    let split = split_frontmatter(content);
    let fm: DescriptionFrontmatter = match parse_frontmatter(content)? {
        Some(yaml) => serde_yaml::from_value(yaml)?,
        None => DescriptionFrontmatter::default(),
    };
    Ok((split.body.trim().to_string(), fm.agent_instructions, fm.metadata_schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldConstraints, FieldDef, FieldType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn rating_schema() -> MetadataSchema {
        MetadataSchema {
            fields: vec![FieldDef {
                name: "rating".to_string(),
                field_type: FieldType::Number,
                required: false,
                default: None,
                constraints: FieldConstraints::default(),
            }],
            closed: false,
        }
    }

    #[test]
    fn create_and_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "Notes about books", Some("Always cite the author"), rating_schema())
            .unwrap();

        let nt = mgr.get("reading").unwrap();
        assert_eq!(nt.description, "Notes about books");
        assert_eq!(nt.agent_instructions.as_deref(), Some("Always cite the author"));
        assert_eq!(nt.metadata_schema.fields.len(), 1);
    }

    #[test]
    fn create_twice_fails() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        assert!(mgr.create("reading", "d2", None, MetadataSchema::default()).is_err());
    }

    #[test]
    fn update_rejects_stale_hash() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        let result = mgr.update("reading", "sha256:stale", Some("new desc"), None, None);
        assert!(matches!(result, Err(CoreError::ContentHashMismatch { .. })));
    }

    #[test]
    fn update_with_correct_hash_succeeds() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        let nt = mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        let updated = mgr.update(&nt.name, &nt.content_hash, Some("new desc"), None, None).unwrap();
        assert_eq!(updated.description, "new desc");
    }

    #[test]
    fn delete_without_confirm_is_policy_denied() {
        let dir = TempDir::new().unwrap();
        let mut ws = Workspace::initialize_vault(dir.path()).unwrap();
        ws.config.deletion.allow_type_delete = true;
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        let result = mgr.delete("reading", DeleteAction::ErrorIfNotEmpty, false);
        assert!(matches!(result, Err(CoreError::PolicyDenied(_))));
    }

    #[test]
    fn delete_is_denied_unless_allow_type_delete() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        let result = mgr.delete("reading", DeleteAction::ErrorIfNotEmpty, true);
        assert!(matches!(result, Err(CoreError::PolicyDenied(_))));
    }

    #[test]
    fn delete_with_notes_and_no_action_fails() {
        let dir = TempDir::new().unwrap();
        let mut ws = Workspace::initialize_vault(dir.path()).unwrap();
        ws.config.deletion.allow_type_delete = true;
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        fs::write(ws.note_path("reading", "book.md"), "content").unwrap();
        assert!(mgr.delete("reading", DeleteAction::ErrorIfNotEmpty, true).is_err());
    }

    #[test]
    fn delete_migrates_notes_to_target_and_updates_index() {
        let dir = TempDir::new().unwrap();
        let mut ws = Workspace::initialize_vault(dir.path()).unwrap();
        ws.config.deletion.allow_type_delete = true;
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("reading", "d", None, MetadataSchema::default()).unwrap();
        mgr.create("general2", "d", None, MetadataSchema::default()).unwrap();
        let note_mgr = crate::note::NoteManager::new(&ws, &db);
        let note = note_mgr.create_note("reading", "Book", BTreeMap::new(), "content").unwrap();

        mgr.delete("reading", DeleteAction::Migrate("general2"), true).unwrap();
        assert!(!mgr.exists("reading"));
        assert!(ws.note_path("general2", "book.md").is_file());
        assert!(db.get_note(&note.id).unwrap().is_none(), "old id must no longer be indexed");
        let migrated = db.get_note("general2/book.md").unwrap().expect("migrated note must be indexed at its new id");
        assert_eq!(migrated.title, "Book");
    }

    #[test]
    fn list_returns_sorted_names() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        let mgr = NoteTypeManager::new(&ws, &db);
        mgr.create("zeta", "d", None, MetadataSchema::default()).unwrap();
        mgr.create("alpha", "d", None, MetadataSchema::default()).unwrap();
        let names: Vec<_> = mgr.list().unwrap().into_iter().map(|n| n.name).collect();
        // "general" and "daily" are seeded by initialize_vault.
        assert!(names.contains(&"alpha".to_string()));
        assert!(names.contains(&"zeta".to_string()));
        assert_eq!(names[0], "alpha");
    }
}
