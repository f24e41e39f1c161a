//! Note CRUD with automatic frontmatter management, index maintenance, and
//! wikilink propagation across renames and moves.
//!
//! The filesystem, not the index, is the source of truth for a note's
//! content: every read goes back to disk, and every write updates the index
//! afterward in the same call. A note's id (`type/filename`) never changes
//! on rename — only its title does, so links by id stay valid; a move
//! changes the type half of the id but keeps the filename.

use crate::db::{DatabaseStore, NoteRecord, NoteRow};
use crate::error::{CoreError, Result};
use crate::frontmatter::{build_frontmatter, extract_metadata, parse_frontmatter, reject_protected_keys, serialize_frontmatter, split_frontmatter};
use crate::fsutil::atomic_write;
use crate::hash::hash_note_content;
use crate::link::graph::{rewrite_wikilink_target, LinkGraph};
use crate::link::{extract_external_links, extract_frontmatter_wikilinks, extract_wikilinks};
use crate::note_type::NoteTypeManager;
use crate::registry::PathGuard;
use crate::schema::Value;
use crate::workspace::Workspace;
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// A fully loaded note: its identity, frontmatter-derived metadata, and body.
#[derive(Debug, Clone)]
pub struct Note {
    pub id: String,
    pub note_type: String,
    pub filename: String,
    pub title: String,
    pub created: String,
    pub updated: String,
    pub content_hash: String,
    pub metadata: BTreeMap<String, Value>,
    pub body: String,
}

/// Result of [`NoteManager::rename_note`].
#[derive(Debug)]
pub struct RenameReport {
    pub note: Note,
    pub notes_updated: usize,
    pub links_updated: usize,
}

/// Result of [`NoteManager::move_note`].
#[derive(Debug)]
pub struct MoveReport {
    pub note: Note,
    pub old_id: String,
    pub notes_with_updated_links: usize,
    pub links_updated: usize,
}

/// Selects which notes [`NoteManager::bulk_delete_notes`] should target.
#[derive(Debug, Default)]
pub struct BulkDeleteSelector<'a> {
    pub note_type: Option<&'a str>,
    pub tags: &'a [String],
    pub pattern: Option<&'a str>,
}

/// Outcome of [`NoteManager::bulk_delete_notes`]: one result per matched note.
#[derive(Debug)]
pub struct BulkDeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

fn note_id(note_type: &str, filename: &str) -> String {
    format!("{}/{}", note_type, filename)
}

fn split_id(id: &str) -> Result<(&str, &str)> {
    id.split_once('/').ok_or_else(|| CoreError::ValidationFailed(format!("malformed note id '{}'", id)))
}

/// Turn a title into a `[a-z0-9-]+` filesystem-safe slug.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() { "note".to_string() } else { trimmed.to_string() }
}

fn tags_match(value: &Value, wanted: &[String]) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|v| v.as_str().is_some_and(|s| wanted.iter().any(|t| t == s))),
        _ => false,
    }
}

/// Creates, reads, updates, renames, moves, and deletes notes within one
/// vault, keeping the filesystem and the SQL index consistent.
pub struct NoteManager<'a> {
    workspace: &'a Workspace,
    db: &'a DatabaseStore,
    types: NoteTypeManager<'a>,
    guard: PathGuard,
}

impl<'a> NoteManager<'a> {
    pub fn new(workspace: &'a Workspace, db: &'a DatabaseStore) -> Self {
        Self { workspace, db, types: NoteTypeManager::new(workspace, db), guard: PathGuard::new(&workspace.root) }
    }

    /// Create a note, deriving its filename from a slugified title
    /// (collisions suffixed `-2`, `-3`, ...).
    pub fn create_note(&self, note_type: &str, title: &str, mut metadata: BTreeMap<String, Value>, body: &str) -> Result<Note> {
        let nt = self.types.get(note_type)?;
        reject_protected_keys(&metadata)?;
        nt.metadata_schema.validate_and_fill(&mut metadata)?;

        let base_slug = slugify(title);
        let mut filename = format!("{}.md", base_slug);
        let mut suffix = 2;
        loop {
            let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
            if !path.exists() {
                break;
            }
            filename = format!("{}-{}.md", base_slug, suffix);
            suffix += 1;
        }

        let now = now_rfc3339();
        let frontmatter = build_frontmatter(title, note_type, &now, &now, &metadata, Some(&nt.metadata_schema));
        let header = serialize_frontmatter(&frontmatter)?;
        let full_content = format!("{}\n{}\n", header, body.trim());

        let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
        atomic_write(&path, full_content.as_bytes())?;
        self.reindex_from_disk(note_type, &filename)
    }

    /// Batch-create several notes; each is independent, so one failure
    /// doesn't prevent the rest from being created.
    pub fn batch_create_notes(&self, requests: Vec<(String, String, BTreeMap<String, Value>, String)>) -> Vec<Result<Note>> {
        requests.into_iter().map(|(note_type, title, metadata, body)| self.create_note(&note_type, &title, metadata, &body)).collect()
    }

    /// Resolve an identifier (`type/filename[.md]`, bare filename, or
    /// title) to a concrete `(note_type, filename)` pair.
    fn resolve_identifier(&self, identifier: &str) -> Result<(String, String)> {
        if let Some((note_type, rest)) = identifier.split_once('/') {
            let filename = if rest.ends_with(".md") { rest.to_string() } else { format!("{}.md", rest) };
            return Ok((note_type.to_string(), filename));
        }
        let resolved = self.db.resolve_target(identifier)?.ok_or_else(|| CoreError::not_found(format!("note '{}'", identifier)))?;
        let (note_type, filename) = split_id(&resolved)?;
        Ok((note_type.to_string(), filename.to_string()))
    }

    /// Load a note fresh from disk (the filesystem, not the index, is the
    /// source of truth for content). Accepts `type/filename`, a bare
    /// filename, or a title.
    pub fn get_note(&self, identifier: &str) -> Result<Note> {
        let (note_type, filename) = self.resolve_identifier(identifier)?;
        self.load_from_disk(&note_type, &filename)
    }

    /// Load several notes by identifier in parallel; best-effort, one
    /// result per input.
    pub fn get_notes(&self, identifiers: &[String]) -> Vec<Result<Note>> {
        identifiers.par_iter().map(|id| self.get_note(id)).collect()
    }

    /// List notes from the index, optionally filtered by type. Metadata
    /// comes from the index; reach for [`NoteManager::get_note`] for the
    /// authoritative body.
    pub fn list_notes(&self, note_type: Option<&str>) -> Result<Vec<Note>> {
        self.db.list_notes(note_type)?.into_iter().map(|row| Ok(row_to_note(row))).collect()
    }

    /// Replace a note's body, rejecting the write if `expected_hash` is
    /// stale.
    pub fn update_note(&self, identifier: &str, expected_hash: &str, new_body: &str) -> Result<Note> {
        self.apply_update(identifier, expected_hash, None, Some(new_body))
    }

    /// Patch a note's metadata (and optionally its body) in one
    /// hash-gated write. `patch` entries overwrite existing keys; the rest
    /// of the metadata is preserved.
    pub fn update_note_with_metadata(
        &self,
        identifier: &str,
        expected_hash: &str,
        patch: BTreeMap<String, Value>,
        new_body: Option<&str>,
    ) -> Result<Note> {
        reject_protected_keys(&patch)?;
        self.apply_update(identifier, expected_hash, Some(patch), new_body)
    }

    fn apply_update(
        &self,
        identifier: &str,
        expected_hash: &str,
        patch: Option<BTreeMap<String, Value>>,
        new_body: Option<&str>,
    ) -> Result<Note> {
        let (note_type, filename) = self.resolve_identifier(identifier)?;
        let current = self.load_from_disk(&note_type, &filename)?;
        if current.content_hash != expected_hash {
            return Err(CoreError::ContentHashMismatch { current: current.content_hash, provided: expected_hash.to_string() });
        }

        let nt = self.types.get(&note_type)?;
        let mut metadata = current.metadata;
        if let Some(patch) = patch {
            for (k, v) in patch {
                metadata.insert(k, v);
            }
        }
        nt.metadata_schema.validate_and_fill(&mut metadata)?;

        let now = now_rfc3339();
        let frontmatter = build_frontmatter(&current.title, &note_type, &current.created, &now, &metadata, Some(&nt.metadata_schema));
        let header = serialize_frontmatter(&frontmatter)?;
        let body = new_body.unwrap_or(&current.body);
        let full_content = format!("{}\n{}\n", header, body.trim());

        let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
        atomic_write(&path, full_content.as_bytes())?;
        self.reindex_from_disk(&note_type, &filename)
    }

    /// Rename a note's title, keeping its id (and therefore every link by
    /// id) stable. Referring notes that spelled out the old title in a
    /// wikilink have their link text rewritten to the new title.
    pub fn rename_note(&self, identifier: &str, new_title: &str, expected_hash: &str) -> Result<RenameReport> {
        let (note_type, filename) = self.resolve_identifier(identifier)?;
        let current = self.load_from_disk(&note_type, &filename)?;
        if current.content_hash != expected_hash {
            return Err(CoreError::ContentHashMismatch { current: current.content_hash, provided: expected_hash.to_string() });
        }
        let old_title = current.title.clone();
        if old_title == new_title {
            return Ok(RenameReport { note: current, notes_updated: 0, links_updated: 0 });
        }

        let nt = self.types.get(&note_type)?;
        let now = now_rfc3339();
        let frontmatter = build_frontmatter(new_title, &note_type, &current.created, &now, &current.metadata, Some(&nt.metadata_schema));
        let header = serialize_frontmatter(&frontmatter)?;
        let full_content = format!("{}\n{}\n", header, current.body.trim());
        let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
        atomic_write(&path, full_content.as_bytes())?;
        let renamed = self.reindex_from_disk(&note_type, &filename)?;

        let id = note_id(&note_type, &filename);
        let backlinks = self.db.backlinks(&id)?;
        let (notes_updated, links_updated) = self.propagate_rewrite(&backlinks, &old_title, new_title)?;

        Ok(RenameReport { note: renamed, notes_updated, links_updated })
    }

    /// Move a note to a different note type, keeping its filename. Referring
    /// links that spelled out the old `type/filename` path explicitly are
    /// rewritten; a bare `[[filename]]` or title reference still resolves
    /// after a move since neither changes.
    pub fn move_note(&self, identifier: &str, new_note_type: &str, expected_hash: &str) -> Result<MoveReport> {
        let (old_note_type, filename) = self.resolve_identifier(identifier)?;
        if old_note_type == new_note_type {
            return Err(CoreError::ValidationFailed("note is already of that type".to_string()));
        }
        if !self.types.exists(new_note_type) {
            return Err(CoreError::not_found(format!("note type '{}'", new_note_type)));
        }
        let current = self.load_from_disk(&old_note_type, &filename)?;
        if current.content_hash != expected_hash {
            return Err(CoreError::ContentHashMismatch { current: current.content_hash, provided: expected_hash.to_string() });
        }

        let old_path = self.guard.resolve(&format!("{}/{}", old_note_type, filename))?;
        let new_path = self.guard.resolve(&format!("{}/{}", new_note_type, filename))?;
        if new_path.exists() {
            return Err(CoreError::AlreadyExists(format!("note '{}/{}'", new_note_type, filename)));
        }

        let old_id = note_id(&old_note_type, &filename);
        let new_id = note_id(new_note_type, &filename);
        let backlinks = self.db.backlinks(&old_id)?;

        let nt = self.types.get(new_note_type)?;
        let mut metadata = current.metadata;
        nt.metadata_schema.validate_and_fill(&mut metadata)?;
        let now = now_rfc3339();
        let frontmatter = build_frontmatter(&current.title, new_note_type, &current.created, &now, &metadata, Some(&nt.metadata_schema));
        let header = serialize_frontmatter(&frontmatter)?;
        let full_content = format!("{}\n{}\n", header, current.body.trim());

        atomic_write(&new_path, full_content.as_bytes())?;
        fs::remove_file(&old_path).map_err(|e| CoreError::io("remove_file", &old_path, e))?;
        self.db.delete_note(&old_id)?;

        let moved = self.reindex_from_disk(new_note_type, &filename)?;
        let (notes_with_updated_links, links_updated) = self.propagate_rewrite(&backlinks, &old_id, &new_id)?;

        Ok(MoveReport { note: moved, old_id, notes_with_updated_links, links_updated })
    }

    pub fn delete_note(&self, identifier: &str, expected_hash: &str, confirm: bool) -> Result<()> {
        if self.workspace.config.deletion.confirm && !confirm {
            return Err(CoreError::PolicyDenied("note deletion requires confirm=true per deletion policy".to_string()));
        }
        let (note_type, filename) = self.resolve_identifier(identifier)?;
        let current = self.load_from_disk(&note_type, &filename)?;
        if current.content_hash != expected_hash {
            return Err(CoreError::ContentHashMismatch { current: current.content_hash, provided: expected_hash.to_string() });
        }
        self.delete_note_row(&note_type, &filename, &current.id)
    }

    fn delete_note_row(&self, note_type: &str, filename: &str, id: &str) -> Result<()> {
        let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
        if let Some(backup_dir) = &self.workspace.config.deletion.backup_path {
            fs::create_dir_all(backup_dir).map_err(|e| CoreError::io("create_dir_all", backup_dir, e))?;
            let dest = backup_dir.join(format!("{}_{}", note_type, filename));
            fs::copy(&path, &dest).map_err(|e| CoreError::io("copy", &path, e))?;
        }
        fs::remove_file(&path).map_err(|e| CoreError::io("remove_file", &path, e))?;
        self.db.delete_note(id)
    }

    /// Select notes by type/tags/title-or-id pattern and delete all of
    /// them, enforcing the vault's `deletion.max_bulk` policy. Each note is
    /// attempted independently (in parallel); failures are reported rather
    /// than aborting the batch.
    pub fn bulk_delete_notes(&self, selector: BulkDeleteSelector, confirm: bool) -> Result<BulkDeleteReport> {
        if self.workspace.config.deletion.confirm && !confirm {
            return Err(CoreError::PolicyDenied("bulk note deletion requires confirm=true per deletion policy".to_string()));
        }
        let pattern = selector.pattern.map(Regex::new).transpose()?;
        let candidates = self.db.list_notes(selector.note_type)?;
        let matches: Vec<NoteRow> = candidates
            .into_iter()
            .filter(|row| {
                let tag_ok = selector.tags.is_empty() || row.metadata.get("tags").is_some_and(|v| tags_match(v, selector.tags));
                let pattern_ok = pattern.as_ref().is_none_or(|re| re.is_match(&row.id) || re.is_match(&row.title));
                tag_ok && pattern_ok
            })
            .collect();

        let max_bulk = self.workspace.config.deletion.max_bulk;
        if matches.len() > max_bulk {
            return Err(CoreError::PolicyDenied(format!(
                "bulk delete of {} notes exceeds the configured limit of {}",
                matches.len(),
                max_bulk
            )));
        }

        let results: Vec<(String, std::result::Result<(), String>)> = matches
            .par_iter()
            .map(|row| {
                let result = self.delete_note_row(&row.note_type, &row.filename, &row.id).map_err(|e| e.to_string());
                (row.id.clone(), result)
            })
            .collect();

        let mut report = BulkDeleteReport { deleted: Vec::new(), failed: Vec::new() };
        for (id, result) in results {
            match result {
                Ok(()) => report.deleted.push(id),
                Err(e) => report.failed.push((id, e)),
            }
        }
        Ok(report)
    }

    /// Rewrite every referring file's wikilink text from `old_target` to
    /// `new_target` and reindex it. Returns `(notes_touched, links_rewritten)`.
    fn propagate_rewrite(&self, backlinks: &[crate::db::LinkRow], old_target: &str, new_target: &str) -> Result<(usize, usize)> {
        let mut sources: Vec<&str> = backlinks.iter().map(|l| l.source_id.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();

        let mut notes_touched = 0;
        let mut links_rewritten = 0;
        for source_id in sources {
            let Ok((source_type, source_filename)) = split_id(source_id) else { continue };
            let path = match self.guard.resolve(&format!("{}/{}", source_type, source_filename)) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let Ok(content) = fs::read_to_string(&path) else { continue };
            let (rewritten, count) = rewrite_wikilink_target(&content, old_target, new_target);
            if count == 0 {
                continue;
            }
            if let Err(e) = atomic_write(&path, rewritten.as_bytes()) {
                warn!("failed to rewrite links in {}: {}", path.display(), e);
                continue;
            }
            if let Err(e) = self.reindex_from_disk(source_type, source_filename) {
                warn!("failed to reindex {} after link rewrite: {}", source_id, e);
                continue;
            }
            notes_touched += 1;
            links_rewritten += count;
        }
        Ok((notes_touched, links_rewritten))
    }

    fn load_from_disk(&self, note_type: &str, filename: &str) -> Result<Note> {
        let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
        if !path.is_file() {
            return Err(CoreError::not_found(format!("note '{}/{}'", note_type, filename)));
        }
        let content = fs::read_to_string(&path).map_err(|e| CoreError::io("read", &path, e))?;
        self.note_from_content(note_type, filename, &content)
    }

    fn note_from_content(&self, note_type: &str, filename: &str, content: &str) -> Result<Note> {
        let split = split_frontmatter(content);
        let schema = self.types.get(note_type).ok().map(|nt| nt.metadata_schema);
        let fm = parse_frontmatter(content)?;
        let metadata = fm.as_ref().map(|v| extract_metadata(v, schema.as_ref())).unwrap_or_default();

        let title = fm
            .as_ref()
            .and_then(|v| v.get("title"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .unwrap_or_else(|| filename.trim_end_matches(".md").to_string());
        let created = fm.as_ref().and_then(|v| v.get("created")).and_then(|v| v.as_str()).map(String::from).unwrap_or_default();
        let updated = fm.as_ref().and_then(|v| v.get("updated")).and_then(|v| v.as_str()).map(String::from).unwrap_or_default();

        Ok(Note {
            id: note_id(note_type, filename),
            note_type: note_type.to_string(),
            filename: filename.to_string(),
            title,
            created,
            updated,
            content_hash: hash_note_content(content.as_bytes()),
            metadata,
            body: split.body.to_string(),
        })
    }

    /// Re-read a note's current file content and build the index record for
    /// it — metadata, FTS entry, and resolved links — without writing it.
    /// Used both by [`Self::reindex_from_disk`] (one note) and by
    /// `HybridSearch::rebuild_index` (the whole vault, upserted atomically).
    pub(crate) fn build_record_from_disk(&self, note_type: &str, filename: &str) -> Result<(Note, NoteRecord)> {
        let path = self.guard.resolve(&format!("{}/{}", note_type, filename))?;
        let content = fs::read_to_string(&path).map_err(|e| CoreError::io("read", &path, e))?;
        let note = self.note_from_content(note_type, filename, &content)?;
        let full_fm = parse_frontmatter(&content)?;

        let mut wikilinks = extract_wikilinks(&note.body);
        if let Some(fm_value) = &full_fm {
            wikilinks.extend(extract_frontmatter_wikilinks(fm_value));
        }
        let externals = extract_external_links(&note.body);

        let graph = LinkGraph::new(self.db);
        let links = graph.build_rows(&wikilinks, &externals)?;

        let record = NoteRecord {
            id: note.id.clone(),
            note_type: note.note_type.clone(),
            filename: note.filename.clone(),
            title: note.title.clone(),
            created: note.created.clone(),
            updated: note.updated.clone(),
            content_hash: note.content_hash.clone(),
            path: format!("{}/{}", note.note_type, note.filename),
            size: content.len() as i64,
            body: note.body.clone(),
            metadata: note.metadata.clone(),
            links,
        };
        Ok((note, record))
    }

    /// Re-read a note's current file content and fully re-upsert it into
    /// the index: metadata, FTS entry, and resolved links.
    pub(crate) fn reindex_from_disk(&self, note_type: &str, filename: &str) -> Result<Note> {
        let (note, record) = self.build_record_from_disk(note_type, filename)?;
        self.db.upsert_note(&record)?;
        debug!("reindexed {}", note.id);
        Ok(note)
    }
}

fn row_to_note(row: NoteRow) -> Note {
    Note {
        id: row.id,
        note_type: row.note_type,
        filename: row.filename,
        title: row.title,
        created: row.created,
        updated: row.updated,
        content_hash: row.content_hash,
        metadata: row.metadata,
        body: String::new(),
    }
}
