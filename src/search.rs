//! Hybrid search over the index: scored full-text search, structured
//! metadata search, safe ad-hoc SQL, and filesystem-backed index rebuilds.

use crate::db::{AdvancedQuery, DatabaseStore, MetadataFilter, NoteRow};
use crate::error::{CoreError, Result};
use crate::note::NoteManager;
use crate::note_type::NoteTypeManager;
use crate::schema::Value;
use crate::workspace::Workspace;
use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use std::fs;
use std::sync::Mutex;
use std::time::Duration;

/// One ranked hit from [`HybridSearch::search_notes`].
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub note_id: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
}

/// A single `{key, op, value}` metadata constraint for
/// [`HybridSearch::search_notes_advanced`].
#[derive(Debug, Clone)]
pub struct MetadataCondition {
    pub key: String,
    pub op: String,
    pub value: String,
}

/// Structured search request. Relative durations ("7d", "1h") in
/// `updated_within`/`updated_before`/`created_within`/`created_before` are
/// resolved against the current time before hitting the index.
#[derive(Debug, Clone, Default)]
pub struct AdvancedSearchQuery {
    pub note_type: Option<String>,
    pub metadata_filters: Vec<MetadataCondition>,
    pub updated_within: Option<String>,
    pub updated_before: Option<String>,
    pub created_within: Option<String>,
    pub created_before: Option<String>,
    pub content_contains: Option<String>,
    pub title_query: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub fields: Option<Vec<String>>,
}

/// Parse a relative duration like `7d`, `12h`, `30m`, `45s` into a
/// [`ChronoDuration`].
fn parse_duration(spec: &str) -> Result<ChronoDuration> {
    let spec = spec.trim();
    let (num, unit) = spec.split_at(spec.len().saturating_sub(1));
    let n: i64 = num.parse().map_err(|_| CoreError::ValidationFailed(format!("invalid duration '{}'", spec)))?;
    match unit {
        "d" => Ok(ChronoDuration::days(n)),
        "h" => Ok(ChronoDuration::hours(n)),
        "m" => Ok(ChronoDuration::minutes(n)),
        "s" => Ok(ChronoDuration::seconds(n)),
        _ => Err(CoreError::ValidationFailed(format!("invalid duration unit in '{}'", spec))),
    }
}

fn resolve_relative(spec: &str) -> Result<String> {
    let duration = parse_duration(spec)?;
    Ok((Utc::now() - duration).to_rfc3339())
}

fn word_boundary_match(query: &str, text: &str) -> bool {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(query))).map(|re| re.is_match(text)).unwrap_or(false)
}

fn snippet_around(text: &str, query: &str, radius: usize) -> String {
    let lower = text.to_lowercase();
    let q_lower = query.to_lowercase();
    match lower.find(&q_lower) {
        Some(pos) => {
            let start = pos.saturating_sub(radius);
            let end = (pos + query.len() + radius).min(text.len());
            let start = text.char_indices().find(|(i, _)| *i >= start).map(|(i, _)| i).unwrap_or(0);
            let end = text.char_indices().find(|(i, _)| *i >= end).map(|(i, _)| i).unwrap_or(text.len());
            text[start..end].to_string()
        }
        None => text.chars().take(radius * 2).collect(),
    }
}

/// `HybridSearch` answers reads against the index and keeps it current by
/// rebuilding from the filesystem when asked to.
pub struct HybridSearch<'a> {
    workspace: &'a Workspace,
    db: &'a DatabaseStore,
    rebuild_lock: Mutex<()>,
}

impl<'a> HybridSearch<'a> {
    pub fn new(workspace: &'a Workspace, db: &'a DatabaseStore) -> Self {
        Self { workspace, db, rebuild_lock: Mutex::new(()) }
    }

    /// Full-text / regex search over notes. An empty query returns every
    /// note (optionally type-filtered) ordered most-recently-updated first.
    pub fn search_notes(&self, query: &str, type_filter: Option<&str>, limit: Option<usize>, use_regex: bool) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(50);

        if query.trim().is_empty() {
            return Ok(self
                .db
                .list_notes_recent(type_filter, limit)?
                .into_iter()
                .map(|row| SearchResult { note_id: row.id, title: row.title, snippet: String::new(), score: 0.0 })
                .collect());
        }

        if use_regex {
            return self.search_notes_regex(query, type_filter, limit);
        }

        let hits = self.db.full_text_search(query, limit.max(200))?;
        let mut scored = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(row) = self.db.get_note(&hit.note_id)? else { continue };
            if let Some(t) = type_filter
                && row.note_type != t {
                    continue;
                }
            let mut score = 2.0;
            let q_lower = query.to_lowercase();
            if row.title.to_lowercase().contains(&q_lower) {
                score += 10.0;
            }
            if let Some(Value::Array(tags)) = row.metadata.get("tags")
                && tags.iter().any(|t| t.as_str().is_some_and(|s| s.to_lowercase().contains(&q_lower))) {
                    score += 8.0;
                }
            if word_boundary_match(query, &row.title) {
                score += 1.0;
            }
            scored.push(SearchResult { note_id: hit.note_id, title: row.title, snippet: hit.snippet, score });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn search_notes_regex(&self, pattern: &str, type_filter: Option<&str>, limit: usize) -> Result<Vec<SearchResult>> {
        let re = Regex::new(pattern)?;
        let rows = self.db.list_notes(type_filter)?;
        let mut results = Vec::new();
        for row in rows {
            let body = self.read_body(&row).unwrap_or_default();
            let mut score = 0.0;
            if re.is_match(&row.title) {
                score += 10.0;
            }
            if re.is_match(&body) {
                score += 5.0;
            }
            if let Some(Value::Array(tags)) = row.metadata.get("tags")
                && tags.iter().any(|t| t.as_str().is_some_and(|s| re.is_match(s))) {
                    score += 3.0;
                }
            if score == 0.0 {
                continue;
            }
            let snippet = snippet_around(&body, pattern, 40);
            results.push(SearchResult { note_id: row.id, title: row.title, snippet, score });
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }

    fn read_body(&self, row: &NoteRow) -> Option<String> {
        let path = self.workspace.note_path(&row.note_type, &row.filename);
        let content = fs::read_to_string(path).ok()?;
        Some(crate::frontmatter::split_frontmatter(&content).body.to_string())
    }

    /// Structured search translated into SQL joins over `notes` and
    /// `note_metadata`.
    pub fn search_notes_advanced(&self, query: AdvancedSearchQuery) -> Result<Vec<NoteRow>> {
        let mut q = AdvancedQuery {
            note_type: query.note_type,
            metadata_filters: query.metadata_filters.into_iter().map(|f| MetadataFilter { key: f.key, op: f.op, value: f.value }).collect(),
            content_contains: query.content_contains,
            title_query: query.title_query,
            sort: query.sort,
            limit: query.limit,
            offset: query.offset,
            ..Default::default()
        };
        if let Some(spec) = &query.updated_within {
            q.updated_after = Some(resolve_relative(spec)?);
        }
        if let Some(spec) = &query.updated_before {
            q.updated_before = Some(resolve_relative(spec)?);
        }
        if let Some(spec) = &query.created_within {
            q.created_after = Some(resolve_relative(spec)?);
        }
        if let Some(spec) = &query.created_before {
            q.created_before = Some(resolve_relative(spec)?);
        }

        let mut rows = self.db.advanced_search(&q)?;
        if let Some(fields) = &query.fields {
            for row in &mut rows {
                row.metadata.retain(|k, _| fields.contains(k));
            }
        }
        Ok(rows)
    }

    /// Run caller-supplied read-only SQL against the index (see
    /// [`crate::db::sql_guard`]), with bound parameters and an optional row
    /// limit.
    pub fn search_notes_sql(
        &self,
        sql: &str,
        params: &[rusqlite::types::Value],
        limit: Option<usize>,
        timeout: Duration,
    ) -> Result<crate::db::sql_guard::AdHocResult> {
        self.db.execute_ad_hoc(sql, params, limit, timeout)
    }

    /// Walk the vault's note-type directories and re-upsert every note into
    /// the index. Concurrent calls are serialized by an internal mutex.
    pub fn rebuild_index(&self, on_progress: Option<&dyn Fn(usize, usize)>) -> Result<usize> {
        let _guard = self.rebuild_lock.lock().expect("rebuild lock poisoned");
        let manager = NoteManager::new(self.workspace, self.db);
        let types = NoteTypeManager::new(self.workspace, self.db).list()?;

        let mut files = Vec::new();
        for nt in &types {
            let dir = self.workspace.note_type_dir(&nt.name);
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "md")
                    && let Some(fname) = path.file_name().and_then(|f| f.to_str())
                        && fname != "_description.md" {
                            files.push((nt.name.clone(), fname.to_string()));
                        }
            }
        }

        let total = files.len();
        let mut processed = 0;
        let mut records = Vec::with_capacity(total);
        for (note_type, filename) in &files {
            let (_, record) = manager.build_record_from_disk(note_type, filename)?;
            records.push(record);
            processed += 1;
            if let Some(cb) = on_progress {
                cb(processed, total);
            }
        }
        self.db.rebuild_all(&records)?;
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note_type::NoteTypeManager as NTM;
    use crate::schema::MetadataSchema;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Workspace, DatabaseStore) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::initialize_vault(dir.path()).unwrap();
        let db = DatabaseStore::open_in_memory().unwrap();
        NTM::new(&ws, &db).create("reading", "Books", None, MetadataSchema::default()).unwrap();
        (dir, ws, db)
    }

    #[test]
    fn empty_query_lists_all_notes_by_recency() {
        let (_dir, ws, db) = setup();
        let mgr = NoteManager::new(&ws, &db);
        mgr.create_note("reading", "First", BTreeMap::new(), "a").unwrap();
        mgr.create_note("reading", "Second", BTreeMap::new(), "b").unwrap();

        let search = HybridSearch::new(&ws, &db);
        let results = search.search_notes("", None, None, false).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn full_text_search_finds_matching_body() {
        let (_dir, ws, db) = setup();
        let mgr = NoteManager::new(&ws, &db);
        mgr.create_note("reading", "Atomic Habits", BTreeMap::new(), "a book about habits and focus").unwrap();

        let search = HybridSearch::new(&ws, &db);
        let results = search.search_notes("habits", None, None, false).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].note_id, "reading/atomic-habits.md");
    }

    #[test]
    fn regex_search_scores_title_higher_than_body() {
        let (_dir, ws, db) = setup();
        let mgr = NoteManager::new(&ws, &db);
        mgr.create_note("reading", "Focus", BTreeMap::new(), "irrelevant body").unwrap();
        mgr.create_note("reading", "Other", BTreeMap::new(), "mentions focus in passing").unwrap();

        let search = HybridSearch::new(&ws, &db);
        let results = search.search_notes("(?i)focus", None, None, true).unwrap();
        assert_eq!(results[0].title, "Focus");
    }

    #[test]
    fn advanced_search_filters_by_metadata() {
        let (_dir, ws, db) = setup();
        let mgr = NoteManager::new(&ws, &db);
        let mut meta = BTreeMap::new();
        meta.insert("rating".to_string(), Value::Number(5.0));
        mgr.create_note("reading", "Atomic Habits", meta, "body").unwrap();

        let search = HybridSearch::new(&ws, &db);
        let result = search
            .search_notes_advanced(AdvancedSearchQuery {
                metadata_filters: vec![MetadataCondition { key: "rating".to_string(), op: ">=".to_string(), value: "4".to_string() }],
                ..Default::default()
            })
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].title, "Atomic Habits");
    }

    #[test]
    fn rebuild_index_reports_progress() {
        let (_dir, ws, db) = setup();
        let mgr = NoteManager::new(&ws, &db);
        mgr.create_note("reading", "A", BTreeMap::new(), "x").unwrap();
        mgr.create_note("reading", "B", BTreeMap::new(), "y").unwrap();

        let search = HybridSearch::new(&ws, &db);
        let calls = Mutex::new(Vec::new());
        let count = search.rebuild_index(Some(&|done, total| calls.lock().unwrap().push((done, total)))).unwrap();
        assert_eq!(count, 2);
        assert_eq!(calls.lock().unwrap().last(), Some(&(2, 2)));
    }

    #[test]
    fn rebuild_index_purges_notes_removed_from_disk() {
        let (_dir, ws, db) = setup();
        let mgr = NoteManager::new(&ws, &db);
        let a = mgr.create_note("reading", "A", BTreeMap::new(), "x").unwrap();
        mgr.create_note("reading", "B", BTreeMap::new(), "y").unwrap();

        std::fs::remove_file(ws.note_path(&a.note_type, &a.filename)).unwrap();

        let search = HybridSearch::new(&ws, &db);
        let count = search.rebuild_index(None).unwrap();
        assert_eq!(count, 1);
        assert!(db.get_note(&a.id).unwrap().is_none(), "stale row for a deleted file must be purged");
        assert!(db.get_note("reading/b.md").unwrap().is_some());
    }
}
