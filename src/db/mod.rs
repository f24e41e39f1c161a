//! The embedded SQLite index: note rows, full-text search, structured
//! metadata search, the link table, and safe ad-hoc SQL.
//!
//! Every mutation that touches more than one table runs inside a single
//! transaction so a crash mid-write can never leave the FTS index or the
//! link table out of sync with `notes`. FTS sync is explicit delete+insert
//! (not trigger-based), mirroring the pattern that keeps the rest of the
//! schema easy to reason about from Rust instead of from trigger bodies.

pub mod sql_guard;

use crate::error::{CoreError, Result};
use crate::schema::Value;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// One row of the `notes` table plus its typed metadata, as loaded from the
/// index (not the filesystem).
#[derive(Debug, Clone)]
pub struct NoteRow {
    pub id: String,
    pub note_type: String,
    pub filename: String,
    pub title: String,
    pub created: String,
    pub updated: String,
    pub content_hash: String,
    pub content: String,
    pub path: String,
    pub size: i64,
    pub metadata: BTreeMap<String, Value>,
}

/// A link row as stored (and resolved, if possible) in the `links` table.
/// `kind` is only meaningful for external links (`url` or `image`); internal
/// wikilinks carry `None`.
#[derive(Debug, Clone)]
pub struct LinkRow {
    pub source_id: String,
    pub target_raw: String,
    pub target_id: Option<String>,
    pub is_external: bool,
    pub alias: Option<String>,
    pub heading: Option<String>,
    pub block_id: Option<String>,
    pub embed: bool,
    pub line: i64,
    pub kind: Option<String>,
}

/// Everything [`DatabaseStore::upsert_note`] needs to reindex one note in a
/// single transaction.
#[derive(Debug, Clone)]
pub struct NoteRecord {
    pub id: String,
    pub note_type: String,
    pub filename: String,
    pub title: String,
    pub created: String,
    pub updated: String,
    pub content_hash: String,
    pub path: String,
    pub size: i64,
    pub body: String,
    pub metadata: BTreeMap<String, Value>,
    pub links: Vec<LinkRow>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub note_id: String,
    pub title: String,
    pub snippet: String,
    pub score: f64,
}

/// One `{key, op, value}` term of a structured metadata search.
/// `op` is one of `=`, `!=`, `>`, `<`, `>=`, `<=`, `LIKE`, `IN`.
#[derive(Debug, Clone)]
pub struct MetadataFilter {
    pub key: String,
    pub op: String,
    pub value: String,
}

/// Structured query translated into SQL joins over `notes` and
/// `note_metadata` by [`DatabaseStore::advanced_search`]. Date bounds are
/// absolute RFC3339 timestamps; relative durations ("7d", "1h") are resolved
/// by the caller before reaching this layer.
#[derive(Debug, Clone, Default)]
pub struct AdvancedQuery {
    pub note_type: Option<String>,
    pub metadata_filters: Vec<MetadataFilter>,
    pub updated_after: Option<String>,
    pub updated_before: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub content_contains: Option<String>,
    pub title_query: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Embedded SQLite-backed index for one vault.
pub struct DatabaseStore {
    conn: Mutex<Connection>,
}

impl DatabaseStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::io("create_dir_all", parent, e))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Insert or fully replace one note's row, metadata, FTS entry, and
    /// outgoing links. All writes happen in one transaction.
    pub fn upsert_note(&self, note: &NoteRecord) -> Result<()> {
        let mut conn = self.conn.lock().expect("db mutex poisoned");
        let tx = conn.transaction()?;
        insert_note_tx(&tx, note)?;
        tx.commit()?;
        debug!("indexed note {} ({} links)", note.id, note.links.len());
        Ok(())
    }

    /// Replace the entire index (all notes, metadata, FTS entries, and
    /// links) with `records`, atomically: either every record lands or none
    /// does, and stale rows for notes no longer on disk are purged as part
    /// of the same transaction.
    pub fn rebuild_all(&self, records: &[NoteRecord]) -> Result<()> {
        let mut conn = self.conn.lock().expect("db mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notes", [])?;
        tx.execute("DELETE FROM note_metadata", [])?;
        tx.execute("DELETE FROM notes_fts", [])?;
        tx.execute("DELETE FROM links", [])?;
        for record in records {
            insert_note_tx(&tx, record)?;
        }
        tx.commit()?;
        debug!("rebuilt index with {} notes", records.len());
        Ok(())
    }

    pub fn delete_note(&self, note_id: &str) -> Result<()> {
        let mut conn = self.conn.lock().expect("db mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM notes WHERE id = ?1", params![note_id])?;
        tx.execute("DELETE FROM note_metadata WHERE note_id = ?1", params![note_id])?;
        tx.execute("DELETE FROM notes_fts WHERE id = ?1", params![note_id])?;
        tx.execute("DELETE FROM links WHERE source_id = ?1", params![note_id])?;
        tx.execute("UPDATE links SET target_id = NULL WHERE target_id = ?1", params![note_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Rename a note's id (`type/filename`) in place: updates the notes row,
    /// its FTS entry, its metadata, and rewrites every link that resolved to
    /// the old id. Returns the number of links repointed.
    pub fn rename_note_id(&self, old_id: &str, new_id: &str, new_filename: &str) -> Result<usize> {
        let mut conn = self.conn.lock().expect("db mutex poisoned");
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE notes SET id = ?1, filename = ?2 WHERE id = ?3",
            params![new_id, new_filename, old_id],
        )?;
        tx.execute("UPDATE note_metadata SET note_id = ?1 WHERE note_id = ?2", params![new_id, old_id])?;
        tx.execute("UPDATE notes_fts SET id = ?1 WHERE id = ?2", params![new_id, old_id])?;
        tx.execute("UPDATE links SET source_id = ?1 WHERE source_id = ?2", params![new_id, old_id])?;
        let updated = tx.execute("UPDATE links SET target_id = ?1 WHERE target_id = ?2", params![new_id, old_id])?;

        tx.commit()?;
        Ok(updated)
    }

    pub fn get_note(&self, note_id: &str) -> Result<Option<NoteRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let row = conn
            .query_row(
                "SELECT id, note_type, filename, title, created, updated, content_hash, content, path, size FROM notes WHERE id = ?1",
                params![note_id],
                row_to_tuple,
            )
            .optional()?;

        let Some(tuple) = row else {
            return Ok(None);
        };
        let metadata = self.load_metadata(&conn, tuple_id(&tuple))?;
        Ok(Some(note_row_from_tuple(tuple, metadata)))
    }

    pub fn list_notes(&self, note_type: Option<&str>) -> Result<Vec<NoteRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = match note_type {
            Some(_) => conn.prepare(
                "SELECT id, note_type, filename, title, created, updated, content_hash, content, path, size FROM notes WHERE note_type = ?1 ORDER BY id",
            )?,
            None => conn.prepare(
                "SELECT id, note_type, filename, title, created, updated, content_hash, content, path, size FROM notes ORDER BY id",
            )?,
        };
        let rows = if let Some(t) = note_type {
            stmt.query_map(params![t], row_to_tuple)?.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_tuple)?.collect::<std::result::Result<Vec<_>, _>>()?
        };

        rows.into_iter()
            .map(|tuple| {
                let metadata = self.load_metadata(&conn, tuple_id(&tuple))?;
                Ok(note_row_from_tuple(tuple, metadata))
            })
            .collect()
    }

    fn load_metadata(&self, conn: &Connection, note_id: &str) -> Result<BTreeMap<String, Value>> {
        let mut stmt = conn.prepare("SELECT key, value, value_type FROM note_metadata WHERE note_id = ?1")?;
        let rows = stmt.query_map(params![note_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
        })?;
        let mut map = BTreeMap::new();
        for row in rows {
            let (key, value, value_type) = row?;
            map.insert(key, value_from_storage(&value_type, &value));
        }
        Ok(map)
    }

    /// Resolve a wikilink target to a note id: exact `type/filename` match,
    /// then exact title match (only if unambiguous), then filename-stem
    /// match (only if unambiguous).
    pub fn resolve_target(&self, target: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let target = target.trim();
        let target_with_ext = if target.ends_with(".md") { target.to_string() } else { format!("{}.md", target) };

        if target.contains('/') {
            let found: Option<String> =
                conn.query_row("SELECT id FROM notes WHERE id = ?1", params![target_with_ext], |r| r.get(0)).optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }

        let mut stmt = conn.prepare("SELECT id FROM notes WHERE lower(title) = lower(?1)")?;
        let title_matches: Vec<String> = stmt.query_map(params![target], |r| r.get(0))?.collect::<std::result::Result<_, _>>()?;
        if title_matches.len() == 1 {
            return Ok(Some(title_matches.into_iter().next().unwrap()));
        }

        let stem = target_with_ext.strip_suffix(".md").unwrap_or(target);
        let mut stmt = conn.prepare("SELECT id FROM notes WHERE lower(filename) = lower(?1) OR lower(filename) = lower(?2)")?;
        let filename_matches: Vec<String> = stmt
            .query_map(params![format!("{}.md", stem), stem], |r| r.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        if filename_matches.len() == 1 {
            return Ok(Some(filename_matches.into_iter().next().unwrap()));
        }

        Ok(None)
    }

    pub fn backlinks(&self, note_id: &str) -> Result<Vec<LinkRow>> {
        self.links_where("target_id = ?1", note_id)
    }

    pub fn outgoing_links(&self, note_id: &str) -> Result<Vec<LinkRow>> {
        self.links_where("source_id = ?1", note_id)
    }

    pub fn broken_links(&self) -> Result<Vec<LinkRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT source_id, target_raw, target_id, is_external, alias, heading, block_id, embed, line, kind
             FROM links WHERE is_external = 0 AND target_id IS NULL",
        )?;
        let rows = stmt.query_map([], link_row_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    fn links_where(&self, clause: &str, param: &str) -> Result<Vec<LinkRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let sql = format!(
            "SELECT source_id, target_raw, target_id, is_external, alias, heading, block_id, embed, line, kind FROM links WHERE {}",
            clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![param], link_row_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// Re-resolve every unresolved (or now-stale) link in the index against
    /// the current `notes` table. Used after a rename/move/delete so broken
    /// links recover if their target reappears under a new id.
    pub fn reresolve_links(&self) -> Result<usize> {
        let targets: Vec<(i64, String)> = {
            let conn = self.conn.lock().expect("db mutex poisoned");
            let mut stmt =
                conn.prepare("SELECT id, target_raw FROM links WHERE is_external = 0")?;
            stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?.collect::<std::result::Result<_, _>>()?
        };

        let mut updated = 0;
        for (link_id, target_raw) in targets {
            let resolved = self.resolve_target(&target_raw)?;
            let conn = self.conn.lock().expect("db mutex poisoned");
            let changed = conn.execute(
                "UPDATE links SET target_id = ?1 WHERE id = ?2 AND target_id IS NOT ?1",
                params![resolved, link_id],
            )?;
            updated += changed;
        }
        Ok(updated)
    }

    pub fn full_text_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, title, snippet(notes_fts, 2, '\u{27e6}', '\u{27e7}', '\u{2026}', 10), bm25(notes_fts)
             FROM notes_fts WHERE notes_fts MATCH ?1 ORDER BY bm25(notes_fts) LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![query, limit as i64], |r| {
            Ok(SearchHit {
                note_id: r.get(0)?,
                title: r.get(1)?,
                snippet: r.get(2)?,
                score: r.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// Structured metadata search: notes whose `key` metadata field compares
    /// to `value` via `op`.
    pub fn query_metadata_eq(&self, key: &str, value: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = conn.prepare("SELECT note_id FROM note_metadata WHERE key = ?1 AND value = ?2")?;
        let rows = stmt.query_map(params![key, value], |r| r.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>().map_err(CoreError::from)
    }

    /// List notes most-recently-updated first, optionally filtered by type.
    pub fn list_notes_recent(&self, note_type: Option<&str>, limit: usize) -> Result<Vec<NoteRow>> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        let mut stmt = match note_type {
            Some(_) => conn.prepare(
                "SELECT id, note_type, filename, title, created, updated, content_hash, content, path, size FROM notes WHERE note_type = ?1 ORDER BY updated DESC LIMIT ?2",
            )?,
            None => conn.prepare(
                "SELECT id, note_type, filename, title, created, updated, content_hash, content, path, size FROM notes ORDER BY updated DESC LIMIT ?1",
            )?,
        };
        let rows = if let Some(t) = note_type {
            stmt.query_map(params![t, limit as i64], row_to_tuple)?.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![limit as i64], row_to_tuple)?.collect::<std::result::Result<Vec<_>, _>>()?
        };
        rows.into_iter()
            .map(|tuple| {
                let metadata = self.load_metadata(&conn, tuple_id(&tuple))?;
                Ok(note_row_from_tuple(tuple, metadata))
            })
            .collect()
    }

    /// Structured query translated into a join over `notes` and
    /// `note_metadata`. Each metadata filter is applied as an `EXISTS`
    /// subquery so multiple filters on different keys compose with AND.
    pub fn advanced_search(&self, query: &AdvancedQuery) -> Result<Vec<NoteRow>> {
        let ids = {
            let conn = self.conn.lock().expect("db mutex poisoned");
            let mut clauses: Vec<String> = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(t) = &query.note_type {
                clauses.push("n.note_type = ?".to_string());
                params_vec.push(Box::new(t.clone()));
            }
            if let Some(tq) = &query.title_query {
                clauses.push("n.title LIKE ?".to_string());
                params_vec.push(Box::new(format!("%{}%", tq)));
            }
            if let Some(v) = &query.updated_after {
                clauses.push("n.updated >= ?".to_string());
                params_vec.push(Box::new(v.clone()));
            }
            if let Some(v) = &query.updated_before {
                clauses.push("n.updated <= ?".to_string());
                params_vec.push(Box::new(v.clone()));
            }
            if let Some(v) = &query.created_after {
                clauses.push("n.created >= ?".to_string());
                params_vec.push(Box::new(v.clone()));
            }
            if let Some(v) = &query.created_before {
                clauses.push("n.created <= ?".to_string());
                params_vec.push(Box::new(v.clone()));
            }
            if let Some(cc) = &query.content_contains {
                clauses.push("n.id IN (SELECT id FROM notes_fts WHERE notes_fts MATCH ?)".to_string());
                params_vec.push(Box::new(format!("\"{}\"", cc.replace('"', ""))));
            }
            for (i, f) in query.metadata_filters.iter().enumerate() {
                let alias = format!("m{}", i);
                match f.op.as_str() {
                    "IN" => {
                        let values: Vec<&str> = f.value.split(',').map(|s| s.trim()).collect();
                        let placeholders = values.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                        clauses.push(format!(
                            "EXISTS (SELECT 1 FROM note_metadata {a} WHERE {a}.note_id = n.id AND {a}.key = ? AND {a}.value IN ({ph}))",
                            a = alias,
                            ph = placeholders
                        ));
                        params_vec.push(Box::new(f.key.clone()));
                        for v in values {
                            params_vec.push(Box::new(v.to_string()));
                        }
                    }
                    ">" | "<" | ">=" | "<=" => {
                        clauses.push(format!(
                            "EXISTS (SELECT 1 FROM note_metadata {a} WHERE {a}.note_id = n.id AND {a}.key = ? AND CAST({a}.value AS REAL) {op} CAST(? AS REAL))",
                            a = alias,
                            op = f.op
                        ));
                        params_vec.push(Box::new(f.key.clone()));
                        params_vec.push(Box::new(f.value.clone()));
                    }
                    "=" | "!=" | "LIKE" => {
                        clauses.push(format!(
                            "EXISTS (SELECT 1 FROM note_metadata {a} WHERE {a}.note_id = n.id AND {a}.key = ? AND {a}.value {op} ?)",
                            a = alias,
                            op = f.op
                        ));
                        params_vec.push(Box::new(f.key.clone()));
                        let value = if f.op == "LIKE" { format!("%{}%", f.value) } else { f.value.clone() };
                        params_vec.push(Box::new(value));
                    }
                    other => return Err(CoreError::ValidationFailed(format!("unsupported metadata filter operator '{}'", other))),
                }
            }

            let where_sql = if clauses.is_empty() { String::new() } else { format!("WHERE {}", clauses.join(" AND ")) };
            let sort_sql = match query.sort.as_deref() {
                Some("updated_asc") => "ORDER BY n.updated ASC",
                Some("created_desc") => "ORDER BY n.created DESC",
                Some("created_asc") => "ORDER BY n.created ASC",
                Some("title_asc") => "ORDER BY n.title ASC",
                Some("title_desc") => "ORDER BY n.title DESC",
                _ => "ORDER BY n.updated DESC",
            };
            let sql = format!(
                "SELECT n.id FROM notes n {where_sql} {sort_sql} LIMIT {limit} OFFSET {offset}",
                where_sql = where_sql,
                sort_sql = sort_sql,
                limit = query.limit.unwrap_or(100),
                offset = query.offset.unwrap_or(0)
            );

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
            let ids: Vec<String> = stmt.query_map(param_refs.as_slice(), |r| r.get(0))?.collect::<std::result::Result<Vec<_>, _>>()?;
            ids
        };

        ids.into_iter().filter_map(|id| self.get_note(&id).transpose()).collect()
    }

    /// Execute caller-supplied read-only SQL via [`sql_guard`], with bound
    /// parameters and an optional cap on the number of rows returned.
    pub fn execute_ad_hoc(
        &self,
        sql: &str,
        params: &[rusqlite::types::Value],
        limit: Option<usize>,
        timeout: std::time::Duration,
    ) -> Result<sql_guard::AdHocResult> {
        let conn = self.conn.lock().expect("db mutex poisoned");
        sql_guard::run(&conn, sql, params, limit, timeout)
    }
}

/// Write one note's row, metadata, FTS entry, and links within an
/// already-open transaction. Shared by [`DatabaseStore::upsert_note`] (one
/// note at a time) and [`DatabaseStore::rebuild_all`] (the whole vault).
fn insert_note_tx(tx: &rusqlite::Transaction, note: &NoteRecord) -> Result<()> {
    tx.execute(
        "INSERT INTO notes (id, note_type, filename, title, created, updated, content_hash, content, path, size)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            note_type = excluded.note_type,
            filename = excluded.filename,
            title = excluded.title,
            updated = excluded.updated,
            content_hash = excluded.content_hash,
            content = excluded.content,
            path = excluded.path,
            size = excluded.size",
        params![
            note.id,
            note.note_type,
            note.filename,
            note.title,
            note.created,
            note.updated,
            note.content_hash,
            note.body,
            note.path,
            note.size,
        ],
    )?;

    tx.execute("DELETE FROM note_metadata WHERE note_id = ?1", params![note.id])?;
    for (key, value) in &note.metadata {
        tx.execute(
            "INSERT INTO note_metadata (note_id, key, value, value_type) VALUES (?1, ?2, ?3, ?4)",
            params![note.id, key, value.to_storage_string(), value.type_name()],
        )?;
    }

    tx.execute("DELETE FROM notes_fts WHERE id = ?1", params![note.id])?;
    tx.execute("INSERT INTO notes_fts (id, title, body) VALUES (?1, ?2, ?3)", params![note.id, note.title, note.body])?;

    tx.execute("DELETE FROM links WHERE source_id = ?1", params![note.id])?;
    for link in &note.links {
        tx.execute(
            "INSERT INTO links (source_id, target_raw, target_id, is_external, alias, heading, block_id, embed, line, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                note.id,
                link.target_raw,
                link.target_id,
                link.is_external,
                link.alias,
                link.heading,
                link.block_id,
                link.embed,
                link.line,
                link.kind,
            ],
        )?;
    }
    Ok(())
}

type NoteTuple = (String, String, String, String, String, String, String, String, String, i64);

fn tuple_id(t: &NoteTuple) -> &str {
    &t.0
}

fn note_row_from_tuple(t: NoteTuple, metadata: BTreeMap<String, Value>) -> NoteRow {
    let (id, note_type, filename, title, created, updated, content_hash, content, path, size) = t;
    NoteRow { id, note_type, filename, title, created, updated, content_hash, content, path, size, metadata }
}

fn row_to_tuple(r: &rusqlite::Row) -> rusqlite::Result<NoteTuple> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        r.get(2)?,
        r.get(3)?,
        r.get(4)?,
        r.get(5)?,
        r.get(6)?,
        r.get(7)?,
        r.get(8)?,
        r.get(9)?,
    ))
}

fn link_row_from_row(r: &rusqlite::Row) -> rusqlite::Result<LinkRow> {
    Ok(LinkRow {
        source_id: r.get(0)?,
        target_raw: r.get(1)?,
        target_id: r.get(2)?,
        is_external: r.get(3)?,
        alias: r.get(4)?,
        heading: r.get(5)?,
        block_id: r.get(6)?,
        embed: r.get(7)?,
        line: r.get(8)?,
        kind: r.get(9)?,
    })
}

fn value_from_storage(value_type: &str, raw: &str) -> Value {
    match value_type {
        "number" => raw.parse().map(Value::Number).unwrap_or(Value::String(raw.to_string())),
        "boolean" => raw.parse().map(Value::Boolean).unwrap_or(Value::String(raw.to_string())),
        "date" => Value::Date(raw.to_string()),
        "array" => serde_json::from_str(raw).unwrap_or_else(|_| Value::Array(Vec::new())),
        _ => Value::String(raw.to_string()),
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            note_type TEXT NOT NULL,
            filename TEXT NOT NULL,
            title TEXT NOT NULL,
            created TEXT NOT NULL,
            updated TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            path TEXT NOT NULL DEFAULT '',
            size INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_notes_type ON notes(note_type);
        CREATE INDEX IF NOT EXISTS idx_notes_title ON notes(title);

        CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
            id UNINDEXED,
            title,
            body,
            tokenize = 'porter unicode61'
        );

        CREATE TABLE IF NOT EXISTS note_metadata (
            note_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            value_type TEXT NOT NULL,
            PRIMARY KEY (note_id, key)
        );
        CREATE INDEX IF NOT EXISTS idx_metadata_key_value ON note_metadata(key, value);

        CREATE TABLE IF NOT EXISTS links (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            target_raw TEXT NOT NULL,
            target_id TEXT,
            is_external INTEGER NOT NULL DEFAULT 0,
            alias TEXT,
            heading TEXT,
            block_id TEXT,
            embed INTEGER NOT NULL DEFAULT 0,
            line INTEGER NOT NULL,
            kind TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_links_source ON links(source_id);
        CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, title: &str, body: &str) -> NoteRecord {
        NoteRecord {
            id: id.to_string(),
            note_type: id.split('/').next().unwrap().to_string(),
            filename: id.split('/').nth(1).unwrap().to_string(),
            title: title.to_string(),
            created: "2024-01-01".to_string(),
            updated: "2024-01-01".to_string(),
            content_hash: "sha256:abc".to_string(),
            path: format!("{}.md", id),
            size: body.len() as i64,
            body: body.to_string(),
            metadata: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    #[test]
    fn upsert_and_get_round_trips() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/book.md", "A Book", "Some body")).unwrap();
        let row = db.get_note("reading/book.md").unwrap().unwrap();
        assert_eq!(row.title, "A Book");
    }

    #[test]
    fn upsert_is_idempotent() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/book.md", "Title A", "body")).unwrap();
        db.upsert_note(&note("reading/book.md", "Title B", "body")).unwrap();
        let rows = db.list_notes(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Title B");
    }

    #[test]
    fn full_text_search_finds_body_match() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/book.md", "A Book", "the quick brown fox")).unwrap();
        let hits = db.full_text_search("quick", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, "reading/book.md");
    }

    #[test]
    fn delete_note_removes_from_all_tables() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/book.md", "A Book", "body")).unwrap();
        db.delete_note("reading/book.md").unwrap();
        assert!(db.get_note("reading/book.md").unwrap().is_none());
        assert!(db.full_text_search("body", 10).unwrap().is_empty());
    }

    #[test]
    fn resolve_target_exact_id() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/book.md", "A Book", "body")).unwrap();
        assert_eq!(db.resolve_target("reading/book.md").unwrap(), Some("reading/book.md".to_string()));
    }

    #[test]
    fn resolve_target_by_title() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/book.md", "My Book", "body")).unwrap();
        assert_eq!(db.resolve_target("My Book").unwrap(), Some("reading/book.md".to_string()));
    }

    #[test]
    fn resolve_target_ambiguous_title_fails() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/a.md", "Same", "body")).unwrap();
        db.upsert_note(&note("reading/b.md", "Same", "body")).unwrap();
        assert_eq!(db.resolve_target("Same").unwrap(), None);
    }

    #[test]
    fn rename_note_id_updates_links() {
        let db = DatabaseStore::open_in_memory().unwrap();
        db.upsert_note(&note("reading/old.md", "Old", "body")).unwrap();
        let mut source = note("reading/src.md", "Src", "body");
        source.links.push(LinkRow {
            source_id: "reading/src.md".to_string(),
            target_raw: "Old".to_string(),
            target_id: Some("reading/old.md".to_string()),
            is_external: false,
            alias: None,
            heading: None,
            block_id: None,
            embed: false,
            line: 1,
            kind: None,
        });
        db.upsert_note(&source).unwrap();

        let updated = db.rename_note_id("reading/old.md", "reading/new.md", "new.md").unwrap();
        assert_eq!(updated, 1);
        let backlinks = db.backlinks("reading/new.md").unwrap();
        assert_eq!(backlinks.len(), 1);
    }

    #[test]
    fn broken_links_reports_unresolved() {
        let db = DatabaseStore::open_in_memory().unwrap();
        let mut source = note("reading/src.md", "Src", "body");
        source.links.push(LinkRow {
            source_id: "reading/src.md".to_string(),
            target_raw: "Nowhere".to_string(),
            target_id: None,
            is_external: false,
            alias: None,
            heading: None,
            block_id: None,
            embed: false,
            line: 1,
            kind: None,
        });
        db.upsert_note(&source).unwrap();
        assert_eq!(db.broken_links().unwrap().len(), 1);
    }
}
