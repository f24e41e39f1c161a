//! Resolution and querying of the link graph, which lives entirely as rows
//! in [`crate::db::DatabaseStore`]'s `links` table.

use crate::db::{DatabaseStore, LinkRow};
use crate::error::Result;
use crate::link::extractor::{ExternalLink, ExternalLinkKind, RawLink};
use regex::Regex;
use std::sync::LazyLock;

static WIKILINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[\[([^\]\|#]+)(?:#\^([a-zA-Z0-9_-]+))?(?:#([^\]\|]+))?(?:\|([^\]]+))?\]\]").unwrap()
});

/// Thin read/resolve layer over the index's link table for one vault.
pub struct LinkGraph<'a> {
    db: &'a DatabaseStore,
}

impl<'a> LinkGraph<'a> {
    pub fn new(db: &'a DatabaseStore) -> Self {
        Self { db }
    }

    pub fn resolve(&self, target: &str) -> Result<Option<String>> {
        self.db.resolve_target(target)
    }

    /// Resolve every extracted link and turn it into storage-ready rows for
    /// [`crate::db::DatabaseStore::upsert_note`].
    pub fn build_rows(&self, wikilinks: &[RawLink], externals: &[ExternalLink]) -> Result<Vec<LinkRow>> {
        let mut rows = Vec::with_capacity(wikilinks.len() + externals.len());
        for link in wikilinks {
            let target_id = self.resolve(&link.target)?;
            rows.push(LinkRow {
                source_id: String::new(),
                target_raw: link.target.clone(),
                target_id,
                is_external: false,
                alias: link.alias.clone(),
                heading: link.heading.clone(),
                block_id: link.block_id.clone(),
                embed: link.embed,
                line: link.line as i64,
                kind: None,
            });
        }
        for ext in externals {
            let kind = match ext.kind {
                ExternalLinkKind::Url => "url",
                ExternalLinkKind::Image => "image",
            };
            rows.push(LinkRow {
                source_id: String::new(),
                target_raw: ext.url.clone(),
                target_id: None,
                is_external: true,
                alias: ext.text.clone(),
                heading: None,
                block_id: None,
                embed: false,
                line: ext.line as i64,
                kind: Some(kind.to_string()),
            });
        }
        Ok(rows)
    }

    pub fn backlinks(&self, note_id: &str) -> Result<Vec<LinkRow>> {
        self.db.backlinks(note_id)
    }

    pub fn outgoing(&self, note_id: &str) -> Result<Vec<LinkRow>> {
        self.db.outgoing_links(note_id)
    }

    pub fn broken(&self) -> Result<Vec<LinkRow>> {
        self.db.broken_links()
    }

    /// Re-run resolution for every internal link in the index. Call after a
    /// rename/move/delete so links pointing at the changed note (or at a
    /// target that just appeared) recover.
    pub fn reresolve_all(&self) -> Result<usize> {
        self.db.reresolve_links()
    }
}

/// Rewrite every wikilink whose target matches `old_target` (by filename
/// stem, case-insensitive) to point at `new_target`, leaving any explicit
/// alias, heading, or block reference untouched. Returns the rewritten
/// content and the number of links rewritten.
pub fn rewrite_wikilink_target(content: &str, old_target: &str, new_target: &str) -> (String, usize) {
    let old_stem = old_target.trim_end_matches(".md");
    let mut result = String::with_capacity(content.len());
    let mut last_end = 0;
    let mut count = 0;

    for cap in WIKILINK.captures_iter(content) {
        let whole = cap.get(0).unwrap();
        let target = cap.get(2).unwrap().as_str().trim();
        let target_stem = target.trim_end_matches(".md");
        if !target_stem.eq_ignore_ascii_case(old_stem) {
            continue;
        }

        result.push_str(&content[last_end..whole.start()]);
        let embed = cap.get(1).map_or("", |m| m.as_str());
        let block = cap.get(3).map(|m| format!("#^{}", m.as_str())).unwrap_or_default();
        let heading = cap.get(4).map(|m| format!("#{}", m.as_str())).unwrap_or_default();
        let alias = cap.get(5).map(|m| format!("|{}", m.as_str())).unwrap_or_default();
        result.push_str(&format!("{}[[{}{}{}{}]]", embed, new_target, block, heading, alias));

        last_end = whole.end();
        count += 1;
    }
    result.push_str(&content[last_end..]);
    (result, count)
}
