//! Cross-module integration tests: rename propagation, move, bulk delete.
//! Each test drives a full vault through `VaultContext` rather than a single
//! component, mirroring how `vaultctl` itself exercises the library.

use notecore::schema::{MetadataSchema, Value};
use notecore::VaultContext;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn open_vault() -> (TempDir, VaultContext) {
    let dir = TempDir::new().unwrap();
    let ctx = VaultContext::open("v1".to_string(), dir.path()).unwrap();
    ctx.note_types().create("note", "general note", None, MetadataSchema::default()).unwrap();
    (dir, ctx)
}

#[test]
fn rename_rewrites_wikilinks_in_every_backlinking_note() {
    let (_dir, ctx) = open_vault();
    let notes = ctx.notes();

    let target = notes.create_note("note", "Old Title", BTreeMap::new(), "the target note").unwrap();
    let a = notes.create_note("note", "Referrer A", BTreeMap::new(), "see [[Old Title]] for details").unwrap();
    let b = notes.create_note("note", "Referrer B", BTreeMap::new(), "also [[Old Title|aliased]] and plain text").unwrap();

    let report = notes.rename_note(&target.id, "New Title", &target.content_hash).unwrap();
    assert_eq!(report.note.id, target.id, "id must be stable across rename");
    assert_eq!(report.note.title, "New Title");
    assert_eq!(report.notes_updated, 2);
    assert_eq!(report.links_updated, 2);

    let reloaded_a = notes.get_note(&a.id).unwrap();
    assert!(reloaded_a.body.contains("[[New Title]]"));
    assert!(!reloaded_a.body.contains("Old Title"));

    let reloaded_b = notes.get_note(&b.id).unwrap();
    assert!(reloaded_b.body.contains("[[New Title|aliased]]"));
}

#[test]
fn move_changes_type_half_of_id_and_rewrites_id_links() {
    let (_dir, ctx) = open_vault();
    ctx.note_types().create("archive", "archived notes", None, MetadataSchema::default()).unwrap();
    let notes = ctx.notes();

    let target = notes.create_note("note", "Movable", BTreeMap::new(), "body").unwrap();
    let old_id = target.id.clone();
    let referrer = notes.create_note("note", "Referrer", BTreeMap::new(), &format!("links to [[{}]]", old_id)).unwrap();

    let report = notes.move_note(&old_id, "archive", &target.content_hash).unwrap();
    assert_eq!(report.old_id, old_id);
    assert!(report.note.id.starts_with("archive/"));
    assert_eq!(report.note.filename, target.filename, "filename must survive a move");
    assert_eq!(report.notes_with_updated_links, 1);
    assert_eq!(report.links_updated, 1);

    let reloaded = notes.get_note(&referrer.id).unwrap();
    assert!(reloaded.body.contains(&format!("[[{}]]", report.note.id)));
    assert!(notes.get_note(&old_id).is_err(), "old id must no longer resolve");
}

#[test]
fn bulk_delete_by_tag_and_pattern() {
    use notecore::note::BulkDeleteSelector;

    let (_dir, ctx) = open_vault();
    let notes = ctx.notes();

    let mut tagged = BTreeMap::new();
    tagged.insert("tags".to_string(), Value::Array(vec![Value::String("archive".to_string())]));

    notes.create_note("note", "Keepme", BTreeMap::new(), "keep").unwrap();
    notes.create_note("note", "Draft One", tagged.clone(), "old draft").unwrap();
    notes.create_note("note", "Draft Two", tagged, "another draft").unwrap();

    let tags = vec!["archive".to_string()];
    let selector = BulkDeleteSelector { note_type: Some("note"), tags: &tags, pattern: None };
    let report = notes.bulk_delete_notes(selector, true).unwrap();

    assert_eq!(report.deleted.len(), 2);
    assert!(report.failed.is_empty());
    assert!(notes.get_note("Keepme").is_ok());
    assert!(notes.get_note("Draft One").is_err());
    assert!(notes.get_note("Draft Two").is_err());
}

#[test]
fn bulk_delete_enforces_max_bulk_limit() {
    use notecore::note::BulkDeleteSelector;

    let (_dir, ctx) = open_vault();
    let notes = ctx.notes();
    for i in 0..(ctx.workspace().config.deletion.max_bulk + 1) {
        notes.create_note("note", &format!("Bulk {i}"), BTreeMap::new(), "body").unwrap();
    }

    let empty_tags: Vec<String> = Vec::new();
    let selector = BulkDeleteSelector { note_type: Some("note"), tags: &empty_tags, pattern: None };
    let err = notes.bulk_delete_notes(selector, true).unwrap_err();
    assert!(err.to_string().to_lowercase().contains("bulk") || err.to_string().to_lowercase().contains("limit"));
}

#[test]
fn reindex_rebuilds_the_index_from_disk() {
    let (_dir, ctx) = open_vault();
    let notes = ctx.notes();
    notes.create_note("note", "One", BTreeMap::new(), "alpha").unwrap();
    notes.create_note("note", "Two", BTreeMap::new(), "beta").unwrap();

    let count = ctx.search().rebuild_index(None).unwrap();
    assert_eq!(count, 2);

    let results = ctx.search().search_notes("alpha", None, None, false).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].note_id, "note/one.md");
}
