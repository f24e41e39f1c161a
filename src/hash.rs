//! Content hashing for optimistic concurrency.
//!
//! A note's hash is SHA-256 over the exact bytes stored on disk (frontmatter
//! + body, including whatever newline convention the file already uses).
//!
//! A note type's hash is SHA-256 over a deterministic JSON encoding of its
//! description document, so edits to the schema or prose both invalidate a
//! caller's stale `content_hash`.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash note file bytes as stored on disk.
pub fn hash_note_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Canonical, order-stable representation of a note type used to compute its
/// content hash. Missing values normalize to empty string / empty object so
/// the hash is stable across `Option` shapes.
#[derive(Serialize)]
struct NoteTypeCanonical<'a> {
    description: &'a str,
    agent_instructions: &'a str,
    metadata_schema: &'a crate::schema::MetadataSchema,
}

pub fn hash_note_type(
    description: &str,
    agent_instructions: Option<&str>,
    schema: &crate::schema::MetadataSchema,
) -> String {
    let canonical = NoteTypeCanonical {
        description,
        agent_instructions: agent_instructions.unwrap_or(""),
        metadata_schema: schema,
    };
    // serde_json's map/struct field order is declaration order, which is
    // fixed here, so this serialization is deterministic.
    let json = serde_json::to_vec(&canonical).expect("canonical note type always serializes");
    let mut hasher = Sha256::new();
    hasher.update(&json);
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MetadataSchema;

    #[test]
    fn same_bytes_same_hash() {
        let a = hash_note_content(b"hello");
        let b = hash_note_content(b"hello");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn different_bytes_different_hash() {
        let a = hash_note_content(b"hello");
        let b = hash_note_content(b"hellp");
        assert_ne!(a, b);
    }

    #[test]
    fn note_type_hash_stable_across_missing_values() {
        let schema = MetadataSchema::default();
        let a = hash_note_type("desc", None, &schema);
        let b = hash_note_type("desc", None, &schema);
        assert_eq!(a, b);
    }

    #[test]
    fn note_type_hash_changes_with_description() {
        let schema = MetadataSchema::default();
        let a = hash_note_type("desc one", None, &schema);
        let b = hash_note_type("desc two", None, &schema);
        assert_ne!(a, b);
    }
}
