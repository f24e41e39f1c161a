//! notecore - a local, multi-vault markdown note store with a hybrid
//! filesystem + embedded-SQL index.
//!
//! # Overview
//!
//! notecore provides the engine behind a note-taking tool built around
//! typed note types, YAML frontmatter, and a wikilink graph:
//! - Multi-vault registry and path safety ([`registry`])
//! - Per-vault configuration and directory layout ([`workspace`])
//! - Typed note types with schema-validated metadata ([`note_type`])
//! - Frontmatter parsing/serialization ([`frontmatter`]) and content hashing
//!   ([`hash`]) for optimistic-concurrency writes
//! - Wikilink extraction and a SQL-backed link graph ([`link`])
//! - An embedded SQLite index with full-text search ([`db`], [`search`])
//! - Note CRUD with automatic link propagation ([`note`])
//! - Per-vault concurrency control ([`vault_context`])

pub mod db;
pub mod error;
pub mod fsutil;
pub mod frontmatter;
pub mod hash;
pub mod link;
pub mod note;
pub mod note_type;
pub mod registry;
pub mod schema;
pub mod search;
pub mod vault_context;
pub mod workspace;

pub use error::{CoreError, Result};
pub use note::{Note, NoteManager};
pub use note_type::{NoteType, NoteTypeManager};
pub use registry::{GlobalRegistry, PathGuard, VaultEntry};
pub use vault_context::VaultContext;
pub use workspace::{VaultConfig, Workspace};
