//! Link extraction and the SQL-backed link graph.
//!
//! Link data is never held in memory as a graph structure; it lives as rows
//! in the index's `links` table (see [`crate::db`]). This module only
//! extracts raw links from note content ([`extractor`]) and resolves /
//! queries them against the index ([`graph`]).

pub mod code_block;
pub mod extractor;
pub mod graph;

pub use extractor::{extract_external_links, extract_frontmatter_wikilinks, extract_wikilinks, ExternalLink, LinkContext, RawLink};
pub use graph::{rewrite_wikilink_target, LinkGraph};
