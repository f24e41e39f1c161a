//! Wikilink, embed, and external-link extraction from a note's body and
//! frontmatter.

use crate::link::code_block::{find_code_block_ranges, is_in_code_block};
use regex::Regex;
use std::sync::LazyLock;

static WIKILINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(!?)\[\[([^\]\|#]+)(?:#\^([a-zA-Z0-9_-]+))?(?:#([^\]\|]+))?(?:\|([^\]]+))?\]\]").unwrap()
});

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([A-Za-z][A-Za-z0-9+.\-]*://[^\s)]+)\)").unwrap());

static BARE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s<>\[\]()]+").unwrap());

/// Whether an external link is a plain reference or an embedded image
/// (`![alt](url)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalLinkKind {
    Url,
    Image,
}

/// Where a wikilink appears within a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkContext {
    Body,
    FrontmatterScalar { key: String },
    FrontmatterList { key: String, index: usize },
    Inline { key: String },
    Task,
}

/// A parsed `[[...]]` wikilink or `![[...]]` embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLink {
    pub target: String,
    pub alias: Option<String>,
    pub heading: Option<String>,
    pub block_id: Option<String>,
    pub embed: bool,
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub context: LinkContext,
}

/// A parsed external link, of any URI scheme (`https://`, `file://`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalLink {
    pub url: String,
    pub text: Option<String>,
    pub line: usize,
    pub kind: ExternalLinkKind,
}

/// Extract wikilinks/embeds from the note body, deciding each one's
/// [`LinkContext`] from the surrounding line.
pub fn extract_wikilinks(body: &str) -> Vec<RawLink> {
    let code_ranges = find_code_block_ranges(body);
    let mut links = Vec::new();

    for cap in WIKILINK.captures_iter(body) {
        let whole = cap.get(0).unwrap();
        if is_in_code_block(whole.start(), &code_ranges) {
            continue;
        }

        let is_embed = cap.get(1).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        let target = cap.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
        let block_id = cap.get(3).map(|m| m.as_str().to_string());
        let heading = cap.get(4).map(|m| m.as_str().to_string());
        let alias = cap.get(5).map(|m| m.as_str().to_string());

        let line = body[..whole.start()].matches('\n').count() + 1;
        let line_start = body[..whole.start()].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let start_col = whole.start() - line_start;
        let end_col = whole.end() - line_start;

        let context = determine_context(body, line, start_col);

        links.push(RawLink { target, alias, heading, block_id, embed: is_embed, line, start_col, end_col, context });
    }

    links
}

/// Extract `[text](uri)` links of any scheme, `![alt](uri)` image embeds, and
/// bare `http(s)://` URLs from the body, skipping anything inside a wikilink
/// or code span. Links are deduplicated by URL, keeping the first occurrence.
pub fn extract_external_links(body: &str) -> Vec<ExternalLink> {
    let code_ranges = find_code_block_ranges(body);
    let mut seen_spans = Vec::new();
    let mut seen_urls = std::collections::HashSet::new();
    let mut links = Vec::new();

    for cap in MARKDOWN_LINK.captures_iter(body) {
        let whole = cap.get(0).unwrap();
        if is_in_code_block(whole.start(), &code_ranges) {
            continue;
        }
        let is_image = !cap.get(1).unwrap().as_str().is_empty();
        let text = cap.get(2).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty());
        let url = cap.get(3).unwrap().as_str().to_string();
        let line = body[..whole.start()].matches('\n').count() + 1;
        seen_spans.push((whole.start(), whole.end()));
        if !seen_urls.insert(url.clone()) {
            continue;
        }
        let kind = if is_image { ExternalLinkKind::Image } else { ExternalLinkKind::Url };
        links.push(ExternalLink { url, text, line, kind });
    }

    for m in BARE_URL.find_iter(body) {
        if is_in_code_block(m.start(), &code_ranges) {
            continue;
        }
        if seen_spans.iter().any(|(s, e)| m.start() >= *s && m.end() <= *e) {
            continue;
        }
        if !seen_urls.insert(m.as_str().to_string()) {
            continue;
        }
        let line = body[..m.start()].matches('\n').count() + 1;
        links.push(ExternalLink { url: m.as_str().to_string(), text: None, line, kind: ExternalLinkKind::Url });
    }

    links
}

fn determine_context(body: &str, line: usize, start_col: usize) -> LinkContext {
    let Some(line_content) = body.lines().nth(line - 1) else { return LinkContext::Body };

    let trimmed = line_content.trim_start();
    if trimmed.starts_with("- [ ]")
        || trimmed.starts_with("- [x]")
        || trimmed.starts_with("- [X]")
        || trimmed.starts_with("- [>]")
        || trimmed.starts_with("- [-]")
        || trimmed.starts_with("- [/]")
    {
        return LinkContext::Task;
    }

    if let Some(bracket_start) = line_content[..start_col.min(line_content.len())].rfind('[') {
        let between = &line_content[bracket_start..start_col.min(line_content.len())];
        if let Some(key_end) = between.find("::")
            && !between[key_end..].contains(']') {
                return LinkContext::Inline { key: between[1..key_end].to_string() };
            }
    }

    LinkContext::Body
}

/// Recursively extract wikilinks from a parsed frontmatter YAML value,
/// attributing each to the dotted key path it was found under.
pub fn extract_frontmatter_wikilinks(value: &serde_yaml::Value) -> Vec<RawLink> {
    let mut links = Vec::new();
    walk_frontmatter(value, String::new(), &mut links);
    links
}

fn walk_frontmatter(value: &serde_yaml::Value, key_path: String, out: &mut Vec<RawLink>) {
    match value {
        serde_yaml::Value::String(s) => {
            for mut link in extract_wikilinks(s) {
                link.line = 0;
                link.context = if key_path.is_empty() {
                    LinkContext::Body
                } else {
                    LinkContext::FrontmatterScalar { key: key_path.clone() }
                };
                out.push(link);
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for (i, item) in seq.iter().enumerate() {
                if let serde_yaml::Value::String(s) = item {
                    for mut link in extract_wikilinks(s) {
                        link.line = 0;
                        link.context = LinkContext::FrontmatterList { key: key_path.clone(), index: i };
                        out.push(link);
                    }
                } else {
                    walk_frontmatter(item, format!("{}[{}]", key_path, i), out);
                }
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (k, v) in map {
                if let Some(key) = k.as_str() {
                    let new_path = if key_path.is_empty() { key.to_string() } else { format!("{}.{}", key_path, key) };
                    walk_frontmatter(v, new_path, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_wikilink() {
        let links = extract_wikilinks("See [[Other Note]] for details.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].target, "Other Note");
        assert!(links[0].alias.is_none());
    }

    #[test]
    fn extracts_aliased_wikilink() {
        let links = extract_wikilinks("[[Target|Display Text]]");
        assert_eq!(links[0].target, "Target");
        assert_eq!(links[0].alias.as_deref(), Some("Display Text"));
    }

    #[test]
    fn extracts_heading_and_block_ref() {
        let heading = extract_wikilinks("[[Note#Section]]");
        assert_eq!(heading[0].heading.as_deref(), Some("Section"));

        let block = extract_wikilinks("[[Note#^abc123]]");
        assert_eq!(block[0].block_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn detects_embed() {
        let links = extract_wikilinks("![[diagram.png]]");
        assert!(links[0].embed);
    }

    #[test]
    fn skips_wikilink_in_code_block() {
        let body = "```\n[[not a link]]\n```";
        assert!(extract_wikilinks(body).is_empty());
    }

    #[test]
    fn detects_task_context() {
        let links = extract_wikilinks("- [ ] Read [[Book]]\n");
        assert_eq!(links[0].context, LinkContext::Task);
    }

    #[test]
    fn extracts_external_markdown_link() {
        let links = extract_external_links("See [the site](https://example.com/page).");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com/page");
        assert_eq!(links[0].text.as_deref(), Some("the site"));
    }

    #[test]
    fn extracts_bare_url_once() {
        let links = extract_external_links("Visit https://example.com for more.");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://example.com");
    }

    #[test]
    fn markdown_link_not_double_counted_as_bare_url() {
        let links = extract_external_links("[site](https://example.com)");
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn extracts_image_embed_as_image_kind() {
        let links = extract_external_links("![alt text](https://example.com/pic.png)");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, ExternalLinkKind::Image);
        assert_eq!(links[0].text.as_deref(), Some("alt text"));
    }

    #[test]
    fn extracts_file_scheme_link() {
        let links = extract_external_links("[local copy](file:///home/user/notes/doc.pdf)");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "file:///home/user/notes/doc.pdf");
        assert_eq!(links[0].kind, ExternalLinkKind::Url);
    }

    #[test]
    fn dedupes_external_links_by_url() {
        let links = extract_external_links("[a](https://example.com) and [b](https://example.com)");
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].text.as_deref(), Some("a"));
    }

    #[test]
    fn frontmatter_list_links_extracted() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("related:\n  - \"[[Note A]]\"\n  - \"[[Note B]]\"\n").unwrap();
        let links = extract_frontmatter_wikilinks(&yaml);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|l| matches!(l.context, LinkContext::FrontmatterList { .. })));
    }
}
