//! YAML frontmatter parsing and serialization.
//!
//! Frontmatter is delimited by `---` lines at the very start of the file.
//! Parsing never normalizes line endings: callers that need canonical bytes
//! for hashing should hash [`Note::content`](crate::note::Note) directly,
//! not a round-tripped frontmatter value.

use crate::error::{CoreError, Result};
use crate::schema::{FieldType, MetadataSchema, Value};
use serde_yaml::Value as YamlValue;
use std::collections::BTreeMap;

/// The result of splitting a note's full content into frontmatter and body.
#[derive(Debug, Clone)]
pub struct FrontmatterSplit<'a> {
    /// The raw YAML string between the `---` delimiters, if present.
    pub yaml: Option<&'a str>,
    /// The content after the closing delimiter (or the whole input).
    pub body: &'a str,
    /// 1-indexed line number where `body` starts.
    pub body_start_line: usize,
}

/// Split content into frontmatter and body without parsing the YAML.
pub fn split_frontmatter(content: &str) -> FrontmatterSplit<'_> {
    if !content.starts_with("---") {
        return FrontmatterSplit { yaml: None, body: content, body_start_line: 1 };
    }

    let after_first = &content[3..];
    let yaml_start = if after_first.starts_with('\n') {
        4
    } else if after_first.starts_with("\r\n") {
        5
    } else {
        return FrontmatterSplit { yaml: None, body: content, body_start_line: 1 };
    };

    let remaining = &content[yaml_start..];
    let closing_pos = remaining
        .find("\n---\n")
        .or_else(|| remaining.find("\n---\r\n"))
        .or_else(|| remaining.ends_with("\n---").then(|| remaining.len() - 4));

    match closing_pos {
        Some(pos) => {
            let yaml_end = yaml_start + pos;
            let yaml = &content[yaml_start..yaml_end];

            let after_delim = yaml_end + 4; // skip "\n---"
            let body = if after_delim < content.len() {
                let rest = &content[after_delim..];
                if let Some(stripped) = rest.strip_prefix("\r\n") {
                    stripped
                } else if let Some(stripped) = rest.strip_prefix('\n') {
                    stripped
                } else {
                    rest
                }
            } else {
                ""
            };

            let frontmatter_lines = content[..yaml_end + 4].matches('\n').count();
            FrontmatterSplit { yaml: Some(yaml), body, body_start_line: frontmatter_lines + 2 }
        }
        None => FrontmatterSplit { yaml: None, body: content, body_start_line: 1 },
    }
}

/// Parse the frontmatter YAML of `content`, if any.
pub fn parse_frontmatter(content: &str) -> Result<Option<YamlValue>> {
    match split_frontmatter(content).yaml {
        Some(yaml) if !yaml.trim().is_empty() => Ok(Some(serde_yaml::from_str(yaml)?)),
        Some(_) => Ok(Some(YamlValue::Mapping(Default::default()))),
        None => Ok(None),
    }
}

/// Serialize a YAML mapping back into a delimited frontmatter block.
pub fn serialize_frontmatter(value: &YamlValue) -> Result<String> {
    let yaml = serde_yaml::to_string(value)?;
    Ok(format!("---\n{}---\n", yaml))
}

/// Replace a note's frontmatter, keeping the existing body untouched.
pub fn with_frontmatter(content: &str, new_frontmatter: &YamlValue) -> Result<String> {
    let split = split_frontmatter(content);
    let fm_str = serialize_frontmatter(new_frontmatter)?;
    Ok(format!("{}{}", fm_str, split.body))
}

/// Canonical key order: required keys first (in this fixed order), then the
/// schema's declared fields in schema order, then any remaining keys
/// alphabetically. This is what [`crate::note::NoteManager`] uses to rewrite
/// frontmatter on every update so round-tripping is stable.
pub fn canonical_key_order(schema: Option<&MetadataSchema>) -> Vec<String> {
    let mut order = vec!["title", "type", "created", "updated"]
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    if let Some(schema) = schema {
        for field in &schema.fields {
            if !order.contains(&field.name) {
                order.push(field.name.clone());
            }
        }
    }
    order
}

/// Build a YAML mapping from required fields + a metadata map, in canonical
/// key order (required keys, then schema fields, then remaining keys
/// alphabetically).
pub fn build_frontmatter(
    title: &str,
    note_type: &str,
    created: &str,
    updated: &str,
    metadata: &BTreeMap<String, Value>,
    schema: Option<&MetadataSchema>,
) -> YamlValue {
    let mut mapping = serde_yaml::Mapping::new();
    mapping.insert(key("title"), YamlValue::String(title.to_string()));
    mapping.insert(key("type"), YamlValue::String(note_type.to_string()));
    mapping.insert(key("created"), YamlValue::String(created.to_string()));
    mapping.insert(key("updated"), YamlValue::String(updated.to_string()));

    let order = canonical_key_order(schema);
    let mut remaining: Vec<&String> = metadata
        .keys()
        .filter(|k| !order.contains(k))
        .collect();
    remaining.sort();

    for k in order.iter().filter(|k| !["title", "type", "created", "updated"].contains(&k.as_str())) {
        if let Some(v) = metadata.get(k) {
            mapping.insert(key(k), v.to_yaml());
        }
    }
    for k in remaining {
        mapping.insert(key(k), metadata[k].to_yaml());
    }

    YamlValue::Mapping(mapping)
}

fn key(s: &str) -> YamlValue {
    YamlValue::String(s.to_string())
}

/// Extract the typed metadata map from a parsed frontmatter value, dropping
/// the four protected keys (the core owns those separately on [`Note`]).
pub fn extract_metadata(
    frontmatter: &YamlValue,
    schema: Option<&MetadataSchema>,
) -> BTreeMap<String, Value> {
    let mut result = BTreeMap::new();
    if let YamlValue::Mapping(map) = frontmatter {
        for (k, v) in map {
            let Some(key) = k.as_str() else { continue };
            if crate::schema::PROTECTED_FIELDS.contains(&key) {
                continue;
            }
            let field_type = schema.and_then(|s| s.field(key)).map(|f| f.field_type);
            if let Some(value) = Value::from_yaml(v, field_type) {
                result.insert(key.to_string(), value);
            } else if (field_type == Some(FieldType::Array) || matches!(v, YamlValue::Sequence(_)))
                && let YamlValue::Sequence(seq) = v {
                    result.insert(
                        key.to_string(),
                        Value::Array(seq.iter().filter_map(|i| Value::from_yaml(i, None)).collect()),
                    );
                }
        }
    }
    result
}

/// Require the four protected frontmatter keys and reject a caller attempt
/// to set them directly (the core is the only writer of `created`/`updated`
/// and `title`/`filename` are set through dedicated operations).
pub fn reject_protected_keys(metadata: &BTreeMap<String, Value>) -> Result<()> {
    for field in crate::schema::PROTECTED_FIELDS {
        if metadata.contains_key(*field) {
            return Err(CoreError::ProtectedField(field.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_no_frontmatter() {
        let split = split_frontmatter("just content");
        assert!(split.yaml.is_none());
        assert_eq!(split.body, "just content");
    }

    #[test]
    fn split_with_frontmatter() {
        let content = "---\ntitle: Test\n---\n\nBody here";
        let split = split_frontmatter(content);
        assert_eq!(split.yaml, Some("title: Test"));
        assert_eq!(split.body, "\nBody here");
    }

    #[test]
    fn split_at_eof() {
        let content = "---\ntitle: Test\n---";
        let split = split_frontmatter(content);
        assert_eq!(split.yaml, Some("title: Test"));
        assert_eq!(split.body, "");
    }

    #[test]
    fn round_trip_identity() {
        let content = "---\ntitle: Test\ntype: reading\ncreated: '2024-01-01'\nupdated: '2024-01-01'\n---\n\nBody";
        let fm = parse_frontmatter(content).unwrap().unwrap();
        let rewritten = with_frontmatter(content, &fm).unwrap();
        let fm2 = parse_frontmatter(&rewritten).unwrap().unwrap();
        assert_eq!(fm, fm2);
    }

    #[test]
    fn canonical_order_required_first() {
        let order = canonical_key_order(None);
        assert_eq!(order, vec!["title", "type", "created", "updated"]);
    }

    #[test]
    fn reject_protected_keys_fails_on_title() {
        let mut m = BTreeMap::new();
        m.insert("title".to_string(), Value::String("x".to_string()));
        assert!(reject_protected_keys(&m).is_err());
    }

    #[test]
    fn build_frontmatter_orders_schema_fields_first() {
        use crate::schema::{FieldConstraints, FieldDef};
        let schema = MetadataSchema {
            fields: vec![FieldDef {
                name: "rating".to_string(),
                field_type: FieldType::Number,
                required: false,
                default: None,
                constraints: FieldConstraints::default(),
            }],
            closed: false,
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("rating".to_string(), Value::Number(5.0));
        metadata.insert("aaa_extra".to_string(), Value::String("x".to_string()));
        let fm = build_frontmatter("T", "reading", "c", "u", &metadata, Some(&schema));
        let YamlValue::Mapping(map) = &fm else { panic!() };
        let keys: Vec<String> =
            map.keys().filter_map(|k| k.as_str().map(String::from)).collect();
        assert_eq!(keys, vec!["title", "type", "created", "updated", "rating", "aaa_extra"]);
    }
}
