//! Metadata schema definitions and validation.
//!
//! A [`MetadataSchema`] describes the typed fields a note type's frontmatter
//! may carry. Validation is a pure function over the dynamic [`Value`]
//! variant produced by parsing YAML frontmatter (see [`crate::frontmatter`]).

use crate::error::{CoreError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Frontmatter keys every note manages itself; schemas may not define them.
pub const PROTECTED_FIELDS: &[&str] = &["title", "filename", "created", "updated"];

/// A dynamic metadata value, the result of parsing one frontmatter field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    Date(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Date(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Serialize to the text form stored in `note_metadata.value`.
    pub fn to_storage_string(&self) -> String {
        match self {
            Value::String(s) | Value::Date(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Array(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }

    pub fn from_yaml(yaml: &serde_yaml::Value, field_type: Option<FieldType>) -> Option<Value> {
        match yaml {
            serde_yaml::Value::String(s) => {
                if field_type == Some(FieldType::Date) {
                    Some(Value::Date(s.clone()))
                } else {
                    Some(Value::String(s.clone()))
                }
            }
            serde_yaml::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_yaml::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_yaml::Value::Sequence(seq) => Some(Value::Array(
                seq.iter()
                    .filter_map(|v| Value::from_yaml(v, None))
                    .collect(),
            )),
            _ => None,
        }
    }

    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Value::String(s) | Value::Date(s) => serde_yaml::Value::String(s.clone()),
            Value::Number(n) => serde_yaml::Value::Number((*n).into()),
            Value::Boolean(b) => serde_yaml::Value::Bool(*b),
            Value::Array(items) => {
                serde_yaml::Value::Sequence(items.iter().map(Value::to_yaml).collect())
            }
        }
    }
}

/// The declared type of a metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Array,
    Select,
}

/// Constraints attached to a field definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// One field definition within a [`MetadataSchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraints: FieldConstraints,
}

/// The ordered field list attached to a note type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataSchema {
    pub fields: Vec<FieldDef>,
    /// When true, keys absent from `fields` are rejected during validation.
    #[serde(default)]
    pub closed: bool,
}

impl MetadataSchema {
    /// Validate the schema definition itself: no duplicate names, no
    /// protected names, `select` fields carry options, `min <= max`,
    /// patterns compile, and defaults satisfy their own field's constraints.
    pub fn validate_definition(&self) -> Result<()> {
        let mut seen = BTreeMap::new();
        for field in &self.fields {
            if PROTECTED_FIELDS.contains(&field.name.as_str()) {
                return Err(CoreError::SchemaInvalid(format!(
                    "field '{}' is a protected name",
                    field.name
                )));
            }
            if seen.insert(field.name.clone(), ()).is_some() {
                return Err(CoreError::SchemaInvalid(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            if field.field_type == FieldType::Select && field.constraints.options.is_empty() {
                return Err(CoreError::SchemaInvalid(format!(
                    "field '{}' is type select but has no options",
                    field.name
                )));
            }
            if let (Some(min), Some(max)) = (field.constraints.min, field.constraints.max)
                && min > max {
                    return Err(CoreError::SchemaInvalid(format!(
                        "field '{}' has min > max",
                        field.name
                    )));
                }
            if let Some(pattern) = &field.constraints.pattern {
                Regex::new(pattern).map_err(|e| {
                    CoreError::SchemaInvalid(format!(
                        "field '{}' has invalid pattern: {}",
                        field.name, e
                    ))
                })?;
            }
            if let Some(default) = &field.default {
                validate_value_against_field(field, default).map_err(|e| {
                    CoreError::SchemaInvalid(format!(
                        "field '{}' default does not satisfy its own constraints: {}",
                        field.name, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a metadata map against this schema: required fields present,
    /// types satisfied, `select` options enforced, numeric bounds and string
    /// patterns checked. Unknown keys pass through unless `closed`. Missing
    /// optional fields with a `default` are filled in.
    pub fn validate_and_fill(
        &self,
        metadata: &mut BTreeMap<String, Value>,
    ) -> Result<()> {
        for field in &self.fields {
            match metadata.get(&field.name) {
                Some(value) => {
                    validate_value_against_field(field, value).map_err(|e| {
                        CoreError::ValidationFailed(format!("{}: {}", field.name, e))
                    })?;
                }
                None => {
                    if let Some(default) = &field.default {
                        metadata.insert(field.name.clone(), default.clone());
                    } else if field.required {
                        return Err(CoreError::ValidationFailed(format!(
                            "missing required field '{}'",
                            field.name
                        )));
                    }
                }
            }
        }

        if self.closed {
            let known: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
            for key in metadata.keys() {
                if !known.contains(&key.as_str()) {
                    return Err(CoreError::ValidationFailed(format!(
                        "unknown field '{}' not permitted by closed schema",
                        key
                    )));
                }
            }
        }

        Ok(())
    }
}

fn validate_value_against_field(field: &FieldDef, value: &Value) -> std::result::Result<(), String> {
    match field.field_type {
        FieldType::String | FieldType::Date => {
            let s = value
                .as_str()
                .ok_or_else(|| format!("expected {} value", field.field_type_name()))?;
            if let Some(pattern) = &field.constraints.pattern {
                let re = Regex::new(pattern).map_err(|e| e.to_string())?;
                if !re.is_match(s) {
                    return Err(format!("value '{}' does not match pattern '{}'", s, pattern));
                }
            }
            Ok(())
        }
        FieldType::Number => {
            let n = value.as_f64().ok_or("expected number value")?;
            if let Some(min) = field.constraints.min
                && n < min {
                    return Err(format!("value {} is below minimum {}", n, min));
                }
            if let Some(max) = field.constraints.max
                && n > max {
                    return Err(format!("value {} is above maximum {}", n, max));
                }
            Ok(())
        }
        FieldType::Boolean => match value {
            Value::Boolean(_) => Ok(()),
            _ => Err("expected boolean value".to_string()),
        },
        FieldType::Array => match value {
            Value::Array(_) => Ok(()),
            _ => Err("expected array value".to_string()),
        },
        FieldType::Select => {
            let s = value.as_str().ok_or("expected string value for select")?;
            if !field.constraints.options.iter().any(|o| o == s) {
                return Err(format!(
                    "value '{}' is not one of the allowed options {:?}",
                    s, field.constraints.options
                ));
            }
            Ok(())
        }
    }
}

impl FieldDef {
    fn field_type_name(&self) -> &'static str {
        match self.field_type {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Array => "array",
            FieldType::Select => "select",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_field(name: &str) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            field_type: FieldType::String,
            required: false,
            default: None,
            constraints: FieldConstraints::default(),
        }
    }

    #[test]
    fn rejects_protected_field_name() {
        let schema = MetadataSchema { fields: vec![string_field("title")], closed: false };
        assert!(matches!(
            schema.validate_definition(),
            Err(CoreError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn rejects_duplicate_field_names() {
        let schema = MetadataSchema {
            fields: vec![string_field("rating"), string_field("rating")],
            closed: false,
        };
        assert!(schema.validate_definition().is_err());
    }

    #[test]
    fn select_requires_options() {
        let field = FieldDef {
            name: "status".to_string(),
            field_type: FieldType::Select,
            required: false,
            default: None,
            constraints: FieldConstraints::default(),
        };
        let schema = MetadataSchema { fields: vec![field], closed: false };
        assert!(schema.validate_definition().is_err());
    }

    #[test]
    fn min_greater_than_max_is_invalid() {
        let field = FieldDef {
            name: "rating".to_string(),
            field_type: FieldType::Number,
            required: false,
            default: None,
            constraints: FieldConstraints { min: Some(10.0), max: Some(1.0), ..Default::default() },
        };
        let schema = MetadataSchema { fields: vec![field], closed: false };
        assert!(schema.validate_definition().is_err());
    }

    #[test]
    fn fills_default_when_missing() {
        let field = FieldDef {
            name: "rating".to_string(),
            field_type: FieldType::Number,
            required: false,
            default: Some(Value::Number(3.0)),
            constraints: FieldConstraints::default(),
        };
        let schema = MetadataSchema { fields: vec![field], closed: false };
        let mut metadata = BTreeMap::new();
        schema.validate_and_fill(&mut metadata).unwrap();
        assert_eq!(metadata.get("rating"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn required_field_missing_fails() {
        let field = FieldDef {
            name: "rating".to_string(),
            field_type: FieldType::Number,
            required: true,
            default: None,
            constraints: FieldConstraints::default(),
        };
        let schema = MetadataSchema { fields: vec![field], closed: false };
        let mut metadata = BTreeMap::new();
        assert!(schema.validate_and_fill(&mut metadata).is_err());
    }

    #[test]
    fn numeric_bounds_enforced() {
        let field = FieldDef {
            name: "rating".to_string(),
            field_type: FieldType::Number,
            required: false,
            default: None,
            constraints: FieldConstraints { min: Some(1.0), max: Some(5.0), ..Default::default() },
        };
        let schema = MetadataSchema { fields: vec![field], closed: false };
        let mut metadata = BTreeMap::new();
        metadata.insert("rating".to_string(), Value::Number(10.0));
        assert!(schema.validate_and_fill(&mut metadata).is_err());
    }

    #[test]
    fn select_enforces_options() {
        let field = FieldDef {
            name: "status".to_string(),
            field_type: FieldType::Select,
            required: false,
            default: None,
            constraints: FieldConstraints {
                options: vec!["todo".to_string(), "done".to_string()],
                ..Default::default()
            },
        };
        let schema = MetadataSchema { fields: vec![field], closed: false };
        let mut metadata = BTreeMap::new();
        metadata.insert("status".to_string(), Value::String("wip".to_string()));
        assert!(schema.validate_and_fill(&mut metadata).is_err());
    }

    #[test]
    fn unknown_keys_allowed_when_open() {
        let schema = MetadataSchema { fields: vec![], closed: false };
        let mut metadata = BTreeMap::new();
        metadata.insert("extra".to_string(), Value::String("x".to_string()));
        assert!(schema.validate_and_fill(&mut metadata).is_ok());
    }

    #[test]
    fn unknown_keys_rejected_when_closed() {
        let schema = MetadataSchema { fields: vec![], closed: true };
        let mut metadata = BTreeMap::new();
        metadata.insert("extra".to_string(), Value::String("x".to_string()));
        assert!(schema.validate_and_fill(&mut metadata).is_err());
    }
}
