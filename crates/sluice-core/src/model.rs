//! Declarative table models.
//!
//! A [`DataModel`] maps JSON locations to relational columns: each field
//! carries a dotted alias path (with optional `[idx]`/`[*]` segments), a
//! column type, and flags for primary-key membership, nullability, and
//! maximum string length. Models name their tables through
//! `snake_case(model_name)`; stage tables are prefixed `stage_`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, SecondsFormat};
use serde_json::Value;
use sluice_error::ConfigError;

/// Column type of a model field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    BigInt,
    Double,
    Text,
    Boolean,
    Timestamp,
    Date,
    Json,
}

/// One model field: column definition plus the alias path that feeds it.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Dotted JSON path rooted at `root`, e.g. `root.reviews[*].rating`.
    pub alias: String,
    pub primary_key: bool,
    pub nullable: bool,
    pub max_length: Option<usize>,
}

impl FieldDef {
    pub fn new(name: &str, field_type: FieldType, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            alias: alias.to_string(),
            primary_key: false,
            nullable: false,
            max_length: None,
        }
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

/// A single validation failure for one field of one candidate row.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    pub field: String,
    /// Failure tag, e.g. `missing`, `invalid_type`, `string_too_long`.
    pub kind: String,
    pub message: String,
}

/// Declarative table model: an ordered list of fields.
///
/// Field declaration order defines the column order of generated SQL;
/// `sorted_keys` defines the canonical order used for row hashing.
#[derive(Debug)]
pub struct DataModel {
    name: String,
    fields: Vec<FieldDef>,
    sorted_keys: Vec<String>,
}

impl DataModel {
    /// Build a model, validating names for use as SQL identifiers.
    pub fn new(name: &str, fields: Vec<FieldDef>) -> Result<Arc<Self>, ConfigError> {
        if fields.is_empty() {
            return Err(ConfigError::InvalidModel {
                model: name.to_string(),
                message: "model has no fields".to_string(),
            });
        }
        if !fields.iter().any(|f| f.primary_key) {
            return Err(ConfigError::InvalidModel {
                model: name.to_string(),
                message: "model declares no primary key".to_string(),
            });
        }
        for field in &fields {
            if !is_valid_identifier(&field.name) {
                return Err(ConfigError::InvalidModel {
                    model: name.to_string(),
                    message: format!("'{}' is not a valid column name", field.name),
                });
            }
            if !field.alias.starts_with("root") {
                return Err(ConfigError::InvalidModel {
                    model: name.to_string(),
                    message: format!("alias '{}' must be rooted at 'root'", field.alias),
                });
            }
        }
        if !is_valid_identifier(&camel_to_snake(name)) {
            return Err(ConfigError::InvalidModel {
                model: name.to_string(),
                message: "model name does not produce a valid table name".to_string(),
            });
        }
        let mut sorted_keys: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        sorted_keys.sort();
        Ok(Arc::new(Self {
            name: name.to_string(),
            fields,
            sorted_keys,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field names in sorted order, the canonical hashing order.
    pub fn sorted_keys(&self) -> &[String] {
        &self.sorted_keys
    }

    pub fn primary_keys(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn target_table_name(&self) -> String {
        camel_to_snake(&self.name)
    }

    pub fn stage_table_name(&self) -> String {
        format!("stage_{}", camel_to_snake(&self.name))
    }

    /// Validate and coerce one assembled record.
    ///
    /// Values arrive as raw JSON nodes looked up from the parse cache;
    /// `None` means the alias resolved to nothing. Returns the normalized
    /// row or the full list of per-field failures.
    pub fn validate_record(
        &self,
        data: &[(String, Option<Value>)],
    ) -> Result<BTreeMap<String, Value>, Vec<ValidationFailure>> {
        let mut row = BTreeMap::new();
        let mut failures = Vec::new();
        for (name, raw) in data {
            let field = match self.field(name) {
                Some(f) => f,
                None => continue,
            };
            match coerce(field, raw.as_ref()) {
                Ok(value) => {
                    row.insert(name.clone(), value);
                }
                Err((kind, message)) => failures.push(ValidationFailure {
                    field: name.clone(),
                    kind,
                    message,
                }),
            }
        }
        if failures.is_empty() {
            Ok(row)
        } else {
            Err(failures)
        }
    }
}

fn coerce(field: &FieldDef, raw: Option<&Value>) -> Result<Value, (String, String)> {
    let value = match raw {
        None | Some(Value::Null) => {
            if field.nullable {
                return Ok(Value::Null);
            }
            return Err((
                "missing".to_string(),
                "field is required but no value resolved".to_string(),
            ));
        }
        Some(v) => v,
    };

    match field.field_type {
        FieldType::BigInt => coerce_bigint(value),
        FieldType::Double => coerce_double(value),
        FieldType::Text => coerce_text(field, value),
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => invalid_type("boolean", value),
        },
        FieldType::Timestamp => match value.as_str() {
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .map_err(|e| ("invalid_timestamp".to_string(), e.to_string())),
            None => invalid_type("timestamp string", value),
        },
        FieldType::Date => match value.as_str() {
            Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| value.clone())
                .map_err(|e| ("invalid_date".to_string(), e.to_string())),
            None => invalid_type("date string", value),
        },
        FieldType::Json => Ok(value.clone()),
    }
}

fn coerce_bigint(value: &Value) -> Result<Value, (String, String)> {
    if let Some(i) = value.as_i64() {
        return Ok(Value::from(i));
    }
    // Lax coercions: integral floats and numeric strings.
    if let Some(f) = value.as_f64() {
        if f.fract() == 0.0 {
            return Ok(Value::from(f as i64));
        }
    }
    if let Some(s) = value.as_str() {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Value::from(i));
        }
    }
    invalid_type("integer", value)
}

fn coerce_double(value: &Value) -> Result<Value, (String, String)> {
    if let Some(f) = value.as_f64() {
        return Ok(Value::from(f));
    }
    if let Some(s) = value.as_str() {
        if let Ok(f) = s.parse::<f64>() {
            return Ok(Value::from(f));
        }
    }
    invalid_type("number", value)
}

fn coerce_text(field: &FieldDef, value: &Value) -> Result<Value, (String, String)> {
    let Some(s) = value.as_str() else {
        return invalid_type("string", value);
    };
    if let Some(max) = field.max_length {
        let len = s.chars().count();
        if len > max {
            return Err((
                "string_too_long".to_string(),
                format!("string should have at most {max} characters, got {len}"),
            ));
        }
    }
    Ok(value.clone())
}

fn invalid_type(expected: &str, value: &Value) -> Result<Value, (String, String)> {
    Err((
        "invalid_type".to_string(),
        format!("expected {expected}, got {value}"),
    ))
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Convert a CamelCase model name to a snake_case table name.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() {
            let prev_lower_or_digit =
                i > 0 && (chars[i - 1].is_ascii_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if i > 0 && (prev_lower_or_digit || (next_lower && chars[i - 1].is_ascii_uppercase())) {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_model() -> Arc<DataModel> {
        DataModel::new(
            "StripeCharges",
            vec![
                FieldDef::new("id", FieldType::Text, "root.id").primary_key(),
                FieldDef::new("amount", FieldType::BigInt, "root.amount"),
                FieldDef::new("currency", FieldType::Text, "root.currency").max_length(3),
                FieldDef::new("paid", FieldType::Boolean, "root.paid"),
                FieldDef::new("created", FieldType::Timestamp, "root.created").nullable(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn camel_to_snake_conversions() {
        assert_eq!(camel_to_snake("StripeCharges"), "stripe_charges");
        assert_eq!(camel_to_snake("DummyJSONProducts"), "dummy_json_products");
        assert_eq!(camel_to_snake("APIWatermark"), "api_watermark");
        assert_eq!(camel_to_snake("invoice"), "invoice");
    }

    #[test]
    fn table_names_derived_from_model_name() {
        let model = sample_model();
        assert_eq!(model.target_table_name(), "stripe_charges");
        assert_eq!(model.stage_table_name(), "stage_stripe_charges");
    }

    #[test]
    fn sorted_keys_are_sorted_regardless_of_declaration_order() {
        let model = sample_model();
        assert_eq!(
            model.sorted_keys(),
            &["amount", "created", "currency", "id", "paid"]
        );
    }

    #[test]
    fn validate_coerces_and_normalizes() {
        let model = sample_model();
        let row = model
            .validate_record(&[
                ("id".to_string(), Some(json!("ch_1"))),
                ("amount".to_string(), Some(json!("250"))),
                ("currency".to_string(), Some(json!("usd"))),
                ("paid".to_string(), Some(json!(true))),
                ("created".to_string(), Some(json!("2024-03-01T12:00:00+00:00"))),
            ])
            .unwrap();
        assert_eq!(row["amount"], json!(250));
        assert_eq!(row["created"], json!("2024-03-01T12:00:00Z"));
    }

    #[test]
    fn max_length_violation_is_tagged() {
        let model = sample_model();
        let failures = model
            .validate_record(&[
                ("id".to_string(), Some(json!("ch_1"))),
                ("amount".to_string(), Some(json!(1))),
                ("currency".to_string(), Some(json!("ABCD"))),
                ("paid".to_string(), Some(json!(true))),
                ("created".to_string(), None),
            ])
            .unwrap_err();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind, "string_too_long");
        assert_eq!(failures[0].field, "currency");
    }

    #[test]
    fn missing_required_field_is_reported() {
        let model = sample_model();
        let failures = model
            .validate_record(&[
                ("id".to_string(), None),
                ("amount".to_string(), Some(json!(1))),
                ("currency".to_string(), Some(json!("usd"))),
                ("paid".to_string(), Some(json!(true))),
                ("created".to_string(), None),
            ])
            .unwrap_err();
        assert_eq!(failures[0].kind, "missing");
    }

    #[test]
    fn model_without_primary_key_rejected() {
        let err = DataModel::new(
            "NoKeys",
            vec![FieldDef::new("name", FieldType::Text, "root.name")],
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "config_invalid_model");
    }
}
