//! Parsed-row containers and the content hash.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use xxhash_rust::xxh3::xxh3_128;

use crate::model::DataModel;

/// One validated row destined for a stage table.
///
/// `values` holds the model fields only; the 16-byte content hash is kept
/// alongside and written to `etl_row_hash`.
#[derive(Debug, Clone)]
pub struct Record {
    pub values: BTreeMap<String, Value>,
    pub row_hash: [u8; 16],
}

impl Record {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        let row_hash = row_hash(&values);
        Self { values, row_hash }
    }
}

/// All rows extracted for one table in one parse cycle.
#[derive(Debug, Clone)]
pub struct TableBatch {
    pub model: Arc<DataModel>,
    /// The concrete-path pattern the parser matched rows at, e.g.
    /// `root.reviews[*]`.
    pub json_path_pattern: String,
    pub records: Vec<Record>,
}

/// xxh128 digest of the `|`-joined canonical string form of the row,
/// fields in sorted order. `BTreeMap` iteration provides the order.
pub fn row_hash(values: &BTreeMap<String, Value>) -> [u8; 16] {
    let mut joined = String::new();
    for (i, value) in values.values().enumerate() {
        if i > 0 {
            joined.push('|');
        }
        joined.push_str(&hash_string(value));
    }
    xxh3_128(joined.as_bytes()).to_be_bytes()
}

/// Canonical string form of a value for hashing. Null is the empty
/// string so nullable columns hash stably.
fn hash_string(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Bool(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(_) | Value::Object(_) => {
            Cow::Owned(serde_json::to_string(value).unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn identical_rows_hash_identically() {
        let a = row(&[("id", json!(1)), ("name", json!("widget"))]);
        let b = row(&[("name", json!("widget")), ("id", json!(1))]);
        assert_eq!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn any_field_change_changes_the_hash() {
        let a = row(&[("id", json!(1)), ("name", json!("widget"))]);
        let b = row(&[("id", json!(1)), ("name", json!("gadget"))]);
        assert_ne!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn null_hashes_as_empty_string() {
        let with_null = row(&[("id", json!(1)), ("name", Value::Null)]);
        let with_empty = row(&[("id", json!(1)), ("name", json!(""))]);
        assert_eq!(row_hash(&with_null), row_hash(&with_empty));
    }

    #[test]
    fn hash_matches_joined_digest() {
        let values = row(&[("amount", json!(250)), ("id", json!("ch_1"))]);
        let expected = xxh3_128("250|ch_1".as_bytes()).to_be_bytes();
        assert_eq!(row_hash(&values), expected);
    }
}
