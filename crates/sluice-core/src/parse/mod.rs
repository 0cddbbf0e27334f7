//! JSON-to-tabular parser driven by per-field alias paths.
//!
//! Each table's fields alias locations in the JSON tree (`root.id`,
//! `root.reviews[*].rating`, `root.meta.createdAt`). The parser walks each
//! raw record depth-first, caching every node under its concrete path,
//! and attempts extraction for a table at every dict node whose path
//! matches the table's pattern. Wildcard segments are resolved against
//! the index trail of the path being visited, so child rows inherit
//! ancestor fields (foreign keys) by aliasing into parent scope.

mod batch;

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use sluice_error::{ConfigError, FieldFailure, PipelineError};

use crate::model::DataModel;
use crate::source::ApiEndpointConfig;

pub use batch::{row_hash, Record, TableBatch};

#[derive(Debug)]
struct FieldSpec {
    name: String,
    alias: String,
    has_wildcard: bool,
}

#[derive(Debug)]
struct TableSpec {
    model: Arc<DataModel>,
    /// Field specs in sorted-name order.
    fields: Vec<FieldSpec>,
    json_path_pattern: String,
    pattern: Regex,
}

/// Parser for one endpoint's table set. Built once, reused per batch.
#[derive(Debug)]
pub struct JsonParser {
    tables: Vec<TableSpec>,
    index_re: Regex,
}

impl JsonParser {
    pub fn new(endpoint_config: &ApiEndpointConfig) -> Result<Self, ConfigError> {
        let mut tables = Vec::with_capacity(endpoint_config.tables.len());
        for table_config in &endpoint_config.tables {
            tables.push(build_table_spec(&table_config.model)?);
        }
        let index_re = Regex::new(r"\[(\d+)\]").map_err(|e| ConfigError::InvalidModel {
            model: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { tables, index_re })
    }

    /// Patterns in table order, mainly useful for diagnostics.
    pub fn json_path_patterns(&self) -> Vec<&str> {
        self.tables
            .iter()
            .map(|t| t.json_path_pattern.as_str())
            .collect()
    }

    /// Parse one batch of raw records into per-table row sets.
    ///
    /// Validation failures are collected across the whole batch and
    /// raised together with per-path diagnostics.
    pub fn parse(&self, batch: &[Value]) -> Result<Vec<TableBatch>, PipelineError> {
        let mut records: Vec<Vec<Record>> = self.tables.iter().map(|_| Vec::new()).collect();
        let mut errors: Vec<FieldFailure> = Vec::new();

        for raw in batch {
            // A fresh cache per record: every alias lookup for a record
            // happens during that record's walk, and a missing path must
            // not resolve to the previous record's value.
            let mut cache: HashMap<String, &Value> = HashMap::new();
            self.walk(raw, "root", &mut cache, &mut records, &mut errors);
        }

        if !errors.is_empty() {
            return Err(PipelineError::SchemaValidation { failures: errors });
        }

        Ok(self
            .tables
            .iter()
            .zip(records)
            .map(|(spec, records)| TableBatch {
                model: Arc::clone(&spec.model),
                json_path_pattern: spec.json_path_pattern.clone(),
                records,
            })
            .collect())
    }

    fn walk<'a>(
        &self,
        obj: &'a Value,
        path: &str,
        cache: &mut HashMap<String, &'a Value>,
        records: &mut [Vec<Record>],
        errors: &mut Vec<FieldFailure>,
    ) {
        cache.insert(path.to_string(), obj);

        match obj {
            Value::Object(map) => {
                for (key, value) in map {
                    let field_path = format!("{path}.{key}");
                    cache.insert(field_path.clone(), value);
                    if value.is_object() || value.is_array() {
                        self.walk(value, &field_path, cache, records, errors);
                    }
                }
                self.extract_models_at_path(path, cache, records, errors);
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    let item_path = format!("{path}[{index}]");
                    cache.insert(item_path.clone(), item);
                    if item.is_object() || item.is_array() {
                        self.walk(item, &item_path, cache, records, errors);
                    }
                }
            }
            _ => {}
        }
    }

    fn extract_models_at_path(
        &self,
        path: &str,
        cache: &HashMap<String, &Value>,
        records: &mut [Vec<Record>],
        errors: &mut Vec<FieldFailure>,
    ) {
        for (table_index, spec) in self.tables.iter().enumerate() {
            if !spec.pattern.is_match(path) {
                continue;
            }
            let data = self.build_model_data(path, spec, cache);
            match spec.model.validate_record(&data) {
                Ok(values) => records[table_index].push(Record::new(values)),
                Err(failures) => {
                    errors.extend(failures.into_iter().map(|f| FieldFailure {
                        path: path.to_string(),
                        model: spec.model.name().to_string(),
                        field: f.field,
                        kind: f.kind,
                        message: f.message,
                    }));
                }
            }
        }
    }

    fn build_model_data(
        &self,
        path: &str,
        spec: &TableSpec,
        cache: &HashMap<String, &Value>,
    ) -> Vec<(String, Option<Value>)> {
        let mut data = Vec::with_capacity(spec.fields.len());
        for field in &spec.fields {
            let value = if field.has_wildcard {
                let list_path = field.alias.replace("[*]", "");
                match cache.get(list_path.as_str()) {
                    Some(Value::Array(items)) => {
                        if items.is_empty() || !items[0].is_object() {
                            // A list of scalars is stored as one JSON
                            // string column, not exploded into rows.
                            Some(Value::String(
                                serde_json::to_string(items).unwrap_or_default(),
                            ))
                        } else {
                            self.lookup_resolved(&field.alias, path, cache)
                        }
                    }
                    _ => self.lookup_resolved(&field.alias, path, cache),
                }
            } else {
                cache.get(field.alias.as_str()).map(|v| (*v).clone())
            };
            data.push((field.name.clone(), value));
        }
        data
    }

    fn lookup_resolved(
        &self,
        alias: &str,
        path: &str,
        cache: &HashMap<String, &Value>,
    ) -> Option<Value> {
        let resolved = self.replace_wildcard_with_index(alias, path);
        cache.get(resolved.as_str()).map(|v| (*v).clone())
    }

    /// Resolve each `[*]` segment of `alias` to the concrete index the
    /// walk is currently visiting, reading the index trail off `path`.
    fn replace_wildcard_with_index(&self, alias: &str, path: &str) -> String {
        let alias_segments: Vec<&str> = alias.split('.').collect();
        let current_segments: Vec<&str> = path.split('.').collect();
        let mut resolved: Vec<String> = Vec::with_capacity(alias_segments.len());
        let mut current_index = 0;

        for segment in alias_segments {
            if segment.contains("[*]") {
                let key_name = segment.split('[').next().unwrap_or(segment);
                let prefix = format!("{key_name}[");
                let mut found = false;
                for idx in current_index..current_segments.len() {
                    let candidate = current_segments[idx];
                    if candidate.starts_with(&prefix) {
                        if let Some(caps) = self.index_re.captures(candidate) {
                            resolved.push(format!("{key_name}[{}]", &caps[1]));
                            current_index = idx + 1;
                            found = true;
                            break;
                        }
                    }
                }
                if !found {
                    resolved.push(segment.to_string());
                }
            } else {
                resolved.push(segment.to_string());
                if current_index < current_segments.len()
                    && current_segments[current_index] == segment
                {
                    current_index += 1;
                }
            }
        }

        resolved.join(".")
    }
}

fn build_table_spec(model: &Arc<DataModel>) -> Result<TableSpec, ConfigError> {
    let mut fields: Vec<FieldSpec> = model
        .fields()
        .iter()
        .map(|f| FieldSpec {
            name: f.name.clone(),
            alias: f.alias.clone(),
            has_wildcard: f.alias.contains("[*]"),
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));

    let wildcard_aliases: Vec<&str> = fields
        .iter()
        .filter(|f| f.has_wildcard)
        .map(|f| f.alias.as_str())
        .collect();

    let json_path_pattern = if wildcard_aliases.is_empty() {
        let all_aliases: Vec<&str> = fields.iter().map(|f| f.alias.as_str()).collect();
        deepest_common_path_pattern(&all_aliases)
    } else {
        deepest_wildcard_path(&wildcard_aliases)
    };

    let escaped = regex::escape(&json_path_pattern).replace(r"\[\*\]", r"\[\d+\]");
    let pattern = Regex::new(&format!("^{escaped}$")).map_err(|e| ConfigError::InvalidModel {
        model: model.name().to_string(),
        message: format!("could not compile path pattern: {e}"),
    })?;

    Ok(TableSpec {
        model: Arc::clone(model),
        fields,
        json_path_pattern,
        pattern,
    })
}

fn alias_parent(alias: &str) -> &str {
    alias.rsplit_once('.').map_or("", |(parent, _)| parent)
}

/// Deepest parent among wildcard aliases, by dot count. First wins ties.
fn deepest_wildcard_path(aliases: &[&str]) -> String {
    let mut best = "";
    let mut best_depth = 0;
    for alias in aliases {
        let parent = alias_parent(alias);
        let depth = parent.matches('.').count() + 1;
        if depth > best_depth {
            best = parent;
            best_depth = depth;
        }
    }
    best.to_string()
}

/// Deepest common dotted prefix of all aliases' parents, ignoring array
/// index suffixes when comparing segments. Falls back to `root`.
fn deepest_common_path_pattern(aliases: &[&str]) -> String {
    let segmented: Vec<Vec<&str>> = aliases
        .iter()
        .map(|alias| alias_parent(alias).split('.').collect())
        .collect();
    let min_len = segmented.iter().map(Vec::len).min().unwrap_or(0);

    let mut common: Vec<&str> = Vec::new();
    for position in 0..min_len {
        let first = segmented[0][position];
        let first_base = first.split('[').next().unwrap_or(first);
        let all_match = segmented
            .iter()
            .all(|segments| segments[position].split('[').next() == Some(first_base));
        if all_match {
            common.push(first);
        } else {
            break;
        }
    }

    if common.is_empty() || common == [""] {
        "root".to_string()
    } else {
        common.join(".")
    }
}
