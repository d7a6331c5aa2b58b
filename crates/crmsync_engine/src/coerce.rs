//! Record coercion.
//!
//! Remote values arrive in many shapes: scalars, single-element wrappers,
//! `Y`/`N` flags, pipe-suffixed enumeration values, lists. Coercion turns each
//! of them into one cell value for the mapped column. Bad data is nulled out,
//! never rejected.

use crmsync_store::{FieldDescriptor, FieldType, SqlValue};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

/// Separator of joined multiple values.
pub const MULTIPLE_SEPARATOR: &str = ", ";

/// Where and how one remote field is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Remote identifier as cataloged.
    pub remote_field_id: String,
    /// Destination column.
    pub column: String,
    /// Expected type.
    pub field_type: FieldType,
    /// Whether values are joined lists.
    pub is_multiple: bool,
}

/// Active fields keyed by upper-cased remote identifier.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    specs: Vec<FieldSpec>,
    by_key: HashMap<String, usize>,
}

impl FieldMap {
    /// Builds the map from catalog rows, skipping deleted ones.
    ///
    /// When two identifiers differ only by case the first row wins.
    pub fn from_descriptors(fields: &[FieldDescriptor]) -> Self {
        let mut map = Self::default();
        for field in fields.iter().filter(|f| !f.is_deleted) {
            let key = field.remote_field_id.to_uppercase();
            if let Some(&winner) = map.by_key.get(&key) {
                warn!(
                    field = %field.remote_field_id,
                    kept = %map.specs[winner].remote_field_id,
                    "field identifiers collide ignoring case"
                );
                continue;
            }
            map.by_key.insert(key, map.specs.len());
            map.specs.push(FieldSpec {
                remote_field_id: field.remote_field_id.clone(),
                column: field.physical_column.clone(),
                field_type: field.field_type,
                is_multiple: field.is_multiple,
            });
        }
        map
    }

    /// Looks up a record key, ignoring case.
    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.by_key
            .get(&key.to_uppercase())
            .map(|&index| &self.specs[index])
    }

    /// Remote `select` list: every mapped field plus both identifier spellings.
    pub fn select_list(&self) -> Vec<String> {
        let mut select: Vec<String> = self
            .specs
            .iter()
            .map(|spec| spec.remote_field_id.clone())
            .collect();
        for id_key in ["ID", "id"] {
            if !select.iter().any(|s| s == id_key) {
                select.push(id_key.to_string());
            }
        }
        select
    }

    /// Number of mapped fields.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if no field is mapped.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Coerces every mapped field of a record into column values.
///
/// Unmapped keys are ignored. A column receives the value of the last key
/// mapped to it.
pub fn coerce_record(record: &Map<String, Value>, fields: &FieldMap) -> Vec<(String, SqlValue)> {
    let mut values: Vec<(String, SqlValue)> = Vec::new();
    for (key, raw) in record {
        let Some(spec) = fields.get(key) else {
            continue;
        };
        let value = coerce_value(raw, spec);
        match values.iter_mut().find(|(column, _)| *column == spec.column) {
            Some(slot) => slot.1 = value,
            None => values.push((spec.column.clone(), value)),
        }
    }
    values
}

/// Coerces one remote value for a field.
pub fn coerce_value(raw: &Value, spec: &FieldSpec) -> SqlValue {
    let value = unwrap_single(raw);
    let value = match value.as_str() {
        Some("Y") => Value::from(1),
        Some("N") => Value::from(0),
        _ => value.clone(),
    };

    if is_blank(&value) {
        return SqlValue::Null;
    }

    let value = match value {
        Value::Array(items) => collapse(items.iter(), spec.is_multiple),
        Value::Object(map) => collapse(map.values(), spec.is_multiple),
        Value::String(s) => Value::String(first_segment(&s)),
        other => other,
    };

    if !spec.is_multiple && spec.field_type.is_typed() {
        return coerce_typed(&value, spec.field_type);
    }
    to_sql(&value)
}

/// `[{"VALUE": x, ...}, ...]` becomes `x`.
fn unwrap_single(raw: &Value) -> &Value {
    match raw {
        Value::Array(items) => match items.first().and_then(|first| first.get("VALUE")) {
            Some(inner) if !inner.is_null() => inner,
            _ => raw,
        },
        _ => raw,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(true) | Value::Number(_) => false,
    }
}

fn collapse<'v>(items: impl Iterator<Item = &'v Value>, multiple: bool) -> Value {
    let mut items = items.map(|item| match item {
        Value::String(s) => Value::String(first_segment(s)),
        other => other.clone(),
    });
    if multiple {
        let joined: Vec<String> = items.map(|item| text(&item)).collect();
        Value::String(joined.join(MULTIPLE_SEPARATOR))
    } else {
        items.next().unwrap_or(Value::Null)
    }
}

/// `"A|extra"` becomes `"A"`.
fn first_segment(s: &str) -> String {
    match s.split_once('|') {
        Some((head, _)) => head.trim().to_string(),
        None => s.to_string(),
    }
}

fn coerce_typed(value: &Value, field_type: FieldType) -> SqlValue {
    if value.is_array() || value.is_object() {
        return to_sql(value);
    }
    let s = text(value);
    if s.is_empty() || s.contains("0000-00-00") {
        return SqlValue::Null;
    }
    if field_type.is_numeric() {
        let cleaned = s.replace(' ', "").replace(',', ".");
        return parse_number(&cleaned).unwrap_or(SqlValue::Null);
    }
    SqlValue::Text(s)
}

fn parse_number(s: &str) -> Option<SqlValue> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(SqlValue::Integer(i));
    }
    let plausible = s.chars().any(|c| c.is_ascii_digit())
        && s.chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if !plausible {
        return None;
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(SqlValue::Real)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
