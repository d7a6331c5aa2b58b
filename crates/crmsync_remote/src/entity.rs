//! Entity kinds and their remote vocabulary.

use crate::error::{RemoteError, RemoteResult};
use crate::FieldListing;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// One synchronizable remote object kind.
///
/// Each kind differs in method names, in the casing of its identifier key
/// and in where list and field payloads sit inside the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EntityKind {
    /// Companies.
    Company,
    /// Tasks.
    Task,
    /// A smart process type.
    Spa {
        /// Remote entity type id.
        id: u32,
    },
    /// A built-in CRM item type (deals, leads, ...).
    Crm {
        /// Remote entity type id.
        id: u32,
    },
}

impl EntityKind {
    /// Short name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Task => "task",
            EntityKind::Spa { .. } => "spa",
            EntityKind::Crm { .. } => "crm",
        }
    }

    /// Remote entity type id, for item kinds.
    pub fn entity_type_id(&self) -> Option<u32> {
        match self {
            EntityKind::Spa { id } | EntityKind::Crm { id } => Some(*id),
            _ => None,
        }
    }

    /// Method returning the field catalog.
    pub fn fields_method(&self) -> &'static str {
        match self {
            EntityKind::Company => "crm.company.fields",
            EntityKind::Task => "tasks.task.getFields",
            EntityKind::Spa { .. } | EntityKind::Crm { .. } => "crm.item.fields",
        }
    }

    /// Method returning paginated records.
    pub fn list_method(&self) -> &'static str {
        match self {
            EntityKind::Company => "crm.company.list",
            EntityKind::Task => "tasks.task.list",
            EntityKind::Spa { .. } | EntityKind::Crm { .. } => "crm.item.list",
        }
    }

    /// Identifier key used in filters.
    pub fn id_key(&self) -> &'static str {
        match self {
            EntityKind::Company | EntityKind::Task => "ID",
            EntityKind::Spa { .. } | EntityKind::Crm { .. } => "id",
        }
    }

    /// Field holding the last modification time, used by incremental passes.
    pub fn updated_field(&self) -> &'static str {
        match self {
            EntityKind::Task => "changedDate",
            _ => "updatedTime",
        }
    }

    /// Parameters every call for this kind carries.
    pub fn base_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        if let Some(id) = self.entity_type_id() {
            params.insert("entityTypeId".into(), json!(id));
        }
        params
    }

    /// Ascending identifier order.
    pub fn order(&self) -> Value {
        match self {
            EntityKind::Company => json!({ "ID": "ASC" }),
            _ => json!({ "id": "asc" }),
        }
    }

    /// Builds list parameters with an ascending identifier order.
    pub fn list_params(&self, select: &[String], filter: &Map<String, Value>) -> Value {
        let mut params = self.base_params();
        params.insert("select".into(), json!(select));
        params.insert("filter".into(), Value::Object(filter.clone()));
        params.insert("order".into(), self.order());
        Value::Object(params)
    }

    /// Extracts the field listing from a field-method response.
    pub fn fields_from_response(&self, response: &Value) -> RemoteResult<FieldListing> {
        let result = &response["result"];
        let fields = match self {
            EntityKind::Company => result,
            _ => &result["fields"],
        };
        match fields {
            Value::Object(map) => Ok(map.clone()),
            Value::Null => Ok(FieldListing::new()),
            Value::Array(items) if items.is_empty() => Ok(FieldListing::new()),
            other => Err(RemoteError::malformed(
                self.fields_method(),
                format!("expected a field map, got {}", type_name(other)),
            )),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entity_type_id() {
            Some(id) => write!(f, "{}:{}", self.name(), id),
            None => f.write_str(self.name()),
        }
    }
}

/// Reads the remote identifier of a record.
///
/// Accepts `ID` or `id`, as a number or a numeric string. Zero and
/// non-numeric identifiers yield `None`.
pub fn record_id(item: &Value) -> Option<i64> {
    let raw = item.get("ID").or_else(|| item.get("id"))?;
    let id = match raw {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (id != 0).then_some(id)
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_deserializes_from_config_shape() {
        let kind: EntityKind = serde_json::from_value(json!({ "type": "spa", "id": 1054 })).unwrap();
        assert_eq!(kind, EntityKind::Spa { id: 1054 });

        let kind: EntityKind = serde_json::from_value(json!({ "type": "company" })).unwrap();
        assert_eq!(kind, EntityKind::Company);
        assert_eq!(kind.to_string(), "company");
        assert_eq!(EntityKind::Crm { id: 2 }.to_string(), "crm:2");
    }

    #[test]
    fn vocabulary_per_kind() {
        assert_eq!(EntityKind::Company.id_key(), "ID");
        assert_eq!(EntityKind::Task.list_method(), "tasks.task.list");
        assert_eq!(EntityKind::Task.updated_field(), "changedDate");
        assert_eq!(EntityKind::Crm { id: 2 }.updated_field(), "updatedTime");
        assert_eq!(EntityKind::Spa { id: 9 }.id_key(), "id");
        assert!(EntityKind::Company.base_params().is_empty());
    }

    #[test]
    fn list_params_shape() {
        let mut filter = Map::new();
        filter.insert(">id".into(), json!(10));
        let params = EntityKind::Spa { id: 190 }.list_params(&["id".into(), "title".into()], &filter);

        assert_eq!(params["entityTypeId"], 190);
        assert_eq!(params["select"], json!(["id", "title"]));
        assert_eq!(params["filter"][">id"], 10);
        assert_eq!(params["order"], json!({ "id": "asc" }));
    }

    #[test]
    fn fields_payload_locations() {
        let company = json!({ "result": { "TITLE": { "type": "string" } } });
        assert!(EntityKind::Company
            .fields_from_response(&company)
            .unwrap()
            .contains_key("TITLE"));

        let task = json!({ "result": { "fields": { "TITLE": { "type": "string" } } } });
        assert!(EntityKind::Task
            .fields_from_response(&task)
            .unwrap()
            .contains_key("TITLE"));

        let empty = json!({ "result": { "fields": [] } });
        assert!(EntityKind::Task.fields_from_response(&empty).unwrap().is_empty());

        let bad = json!({ "result": { "fields": "nope" } });
        assert!(EntityKind::Task.fields_from_response(&bad).is_err());
    }

    #[test]
    fn record_ids() {
        assert_eq!(record_id(&json!({ "ID": "42" })), Some(42));
        assert_eq!(record_id(&json!({ "id": 7 })), Some(7));
        assert_eq!(record_id(&json!({ "id": 0 })), None);
        assert_eq!(record_id(&json!({ "id": "abc" })), None);
        assert_eq!(record_id(&json!({ "title": "x" })), None);
    }
}
