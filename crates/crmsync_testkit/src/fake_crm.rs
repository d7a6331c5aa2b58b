//! An in-memory remote CRM.
//!
//! [`FakeCrm`] serves one entity kind the way the real REST API does:
//! ascending pages of 50, `>field` filters, `select` projection, a `total`
//! count, rate-limit telemetry and structured error payloads. Tests mutate
//! its field catalog and records between passes to simulate remote drift.

use crmsync_remote::{EntityKind, FieldListing, RemoteError, RemoteResult, RemoteSource};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, VecDeque};

/// Page size the fake remote enforces.
pub const FAKE_PAGE_SIZE: usize = 50;

/// Builds single-valued field metadata.
pub fn field(field_type: &str, title: &str) -> Value {
    json!({ "type": field_type, "title": title, "isMultiple": false })
}

/// Builds multiple-valued field metadata.
pub fn multiple_field(field_type: &str, title: &str) -> Value {
    json!({ "type": field_type, "title": title, "isMultiple": true })
}

#[derive(Default)]
struct FakeState {
    fields: FieldListing,
    records: BTreeMap<i64, Map<String, Value>>,
    total_offset: i64,
    operating: Option<f64>,
    operating_reset_at: Option<i64>,
    failures: VecDeque<(Option<String>, RemoteError)>,
    calls: Vec<(String, Value)>,
}

/// An in-memory [`RemoteSource`] for one entity kind.
pub struct FakeCrm {
    kind: EntityKind,
    state: Mutex<FakeState>,
}

impl FakeCrm {
    /// Creates an empty remote for `kind`.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            state: Mutex::new(FakeState::default()),
        }
    }

    /// The served entity kind.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    // ---- field catalog ----

    /// Adds or replaces a field.
    pub fn add_field(&self, id: &str, meta: Value) {
        self.state.lock().fields.insert(id.to_string(), meta);
    }

    /// Changes the title of an existing field.
    pub fn rename_field(&self, id: &str, title: &str) {
        if let Some(meta) = self.state.lock().fields.get_mut(id) {
            meta["title"] = json!(title);
        }
    }

    /// Flips the multiplicity flag of an existing field.
    pub fn set_multiple(&self, id: &str, multiple: bool) {
        if let Some(meta) = self.state.lock().fields.get_mut(id) {
            meta["isMultiple"] = json!(multiple);
        }
    }

    /// Removes a field from the listing.
    pub fn remove_field(&self, id: &str) {
        self.state.lock().fields.remove(id);
    }

    // ---- records ----

    /// Inserts or replaces a record. The identifier key is added automatically.
    pub fn put_record(&self, id: i64, fields: Value) {
        let mut record = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        record.insert(self.kind.id_key().to_string(), json!(id.to_string()));
        self.state.lock().records.insert(id, record);
    }

    /// Inserts `count` records with ids `first..first + count`, built by `make`.
    pub fn put_records(&self, first: i64, count: i64, make: impl Fn(i64) -> Value) {
        for id in first..first + count {
            self.put_record(id, make(id));
        }
    }

    /// Removes a record.
    pub fn remove_record(&self, id: i64) {
        self.state.lock().records.remove(&id);
    }

    /// Number of records held.
    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    // ---- injection ----

    /// Skews every reported `total` by `offset`.
    pub fn set_total_offset(&self, offset: i64) {
        self.state.lock().total_offset = offset;
    }

    /// Reports operating-time telemetry on every list response.
    pub fn set_operating(&self, operating: f64, reset_at: Option<i64>) {
        let mut state = self.state.lock();
        state.operating = Some(operating);
        state.operating_reset_at = reset_at;
    }

    /// Makes the next call fail with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().failures.push_back((None, error));
    }

    /// Makes the next list call fail with `error`; other calls pass through.
    pub fn fail_next_list(&self, error: RemoteError) {
        let method = self.kind.list_method().to_string();
        self.state.lock().failures.push_back((Some(method), error));
    }

    /// Queues a time-limit failure of the next list call.
    pub fn fail_next_with_time_limit(&self) {
        self.fail_next_list(RemoteError::api(
            self.kind.list_method(),
            "OPERATION_TIME_LIMIT",
            "Method is blocked due to operation time limit.",
        ));
    }

    // ---- call log ----

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().calls.clone()
    }

    /// Parameters of every list call received.
    pub fn list_calls(&self) -> Vec<Value> {
        let method = self.kind.list_method();
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Forgets the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn fields_response(&self, state: &FakeState) -> Value {
        match self.kind {
            EntityKind::Company => json!({ "result": state.fields }),
            _ => json!({ "result": { "fields": state.fields } }),
        }
    }

    fn list_response(&self, state: &FakeState, params: &Value) -> Value {
        let filter = params["filter"].as_object().cloned().unwrap_or_default();
        let select: Vec<String> = params["select"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let matching: Vec<&Map<String, Value>> = state
            .records
            .iter()
            .filter(|(id, record)| matches_filter(**id, record, &filter))
            .map(|(_, record)| record)
            .collect();

        let items: Vec<Value> = matching
            .iter()
            .take(FAKE_PAGE_SIZE)
            .map(|record| Value::Object(project(record, &select, self.kind.id_key())))
            .collect();

        let mut response = match self.kind {
            EntityKind::Company => json!({ "result": items }),
            EntityKind::Task => json!({ "result": { "tasks": items } }),
            _ => json!({ "result": { "items": items } }),
        };

        if params["start"] != json!(-1) {
            let total = (matching.len() as i64 + state.total_offset).max(0);
            response["total"] = json!(total);
        }
        if let Some(operating) = state.operating {
            response["time"] = json!({
                "operating": operating,
                "operating_reset_at": state.operating_reset_at,
            });
        }
        response
    }
}

impl RemoteSource for FakeCrm {
    fn call(&self, method: &str, params: &Value) -> RemoteResult<Value> {
        let mut state = self.state.lock();
        state.calls.push((method.to_string(), params.clone()));

        let applies = state
            .failures
            .front()
            .is_some_and(|(only, _)| only.as_deref().map_or(true, |only| only == method));
        if applies {
            if let Some((_, error)) = state.failures.pop_front() {
                return Err(error);
            }
        }

        if method == self.kind.fields_method() {
            Ok(self.fields_response(&state))
        } else if method == self.kind.list_method() {
            Ok(self.list_response(&state, params))
        } else if method == "batch" {
            let mut results = Map::new();
            if let Some(commands) = params["cmd"].as_object() {
                for (key, command) in commands {
                    let command = command.as_str().unwrap_or_default();
                    let sub_method = command.split('?').next().unwrap_or_default();
                    let response = if sub_method == self.kind.list_method() {
                        self.list_response(&state, &json!({}))
                    } else if sub_method == self.kind.fields_method() {
                        self.fields_response(&state)
                    } else {
                        Value::Null
                    };
                    results.insert(key.clone(), response["result"].clone());
                }
            }
            Ok(json!({ "result": { "result": results } }))
        } else {
            Err(RemoteError::api(
                method,
                "ERROR_METHOD_NOT_FOUND",
                "Method not found!",
            ))
        }
    }
}

fn matches_filter(id: i64, record: &Map<String, Value>, filter: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, bound)| match key.strip_prefix('>') {
        Some(field) if field.eq_ignore_ascii_case("id") => {
            as_i64(bound).map_or(true, |bound| id > bound)
        }
        Some(field) => {
            let value = lookup(record, field).map(text).unwrap_or_default();
            value.as_str() > text(bound).as_str()
        }
        None => lookup(record, key).map(text) == Some(text(bound)),
    })
}

fn project(record: &Map<String, Value>, select: &[String], id_key: &str) -> Map<String, Value> {
    if select.is_empty() || select.iter().any(|s| s == "*") {
        return record.clone();
    }
    record
        .iter()
        .filter(|(key, _)| {
            key.as_str() == id_key || select.iter().any(|s| s.eq_ignore_ascii_case(key))
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn lookup<'a>(record: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    record
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(field))
        .map(|(_, value)| value)
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_remote::ListPage;

    fn spa() -> FakeCrm {
        let crm = FakeCrm::new(EntityKind::Spa { id: 1054 });
        crm.add_field("title", field("string", "Title"));
        crm.put_records(1, 120, |id| json!({ "title": format!("Deal {id}"), "updatedTime": "2024-01-01T00:00:00-03:00" }));
        crm
    }

    #[test]
    fn pages_ascending_by_watermark() {
        let crm = spa();
        let kind = crm.kind();

        let mut filter = Map::new();
        filter.insert(">id".into(), json!(0));
        let first = ListPage::from_response(&crm.call(kind.list_method(), &kind.list_params(&[], &filter)).unwrap());
        assert_eq!(first.len(), FAKE_PAGE_SIZE);
        assert_eq!(first.total, Some(120));
        assert_eq!(first.last_id(), Some(50));

        filter.insert(">id".into(), json!(100));
        let last = ListPage::from_response(&crm.call(kind.list_method(), &kind.list_params(&[], &filter)).unwrap());
        assert_eq!(last.len(), 20);
    }

    #[test]
    fn start_minus_one_omits_total() {
        let crm = spa();
        let response = crm
            .call("crm.item.list", &json!({ "filter": {}, "start": -1 }))
            .unwrap();
        assert!(response.get("total").is_none());
    }

    #[test]
    fn projection_keeps_id() {
        let crm = spa();
        let response = crm
            .call("crm.item.list", &json!({ "select": ["id"], "filter": { ">id": 119 } }))
            .unwrap();
        let page = ListPage::from_response(&response);
        assert_eq!(page.items, vec![json!({ "id": "120" })]);
    }

    #[test]
    fn date_filter_and_offset() {
        let crm = spa();
        crm.put_record(121, json!({ "title": "Fresh", "updatedTime": "2024-06-01T00:00:00-03:00" }));
        crm.set_total_offset(3);

        let response = crm
            .call(
                "crm.item.list",
                &json!({ "filter": { ">updatedTime": "2024-05-01T00:00:00-03:00" } }),
            )
            .unwrap();
        assert_eq!(ListPage::from_response(&response).len(), 1);
        assert_eq!(response["total"], 4);
    }

    #[test]
    fn injected_failures_are_consumed_in_order() {
        let crm = spa();
        crm.fail_next_with_time_limit();

        assert!(crm.call("crm.item.fields", &json!({})).is_ok());
        assert!(crm.call("crm.item.list", &json!({})).unwrap_err().is_time_limit());
        assert!(crm.call("crm.item.list", &json!({})).is_ok());
        assert_eq!(crm.list_calls().len(), 2);

        crm.fail_next(RemoteError::Transport("reset".into()));
        assert!(crm.call("crm.item.fields", &json!({})).is_err());
    }

    #[test]
    fn field_listing_follows_kind_shape() {
        let crm = FakeCrm::new(EntityKind::Company);
        crm.add_field("TITLE", field("string", "Company name"));
        let fields = crm.list_fields(&EntityKind::Company).unwrap();
        assert!(fields.contains_key("TITLE"));

        crm.rename_field("TITLE", "Name");
        let fields = crm.list_fields(&EntityKind::Company).unwrap();
        assert_eq!(fields["TITLE"]["title"], "Name");
    }
}
