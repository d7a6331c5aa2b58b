//! Decoded list responses.

use crate::entity::record_id;
use serde_json::Value;

/// One page of a list call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    /// Records on this page, in remote order.
    pub items: Vec<Value>,
    /// Total number of matching records, when the remote counted them.
    pub total: Option<u64>,
    /// Operating time consumed so far in the current rate-limit window.
    pub operating: Option<f64>,
    /// Unix time at which the operating budget resets.
    pub operating_reset_at: Option<i64>,
}

impl ListPage {
    /// Decodes a list response.
    ///
    /// Records are looked up in `result.items`, then `result.tasks`, then
    /// `result` itself; anything else is an empty page.
    pub fn from_response(response: &Value) -> Self {
        let result = &response["result"];
        let items = [&result["items"], &result["tasks"], result]
            .into_iter()
            .find_map(|candidate| candidate.as_array())
            .cloned()
            .unwrap_or_default();

        let time = &response["time"];
        Self {
            items,
            total: as_u64(&response["total"]),
            operating: time["operating"].as_f64(),
            operating_reset_at: time["operating_reset_at"].as_i64(),
        }
    }

    /// Number of records on the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Identifier of the last record carrying one.
    pub fn last_id(&self) -> Option<i64> {
        self.items.iter().rev().find_map(record_id)
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
