//! The remote source abstraction.

use crate::entity::EntityKind;
use crate::error::RemoteResult;
use crate::FieldListing;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// A remote CRM reachable through method calls.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (the webhook transport, an in-memory fake for tests, etc.).
/// Implementations return the whole decoded response document; an error
/// payload reported by the remote must surface as
/// [`RemoteError::Api`](crate::RemoteError::Api), never as `Ok`.
pub trait RemoteSource: Send + Sync {
    /// Issues one logical request.
    fn call(&self, method: &str, params: &Value) -> RemoteResult<Value>;

    /// Issues several calls in one round trip.
    ///
    /// `commands` maps a caller-chosen key to a `method?query` command string.
    /// Failing sub-commands do not halt the batch.
    fn batch(&self, commands: &BTreeMap<String, String>) -> RemoteResult<Value> {
        self.call("batch", &json!({ "halt": 0, "cmd": commands }))
    }

    /// Lists the field catalog of one entity kind.
    fn list_fields(&self, kind: &EntityKind) -> RemoteResult<FieldListing> {
        let method = kind.fields_method();
        let response = self.call(method, &Value::Object(kind.base_params()))?;
        kind.fields_from_response(&response)
    }
}
