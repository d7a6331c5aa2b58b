//! Webhook transport.
//!
//! Calls are sent as JSON `POST {base_url}/{method}.json` requests. The
//! actual HTTP client is abstracted via a trait so the transport stays
//! independent of any particular HTTP library.

use crate::entity::type_name;
use crate::error::{RemoteError, RemoteResult};
use crate::source::RemoteSource;
use parking_lot::RwLock;
use serde_json::Value;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is usable.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// A [`RemoteSource`] speaking JSON to an inbound webhook URL.
pub struct WebhookSource<C: HttpClient> {
    /// Webhook base URL, without a trailing slash.
    base_url: String,
    /// HTTP client implementation.
    client: C,
    /// Last transport error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> WebhookSource<C> {
    /// Creates a new webhook source.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Returns true if the underlying client reports itself usable.
    pub fn is_healthy(&self) -> bool {
        self.client.is_healthy()
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}.json", self.base_url, method)
    }
}

impl<C: HttpClient> RemoteSource for WebhookSource<C> {
    fn call(&self, method: &str, params: &Value) -> RemoteResult<Value> {
        let body = serde_json::to_vec(params)
            .map_err(|e| RemoteError::malformed(method, format!("failed to encode request: {e}")))?;

        tracing::trace!(method, bytes = body.len(), "posting webhook call");
        let response_body = self.client.post(&self.method_url(method), body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            RemoteError::Transport(e)
        })?;
        *self.last_error.write() = None;

        let response: Value = serde_json::from_slice(&response_body)
            .map_err(|e| RemoteError::malformed(method, format!("failed to decode response: {e}")))?;

        if !response.is_object() {
            return Err(RemoteError::malformed(
                method,
                format!("expected an object, got {}", type_name(&response)),
            ));
        }

        if let Some(code) = response.get("error") {
            let code = match code {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let description = response
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            tracing::debug!(method, %code, %description, "remote returned an error payload");
            return Err(RemoteError::api(method, code, description));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    struct TestClient {
        requests: Mutex<Vec<(String, Value)>>,
        reply: Result<Vec<u8>, String>,
    }

    impl TestClient {
        fn replying(body: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                reply: Ok(body.as_bytes().to_vec()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                reply: Err(message.to_string()),
            }
        }
    }

    impl HttpClient for TestClient {
        fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
            let parsed = serde_json::from_slice(&body).unwrap();
            self.requests.lock().push((url.to_string(), parsed));
            self.reply.clone()
        }
    }

    #[test]
    fn builds_method_urls() {
        let source = WebhookSource::new(
            "https://acme.example.com/rest/1/abc/",
            TestClient::replying(r#"{"result":[]}"#),
        );
        source.call("crm.company.list", &json!({ "start": -1 })).unwrap();

        let requests = source.client.requests.lock();
        assert_eq!(
            requests[0].0,
            "https://acme.example.com/rest/1/abc/crm.company.list.json"
        );
        assert_eq!(requests[0].1["start"], -1);
    }

    #[test]
    fn error_payload_becomes_api_error() {
        let source = WebhookSource::new(
            "https://acme.example.com/rest/1/abc",
            TestClient::replying(
                r#"{"error":"OPERATION_TIME_LIMIT","error_description":"Method is blocked"}"#,
            ),
        );
        let err = source.call("crm.item.list", &json!({})).unwrap_err();

        assert_eq!(
            err,
            RemoteError::api("crm.item.list", "OPERATION_TIME_LIMIT", "Method is blocked")
        );
        assert!(err.is_time_limit());
    }

    #[test]
    fn transport_failure_is_recorded() {
        let source = WebhookSource::new("https://x", TestClient::failing("connection refused"));
        let err = source.call("crm.item.list", &json!({})).unwrap_err();

        assert!(matches!(err, RemoteError::Transport(_)));
        assert_eq!(source.last_error().as_deref(), Some("connection refused"));
    }

    #[test]
    fn undecodable_body_is_malformed() {
        let source = WebhookSource::new("https://x", TestClient::replying("<html>"));
        let err = source.call("crm.item.list", &json!({})).unwrap_err();
        assert!(matches!(err, RemoteError::Malformed { .. }));

        let source = WebhookSource::new("https://x", TestClient::replying("[1,2]"));
        assert!(source.call("crm.item.list", &json!({})).is_err());
    }
}
