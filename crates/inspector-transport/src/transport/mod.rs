use crate::error::TransportError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::timeout;

pub mod http;
pub mod sse;
pub mod stdio;

/// JSON-RPC 2.0 request structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 notification structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
}

/// Channel to an MCP server, as handed out by the transport factory.
///
/// Construction never performs I/O; `start` opens the channel.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Spawn the process or open the connection
    async fn start(&self) -> Result<()>;

    /// Send a request and wait for response
    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse>;

    /// Send a notification; no response is expected
    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<()>;

    /// Start listening for notifications
    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<JsonRpcNotification>>;

    /// Close the transport connection
    async fn close(&self) -> Result<()>;

    /// Check if the transport is connected
    async fn is_connected(&self) -> bool;

    /// Get transport-specific metadata
    fn get_metadata(&self) -> HashMap<String, String>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TimeoutConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            request_timeout_ms: 30000,
        }
    }
}

impl TimeoutConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Options applied to every outgoing HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInit {
    pub headers: Option<BTreeMap<String, String>>,
}

impl RequestInit {
    /// Validate and convert the configured headers.
    pub fn header_map(&self) -> Result<HeaderMap, TransportError> {
        let mut header_map = HeaderMap::new();
        for (key, value) in self.headers.iter().flatten() {
            let header_name = HeaderName::from_bytes(key.as_bytes())?;
            let header_value = HeaderValue::from_str(value)?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// Dispatches incoming frames to waiting requests and notification listeners.
#[derive(Clone, Default)]
pub(crate) struct MessageRouter {
    response_handlers: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<JsonRpcResponse>>>>,
    notification_tx: Arc<Mutex<Option<mpsc::UnboundedSender<JsonRpcNotification>>>>,
}

impl MessageRouter {
    pub(crate) async fn register(&self, id: &Value) -> mpsc::UnboundedReceiver<JsonRpcResponse> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.response_handlers.write().await.insert(id.to_string(), tx);
        rx
    }

    pub(crate) async fn unregister(&self, id: &Value) {
        self.response_handlers.write().await.remove(&id.to_string());
    }

    pub(crate) async fn listen(&self) -> mpsc::UnboundedReceiver<JsonRpcNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notification_tx.lock().await = Some(tx);
        rx
    }

    /// Route one raw frame; malformed text is logged and dropped.
    pub(crate) async fn route_text(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.route(value).await,
            Err(e) => warn!("Dropping malformed JSON-RPC frame: {}", e),
        }
    }

    pub(crate) async fn route(&self, value: Value) {
        let frames = match value {
            Value::Array(batch) => batch,
            single => vec![single],
        };
        for frame in frames {
            self.route_one(frame).await;
        }
    }

    async fn route_one(&self, value: Value) {
        let has_id = value.get("id").is_some();
        let has_method = value.get("method").is_some();

        match (has_id, has_method) {
            (true, false) => match serde_json::from_value::<JsonRpcResponse>(value) {
                Ok(response) => {
                    let handlers = self.response_handlers.read().await;
                    match handlers.get(&response.id.to_string()) {
                        Some(sender) => {
                            let _ = sender.send(response);
                        }
                        None => debug!("No pending request for response id {}", response.id),
                    }
                }
                Err(e) => warn!("Dropping malformed JSON-RPC response: {}", e),
            },
            (false, true) => match serde_json::from_value::<JsonRpcNotification>(value) {
                Ok(notification) => {
                    let tx_guard = self.notification_tx.lock().await;
                    if let Some(ref sender) = *tx_guard {
                        let _ = sender.send(notification);
                    }
                }
                Err(e) => warn!("Dropping malformed JSON-RPC notification: {}", e),
            },
            (true, true) => debug!("Ignoring server-initiated request"),
            (false, false) => warn!("Dropping frame that is neither a response nor a notification"),
        }
    }

    /// Wait for the response registered under `id`, then drop the handler.
    pub(crate) async fn wait_for(
        &self,
        id: &Value,
        mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
        limit: Duration,
    ) -> Result<JsonRpcResponse> {
        let outcome = timeout(limit, rx.recv()).await;
        self.unregister(id).await;

        match outcome {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(anyhow!("No response received")),
            Err(_) => Err(anyhow!("Timed out after {:?} waiting for response {}", limit, id)),
        }
    }
}

/// Comma-separated header names, for metadata.
pub(crate) fn header_names(request_init: &RequestInit) -> String {
    request_init
        .headers
        .iter()
        .flatten()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization_skips_missing_params() {
        let request = JsonRpcRequest::new(1, "ping", None);
        let text = serde_json::to_string(&request).unwrap();
        assert_eq!(text, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#);
    }

    #[test]
    fn test_header_map_rejects_invalid_names() {
        let mut headers = BTreeMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let init = RequestInit { headers: Some(headers) };
        assert!(init.header_map().is_err());
    }

    #[test]
    fn test_header_map_empty_without_headers() {
        let init = RequestInit::default();
        assert!(init.header_map().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_router_dispatches_responses_and_notifications() {
        let router = MessageRouter::default();
        let id = json!(7);
        let rx = router.register(&id).await;
        let mut notifications = router.listen().await;

        router
            .route_text(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"p":1}}"#)
            .await;
        router
            .route_text(r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#)
            .await;

        let response = router
            .wait_for(&id, rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.result, Some(json!({"ok": true})));

        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.method, "notifications/progress");
    }

    #[tokio::test]
    async fn test_router_routes_batches() {
        let router = MessageRouter::default();
        let first = router.register(&json!(1)).await;
        let second = router.register(&json!(2)).await;

        router
            .route(json!([
                {"jsonrpc": "2.0", "id": 1, "result": {}},
                {"jsonrpc": "2.0", "id": 2, "error": {"code": -32601, "message": "nope", "data": null}}
            ]))
            .await;

        let limit = Duration::from_secs(1);
        assert!(router.wait_for(&json!(1), first, limit).await.unwrap().error.is_none());
        let failed = router.wait_for(&json!(2), second, limit).await.unwrap();
        assert_eq!(failed.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let router = MessageRouter::default();
        let id = json!("slow");
        let rx = router.register(&id).await;

        let err = router
            .wait_for(&id, rx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }
}
