//! Server-Sent Events transport.
//!
//! The server pushes frames over a long-lived `GET` event stream. Its first
//! event, `endpoint`, names the URL that client frames are `POST`ed to; every
//! later `message` event carries one JSON-RPC frame.

use super::{
    header_names, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport,
    MessageRouter, RequestInit, TimeoutConfig,
};
use crate::error::TransportError;
use crate::event_stream::SseDecoder;
use crate::fetch::Fetcher;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use reqwest::header::{HeaderMap, ACCEPT};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use url::Url;

/// Options for the event-stream request itself.
#[derive(Debug, Clone, Default)]
pub struct EventSourceInit {
    /// Networking override used for the stream and for posted frames.
    pub fetch: Option<Fetcher>,
}

#[derive(Debug, Clone, Default)]
pub struct SseTransportOptions {
    pub request_init: Option<RequestInit>,
    pub event_source_init: Option<EventSourceInit>,
}

pub struct SseTransport {
    url: Url,
    options: SseTransportOptions,
    fetcher: Fetcher,
    headers: HeaderMap,
    timeout_config: TimeoutConfig,
    endpoint: Arc<RwLock<Option<Url>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    router: MessageRouter,
    is_connected: Arc<AtomicBool>,
}

impl SseTransport {
    /// Validate the options and build the HTTP clients; nothing is sent.
    pub fn new(url: Url, options: SseTransportOptions) -> Result<Self, TransportError> {
        Self::with_timeouts(url, options, TimeoutConfig::default())
    }

    pub fn with_timeouts(
        url: Url,
        options: SseTransportOptions,
        timeout_config: TimeoutConfig,
    ) -> Result<Self, TransportError> {
        let headers = match &options.request_init {
            Some(init) => init.header_map()?,
            None => HeaderMap::new(),
        };
        let fetcher = match options.event_source_init.as_ref().and_then(|init| init.fetch.clone()) {
            Some(fetcher) => fetcher,
            None => Fetcher::new(&timeout_config)?,
        };

        Ok(Self {
            url,
            options,
            fetcher,
            headers,
            timeout_config,
            endpoint: Arc::new(RwLock::new(None)),
            reader: Mutex::new(None),
            router: MessageRouter::default(),
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn options(&self) -> &SseTransportOptions {
        &self.options
    }

    /// Endpoint announced by the server, once started.
    pub async fn endpoint(&self) -> Option<Url> {
        self.endpoint.read().await.clone()
    }

    async fn post_frame<T: Serialize>(&self, frame: &T) -> Result<()> {
        let endpoint = self
            .endpoint()
            .await
            .ok_or_else(|| anyhow!("Transport not connected"))?;

        let response = self
            .fetcher
            .post(&endpoint)
            .headers(self.headers.clone())
            .timeout(self.timeout_config.request_timeout())
            .json(frame)
            .send()
            .await
            .context("Failed to POST message to SSE endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Error POSTing to endpoint (HTTP {}): {}", status, text));
        }
        Ok(())
    }
}

fn resolve_endpoint(base: &Url, data: &str) -> Result<Url> {
    let endpoint = base
        .join(data.trim())
        .with_context(|| format!("Invalid endpoint URL: {}", data))?;
    if endpoint.origin() != base.origin() {
        return Err(anyhow!("Endpoint origin does not match connection origin: {}", endpoint));
    }
    Ok(endpoint)
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn start(&self) -> Result<()> {
        if self.reader.lock().await.is_some() {
            return Err(anyhow!("Transport already started"));
        }

        let response = timeout(
            self.timeout_config.connect_timeout(),
            self.fetcher
                .get(&self.url)
                .headers(self.headers.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| anyhow!("Timed out connecting to {}", self.url))?
        .with_context(|| format!("SSE connection to {} failed", self.url))?;

        if !response.status().is_success() {
            return Err(anyhow!("SSE connection to {} failed: HTTP {}", self.url, response.status()));
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel::<Result<Url>>();
        let mut endpoint_tx = Some(endpoint_tx);
        let mut stream = response.bytes_stream();
        let base = self.url.clone();
        let router = self.router.clone();
        let is_connected = self.is_connected.clone();

        // Raised before the reader exists so a stream that ends right away
        // always leaves the flag lowered.
        self.is_connected.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("SSE stream from {} failed: {}", base, e);
                        break;
                    }
                };
                for event in decoder.feed(&chunk) {
                    match event.event.as_str() {
                        "endpoint" => {
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(resolve_endpoint(&base, &event.data));
                            }
                        }
                        "message" => router.route_text(&event.data).await,
                        other => debug!("Ignoring SSE event '{}'", other),
                    }
                }
            }
            debug!("SSE stream from {} ended", base);
            is_connected.store(false, Ordering::Relaxed);
        });

        let endpoint = match timeout(self.timeout_config.connect_timeout(), endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(e))) => {
                handle.abort();
                self.is_connected.store(false, Ordering::Relaxed);
                return Err(e);
            }
            Ok(Err(_)) => {
                self.is_connected.store(false, Ordering::Relaxed);
                return Err(anyhow!("SSE stream closed before an endpoint was announced"));
            }
            Err(_) => {
                handle.abort();
                self.is_connected.store(false, Ordering::Relaxed);
                return Err(anyhow!("Timed out waiting for the endpoint event from {}", self.url));
            }
        };

        debug!("SSE endpoint for {} is {}", self.url, endpoint);
        *self.endpoint.write().await = Some(endpoint);
        *self.reader.lock().await = Some(handle);
        Ok(())
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if !self.is_connected().await {
            return Err(anyhow!("Transport not connected"));
        }

        let rx = self.router.register(&request.id).await;
        if let Err(e) = self.post_frame(&request).await {
            self.router.unregister(&request.id).await;
            return Err(e);
        }

        self.router
            .wait_for(&request.id, rx, self.timeout_config.request_timeout())
            .await
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<()> {
        if !self.is_connected().await {
            return Err(anyhow!("Transport not connected"));
        }
        self.post_frame(&notification).await
    }

    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        Ok(self.router.listen().await)
    }

    async fn close(&self) -> Result<()> {
        self.is_connected.store(false, Ordering::Relaxed);
        if let Some(handle) = self.reader.lock().await.take() {
            handle.abort();
        }
        *self.endpoint.write().await = None;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    fn get_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("transport_type".to_string(), "sse".to_string());
        metadata.insert("url".to_string(), self.url.to_string());
        if let Some(init) = &self.options.request_init {
            metadata.insert("headers".to_string(), header_names(init));
        }
        metadata.insert(
            "tls_verification".to_string(),
            if self.fetcher.has_override() { "disabled" } else { "enabled" }.to_string(),
        );
        metadata
    }
}
