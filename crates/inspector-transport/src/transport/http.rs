//! Streamable HTTP transport.
//!
//! Every client frame is POSTed to a single endpoint. The server answers with
//! either a JSON body or a short `text/event-stream` body carrying one or more
//! frames, and may assign a session through the `Mcp-Session-Id` header.

use super::{
    header_names, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport,
    MessageRouter, RequestInit, TimeoutConfig,
};
use crate::error::TransportError;
use crate::event_stream::parse_events;
use crate::fetch::Fetcher;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use url::Url;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";

#[derive(Debug, Clone, Default)]
pub struct StreamableHttpOptions {
    pub request_init: Option<RequestInit>,
    /// Networking override used for every request.
    pub fetch: Option<Fetcher>,
}

pub struct StreamableHttpTransport {
    url: Url,
    options: StreamableHttpOptions,
    fetcher: Fetcher,
    headers: HeaderMap,
    timeout_config: TimeoutConfig,
    session_id: Arc<RwLock<Option<String>>>,
    router: MessageRouter,
    is_connected: Arc<AtomicBool>,
}

impl StreamableHttpTransport {
    /// Validate the options and build the HTTP clients; nothing is sent.
    pub fn new(url: Url, options: StreamableHttpOptions) -> Result<Self, TransportError> {
        Self::with_timeouts(url, options, TimeoutConfig::default())
    }

    pub fn with_timeouts(
        url: Url,
        options: StreamableHttpOptions,
        timeout_config: TimeoutConfig,
    ) -> Result<Self, TransportError> {
        let headers = match &options.request_init {
            Some(init) => init.header_map()?,
            None => HeaderMap::new(),
        };
        let fetcher = match &options.fetch {
            Some(fetcher) => fetcher.clone(),
            None => Fetcher::new(&timeout_config)?,
        };

        Ok(Self {
            url,
            options,
            fetcher,
            headers,
            timeout_config,
            session_id: Arc::new(RwLock::new(None)),
            router: MessageRouter::default(),
            is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn options(&self) -> &StreamableHttpOptions {
        &self.options
    }

    pub async fn session_id(&self) -> Option<String> {
        self.session_id.read().await.clone()
    }

    async fn with_session(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.headers(self.headers.clone());
        match self.session_id.read().await.as_deref() {
            Some(session_id) => builder.header(SESSION_ID_HEADER, session_id),
            None => builder,
        }
    }

    async fn post_frame<T: Serialize>(&self, frame: &T) -> Result<reqwest::Response> {
        let builder = self
            .fetcher
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout_config.request_timeout());

        let response = self
            .with_session(builder)
            .await
            .json(frame)
            .send()
            .await
            .context("Failed to send HTTP request")?;

        if let Some(session_id) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self.session_id.write().await = Some(session_id.to_string());
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP request failed with status {}: {}", status, text));
        }

        Ok(response)
    }

    async fn route_body(&self, response: reqwest::Response) -> Result<()> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        let text = response.text().await.context("Failed to read response body")?;

        if content_type.contains("text/event-stream") {
            for event in parse_events(&text) {
                if event.event == "message" {
                    self.router.route_text(&event.data).await;
                }
            }
        } else {
            self.router.route_text(&text).await;
        }
        Ok(())
    }
}

#[async_trait]
impl McpTransport for StreamableHttpTransport {
    /// No request is sent until the first frame.
    async fn start(&self) -> Result<()> {
        if self.is_connected.swap(true, Ordering::Relaxed) {
            return Err(anyhow!("Transport already started"));
        }
        Ok(())
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if !self.is_connected().await {
            return Err(anyhow!("Transport not connected"));
        }

        let rx = self.router.register(&request.id).await;
        let routed = match self.post_frame(&request).await {
            Ok(response) => self.route_body(response).await,
            Err(e) => Err(e),
        };
        if let Err(e) = routed {
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
        let response = self.post_frame(&notification).await?;
        if response.status() != StatusCode::ACCEPTED {
            self.route_body(response).await?;
        }
        Ok(())
    }

    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        Ok(self.router.listen().await)
    }

    async fn close(&self) -> Result<()> {
        self.is_connected.store(false, Ordering::Relaxed);

        // Ask the server to drop the session; servers may answer 405.
        if let Some(session_id) = self.session_id.write().await.take() {
            let result = self
                .fetcher
                .client_for(&self.url)
                .delete(self.url.clone())
                .headers(self.headers.clone())
                .header(SESSION_ID_HEADER, session_id)
                .timeout(self.timeout_config.request_timeout())
                .send()
                .await;
            match result {
                Ok(response) => debug!("Session terminated with HTTP {}", response.status()),
                Err(e) => warn!("Failed to terminate session at {}: {}", self.url, e),
            }
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    fn get_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("transport_type".to_string(), "http".to_string());
        metadata.insert("url".to_string(), self.url.to_string());
        if let Some(init) = &self.options.request_init {
            metadata.insert("headers".to_string(), header_names(init));
        }
        metadata.insert(
            "tls_verification".to_string(),
            if self.fetcher.has_override() { "disabled" } else { "enabled" }.to_string(),
        );
        metadata.insert(
            "request_timeout_ms".to_string(),
            self.timeout_config.request_timeout_ms.to_string(),
        );
        metadata
    }
}
