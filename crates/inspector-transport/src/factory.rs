use crate::environment::{merged_environment, Environment};
use crate::error::{TransportCreationError, TransportError};
use crate::fetch::Fetcher;
use crate::options::{TransportKind, TransportOptions};
use crate::resolve::{display_name, resolve_executable};
use crate::transport::http::{StreamableHttpOptions, StreamableHttpTransport};
use crate::transport::sse::{EventSourceInit, SseTransport, SseTransportOptions};
use crate::transport::stdio::{StderrMode, StdioServerParameters, StdioTransport};
use crate::transport::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport, RequestInit, TimeoutConfig,
};
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use tokio::sync::mpsc;
use url::Url;

/// A constructed, not yet started transport.
pub enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
    StreamableHttp(StreamableHttpTransport),
}

impl Transport {
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Stdio(_) => TransportKind::Stdio,
            Transport::Sse(_) => TransportKind::Sse,
            Transport::StreamableHttp(_) => TransportKind::StreamableHttp,
        }
    }

    pub fn as_stdio(&self) -> Option<&StdioTransport> {
        match self {
            Transport::Stdio(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_sse(&self) -> Option<&SseTransport> {
        match self {
            Transport::Sse(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_streamable_http(&self) -> Option<&StreamableHttpTransport> {
        match self {
            Transport::StreamableHttp(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_boxed(self) -> Box<dyn McpTransport> {
        match self {
            Transport::Stdio(t) => Box::new(t),
            Transport::Sse(t) => Box::new(t),
            Transport::StreamableHttp(t) => Box::new(t),
        }
    }

    fn inner(&self) -> &dyn McpTransport {
        match self {
            Transport::Stdio(t) => t,
            Transport::Sse(t) => t,
            Transport::StreamableHttp(t) => t,
        }
    }
}

#[async_trait]
impl McpTransport for Transport {
    async fn start(&self) -> Result<()> {
        self.inner().start().await
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        self.inner().send_request(request).await
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<()> {
        self.inner().send_notification(notification).await
    }

    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        self.inner().start_listening().await
    }

    async fn close(&self) -> Result<()> {
        self.inner().close().await
    }

    async fn is_connected(&self) -> bool {
        self.inner().is_connected().await
    }

    fn get_metadata(&self) -> HashMap<String, String> {
        self.inner().get_metadata()
    }
}

/// Transport factory for creating transport instances
///
/// Construction is synchronous and performs no I/O: processes are spawned
/// and connections opened only when the returned transport is started.
#[derive(Debug, Clone, Default)]
pub struct TransportFactory {
    timeout_config: TimeoutConfig,
}

impl TransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeouts(timeout_config: TimeoutConfig) -> Self {
        Self { timeout_config }
    }

    /// Build the transport described by `options`.
    ///
    /// `env` is the environment snapshot a stdio server inherits. Every
    /// failure is reported as a [`TransportCreationError`].
    pub fn create_transport(
        &self,
        options: &TransportOptions,
        env: &Environment,
    ) -> Result<Transport, TransportCreationError> {
        self.dispatch(options, env).map_err(TransportCreationError::from)
    }

    /// Same as [`create_transport`](Self::create_transport) with a snapshot
    /// of the current process environment.
    pub fn create_transport_from_process_env(
        &self,
        options: &TransportOptions,
    ) -> Result<Transport, TransportCreationError> {
        self.create_transport(options, &Environment::capture())
    }

    fn dispatch(&self, options: &TransportOptions, env: &Environment) -> Result<Transport, TransportError> {
        match options.kind()? {
            TransportKind::Stdio => self.create_stdio(options, env).map(Transport::Stdio),
            TransportKind::Sse => {
                let (url, request_init, fetch) = self.network_parts(TransportKind::Sse, options)?;
                let transport_options = SseTransportOptions {
                    request_init,
                    event_source_init: fetch.map(|fetch| EventSourceInit { fetch: Some(fetch) }),
                };
                SseTransport::with_timeouts(url, transport_options, self.timeout_config.clone())
                    .map(Transport::Sse)
            }
            TransportKind::StreamableHttp => {
                let (url, request_init, fetch) = self.network_parts(TransportKind::StreamableHttp, options)?;
                let transport_options = StreamableHttpOptions { request_init, fetch };
                StreamableHttpTransport::with_timeouts(url, transport_options, self.timeout_config.clone())
                    .map(Transport::StreamableHttp)
            }
        }
    }

    /// URL, forwarded headers and optional TLS override shared by the
    /// network transports. A missing or empty URL is rejected before parsing.
    fn network_parts(
        &self,
        kind: TransportKind,
        options: &TransportOptions,
    ) -> Result<(Url, Option<RequestInit>, Option<Fetcher>), TransportError> {
        let raw_url = options
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or(TransportError::MissingUrl)?;
        let url = Url::parse(raw_url)?;

        let fetch = if options.disable_ssl_verification {
            Some(Fetcher::with_unverified_tls(&self.timeout_config)?)
        } else {
            None
        };
        let request_init = options.headers.as_ref().map(|headers| RequestInit {
            headers: Some(headers.clone()),
        });

        debug!(
            "Creating {} transport for {} (headers: {}, custom fetch: {})",
            kind,
            url,
            request_init.is_some(),
            fetch.is_some()
        );

        Ok((url, request_init, fetch))
    }

    fn create_stdio(&self, options: &TransportOptions, env: &Environment) -> Result<StdioTransport, TransportError> {
        let args = options.args.clone().unwrap_or_default();
        let merged = merged_environment(env, options.env.as_ref());

        let command = options.command.as_deref().unwrap_or("");
        let resolved = resolve_executable(command, &args, env)?;

        debug!(
            "Creating stdio transport for '{}' ({} args, {} env vars)",
            display_name(&resolved.command),
            resolved.args.len(),
            merged.len()
        );

        Ok(StdioTransport::with_timeouts(
            StdioServerParameters {
                command: resolved.command,
                args: resolved.args,
                env: merged,
                stderr: StderrMode::Piped,
            },
            self.timeout_config.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::fetch::AgentSelection;
    use std::collections::BTreeMap;

    fn snapshot() -> Environment {
        let path = std::env::var("PATH").unwrap_or_default();
        [("PATH", path.as_str()), ("HOME", "/home/tester"), ("API_TOKEN", "t0k3n")]
            .into_iter()
            .collect()
    }

    fn create(options: &TransportOptions) -> Result<Transport, TransportCreationError> {
        TransportFactory::new().create_transport(options, &snapshot())
    }

    #[test]
    fn test_stdio_inherits_environment_and_captures_stderr() {
        let options = TransportOptions::stdio("echo").with_args(["hi"]);
        let transport = create(&options).unwrap();
        let stdio = transport.as_stdio().unwrap();

        assert_eq!(transport.kind(), TransportKind::Stdio);
        assert_eq!(stdio.args(), ["hi".to_string()]);
        assert_eq!(stdio.params().stderr, StderrMode::Piped);
        assert_eq!(stdio.env().get("API_TOKEN"), Some(&"t0k3n".to_string()));
        assert_eq!(stdio.env().get("HOME"), Some(&"/home/tester".to_string()));
        #[cfg(unix)]
        assert_eq!(display_name(stdio.command()), "echo");
    }

    #[test]
    fn test_stdio_without_args_gets_empty_list() {
        let transport = create(&TransportOptions::stdio("/bin/true")).unwrap();
        assert!(transport.as_stdio().unwrap().args().is_empty());
    }

    #[test]
    fn test_stdio_overrides_applied_last() {
        let options = TransportOptions::stdio("/bin/true").with_env("API_TOKEN", "override");
        let transport = create(&options).unwrap();
        assert_eq!(
            transport.as_stdio().unwrap().env().get("API_TOKEN"),
            Some(&"override".to_string())
        );
    }

    #[test]
    fn test_stdio_without_command_fails() {
        let options = TransportOptions {
            transport_type: "stdio".to_string(),
            ..Default::default()
        };
        let err = create(&options).err().unwrap();
        assert_eq!(
            err.to_string(),
            "Failed to create transport: Command must be provided for stdio transport type."
        );
    }

    #[test]
    fn test_missing_url() {
        for kind in ["sse", "http"] {
            let options = TransportOptions {
                transport_type: kind.to_string(),
                ..Default::default()
            };
            let err = create(&options).err().unwrap();
            assert_eq!(
                err.to_string(),
                "Failed to create transport: URL must be provided for SSE or HTTP transport types."
            );
            assert_eq!(err.category(), ErrorCategory::Configuration);
        }
    }

    #[test]
    fn test_empty_url_counts_as_missing() {
        let err = create(&TransportOptions::sse("")).err().unwrap();
        assert!(matches!(err.kind(), TransportError::MissingUrl));
    }

    #[test]
    fn test_malformed_url() {
        let parse_message = Url::parse("not a url").unwrap_err().to_string();
        let err = create(&TransportOptions::http("not a url")).err().unwrap();

        assert!(err.to_string().contains(&parse_message));
        assert_eq!(err.category(), ErrorCategory::UrlParse);
    }

    #[test]
    fn test_unsupported_kind() {
        let options = TransportOptions {
            transport_type: "websocket".to_string(),
            url: Some("ws://localhost".to_string()),
            ..Default::default()
        };
        let err = create(&options).err().unwrap();
        assert_eq!(err.to_string(), "Failed to create transport: Unsupported transport type: websocket");
    }

    #[test]
    fn test_http_headers_forwarded_without_fetch_override() {
        let options = TransportOptions::http("http://x").with_header("A", "B");
        let transport = create(&options).unwrap();
        let http = transport.as_streamable_http().unwrap();

        let mut expected = BTreeMap::new();
        expected.insert("A".to_string(), "B".to_string());
        assert_eq!(
            http.options().request_init,
            Some(RequestInit { headers: Some(expected) })
        );
        assert!(http.options().fetch.is_none());
        assert_eq!(http.url().as_str(), "http://x/");
    }

    #[test]
    fn test_no_headers_means_no_request_init() {
        let transport = create(&TransportOptions::sse("http://localhost:3000/sse")).unwrap();
        let sse = transport.as_sse().unwrap();

        assert!(sse.options().request_init.is_none());
        assert!(sse.options().event_source_init.is_none());
    }

    #[test]
    fn test_sse_fetch_override_selects_by_scheme() {
        let options = TransportOptions::sse("https://secure.example/sse").insecure();
        let transport = create(&options).unwrap();
        let sse = transport.as_sse().unwrap();

        let fetch = sse
            .options()
            .event_source_init
            .as_ref()
            .and_then(|init| init.fetch.as_ref())
            .unwrap();
        let secure = Url::parse("https://secure.example/messages").unwrap();
        let plain = Url::parse("http://plain.example/messages").unwrap();
        assert_eq!(fetch.select(&secure), AgentSelection::Unverified);
        assert_eq!(fetch.select(&plain), AgentSelection::Default);
    }

    #[test]
    fn test_http_fetch_override_slot() {
        let options = TransportOptions::http("https://secure.example/mcp").insecure();
        let transport = create(&options).unwrap();
        let http = transport.as_streamable_http().unwrap();

        assert!(http.options().fetch.as_ref().unwrap().has_override());
        assert!(http.options().request_init.is_none());
    }

    #[test]
    fn test_invalid_header_is_wrapped() {
        let options = TransportOptions::http("http://x").with_header("bad name", "v");
        let err = create(&options).err().unwrap();

        assert!(err.to_string().starts_with("Failed to create transport: "));
        assert_eq!(err.category(), ErrorCategory::DownstreamConstruction);
    }

    #[test]
    fn test_identical_inputs_identical_parameters() {
        let options = TransportOptions::stdio("echo").with_args(["hi"]);
        let first = create(&options).unwrap();
        let second = create(&options).unwrap();
        assert_eq!(first.as_stdio().unwrap().params(), second.as_stdio().unwrap().params());

        let options = TransportOptions::sse("http://localhost:3000/sse").with_header("X", "1");
        let first = create(&options).unwrap();
        let second = create(&options).unwrap();
        assert_eq!(first.get_metadata(), second.get_metadata());
        assert_eq!(
            first.as_sse().unwrap().options().request_init,
            second.as_sse().unwrap().options().request_init
        );
    }
}
