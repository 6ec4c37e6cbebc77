use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Wire mechanism used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local subprocess speaking over stdin/stdout.
    Stdio,
    /// Server-Sent Events stream plus POSTed requests.
    Sse,
    /// Streamable HTTP.
    #[serde(rename = "http")]
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "http",
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, TransportKind::Stdio)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(TransportKind::Stdio),
            "sse" => Ok(TransportKind::Sse),
            "http" => Ok(TransportKind::StreamableHttp),
            other => Err(TransportError::UnsupportedTransport(other.to_string())),
        }
    }
}

/// Caller-supplied description of the transport to build.
///
/// `transport_type` is kept as the raw string so that unknown kinds reach
/// the factory and are reported there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub transport_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Entries applied on top of the inherited environment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "disableSSLVerification")]
    pub disable_ssl_verification: bool,
}

impl TransportOptions {
    pub fn stdio(command: impl Into<String>) -> Self {
        Self {
            transport_type: TransportKind::Stdio.to_string(),
            command: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self {
            transport_type: TransportKind::Sse.to_string(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport_type: TransportKind::StreamableHttp.to_string(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn insecure(mut self) -> Self {
        self.disable_ssl_verification = true;
        self
    }

    /// Parse `transport_type` into a known kind.
    pub fn kind(&self) -> Result<TransportKind, TransportError> {
        self.transport_type.parse()
    }
}
