use crate::error::CliError;
use inspector_transport::TransportOptions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Contents of an `mcpServers` configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigFile {
    pub mcp_servers: BTreeMap<String, ServerEntry>,
}

/// One named server in the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerEntry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ServerConfigFile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&text)
            .map_err(|e| CliError::Config(format!("invalid config file {}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Pick the entry named `name`; a file with a single server needs no name.
    pub fn select(&self, name: Option<&str>) -> Result<(&str, &ServerEntry), CliError> {
        match name {
            Some(name) => self
                .mcp_servers
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| {
                    CliError::Config(format!(
                        "server '{}' not found in config (available: {})",
                        name,
                        self.server_names().join(", ")
                    ))
                }),
            None => match self.mcp_servers.len() {
                0 => Err(CliError::Config("config file has no servers".to_string())),
                1 => self
                    .mcp_servers
                    .iter()
                    .next()
                    .map(|(k, v)| (k.as_str(), v))
                    .ok_or_else(|| CliError::Config("config file has no servers".to_string())),
                _ => Err(CliError::Config(format!(
                    "config file defines several servers, pick one with --server ({})",
                    self.server_names().join(", ")
                ))),
            },
        }
    }

    pub fn server_names(&self) -> Vec<&str> {
        self.mcp_servers.keys().map(String::as_str).collect()
    }
}

impl ServerEntry {
    /// Transport type, defaulting to `stdio` for command entries and `sse`
    /// for URL entries. Config files may spell `http` as `streamable-http`.
    pub fn transport_type(&self) -> String {
        match (&self.kind, &self.command) {
            (Some(kind), _) if kind == "streamable-http" => "http".to_string(),
            (Some(kind), _) => kind.clone(),
            (None, Some(_)) => "stdio".to_string(),
            (None, None) => "sse".to_string(),
        }
    }

    pub fn to_options(&self) -> TransportOptions {
        TransportOptions {
            transport_type: self.transport_type(),
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            disable_ssl_verification: false,
        }
    }
}
