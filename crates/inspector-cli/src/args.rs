use clap::{ArgAction, Parser, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "inspector",
    about = "Build a transport to an MCP server and optionally open it",
    version
)]
pub struct InspectorArgs {
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, help = "JSON file with an mcpServers map")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "NAME", requires = "config", help = "Server to use from the config file")]
    pub server: Option<String>,

    #[arg(long = "transport", value_enum, help = "Transport type; inferred from TARGET when omitted")]
    pub transport: Option<TransportArg>,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "NAME: VALUE",
        value_parser = parse_header,
        help = "HTTP header for sse/http transports (repeatable)"
    )]
    pub headers: Vec<(String, String)>,

    #[arg(
        short = 'e',
        value_name = "KEY=VALUE",
        value_parser = parse_env,
        help = "Environment variable for stdio servers (repeatable)"
    )]
    pub env: Vec<(String, String)>,

    #[arg(long, action = ArgAction::SetTrue, help = "Skip TLS certificate verification for https targets")]
    pub insecure: bool,

    #[arg(long, action = ArgAction::SetTrue, help = "Start the transport, report, then close it")]
    pub connect: bool,

    #[arg(long, value_name = "MS", default_value_t = 5000, help = "Connect timeout in milliseconds")]
    pub connect_timeout_ms: u64,

    #[arg(value_name = "TARGET", help = "Server URL, or command for stdio servers")]
    pub target: Option<String>,

    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "Arguments passed to a stdio server"
    )]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Stdio,
    Sse,
    Http,
}

impl TransportArg {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportArg::Stdio => "stdio",
            TransportArg::Sse => "sse",
            TransportArg::Http => "http",
        }
    }
}

pub fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("invalid header '{}', expected 'Name: Value'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("invalid header '{}', name is empty", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub fn parse_env(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid environment entry '{}', expected KEY=VALUE", raw)),
    }
}
