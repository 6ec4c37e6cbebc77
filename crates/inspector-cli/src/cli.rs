use crate::args::{InspectorArgs, TransportArg};
use crate::config::ServerConfigFile;
use crate::error::CliError;
use anyhow::Result;
use clap::Parser;
use inspector_transport::{
    Environment, McpTransport, TimeoutConfig, Transport, TransportFactory, TransportOptions,
};
use log::{debug, info};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use url::Url;

pub async fn run() -> Result<()> {
    let args = InspectorArgs::parse();
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with(args, &Environment::capture(), &mut out).await
}

/// Build the transport described by `args`, print its metadata and, with
/// `--connect`, open and close it.
pub async fn run_with<W: Write>(args: InspectorArgs, env: &Environment, out: &mut W) -> Result<()> {
    let options = build_options(&args)?;
    let factory = TransportFactory::with_timeouts(TimeoutConfig {
        connect_timeout_ms: args.connect_timeout_ms,
        ..TimeoutConfig::default()
    });

    let transport = factory.create_transport(&options, env).map_err(CliError::from)?;
    let mut report = metadata_json(&transport);

    if args.connect {
        connect(&transport).await?;
        report["connected"] = json!(true);
    }

    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}

/// Merge the config file entry (if any) with command-line flags.
pub fn build_options(args: &InspectorArgs) -> Result<TransportOptions, CliError> {
    let mut options = match &args.config {
        Some(path) => {
            let config = ServerConfigFile::load(path)?;
            let (name, entry) = config.select(args.server.as_deref())?;
            debug!("Using server '{}' from {}", name, path.display());
            entry.to_options()
        }
        None => options_from_target(args)?,
    };

    // --transport overrides the type recorded in a config file
    if let (Some(kind), Some(_)) = (args.transport, &args.config) {
        options.transport_type = kind.as_str().to_string();
    }
    for (name, value) in &args.headers {
        options = options.with_header(name.clone(), value.clone());
    }
    for (key, value) in &args.env {
        options = options.with_env(key.clone(), value.clone());
    }
    if args.insecure {
        options = options.insecure();
    }

    Ok(options)
}

fn options_from_target(args: &InspectorArgs) -> Result<TransportOptions, CliError> {
    let target = args
        .target
        .as_deref()
        .ok_or_else(|| CliError::ArgParse("a TARGET or --config is required".to_string()))?;

    let kind = args.transport.unwrap_or_else(|| infer_transport(target));
    let options = match kind {
        TransportArg::Stdio => TransportOptions::stdio(target).with_args(args.args.iter().cloned()),
        TransportArg::Sse => TransportOptions::sse(target),
        TransportArg::Http => TransportOptions::http(target),
    };
    if kind != TransportArg::Stdio && !args.args.is_empty() {
        return Err(CliError::ArgParse(format!(
            "extra arguments are only accepted for stdio servers: {}",
            args.args.join(" ")
        )));
    }
    Ok(options)
}

/// `http(s)` URLs ending in `/sse` use SSE, other URLs streamable HTTP,
/// anything else is a command.
pub fn infer_transport(target: &str) -> TransportArg {
    match Url::parse(target) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            if url.path().trim_end_matches('/').ends_with("/sse") {
                TransportArg::Sse
            } else {
                TransportArg::Http
            }
        }
        _ => TransportArg::Stdio,
    }
}

fn metadata_json(transport: &Transport) -> Value {
    let metadata: BTreeMap<String, String> = transport.get_metadata().into_iter().collect();
    json!({
        "transport": transport.kind().to_string(),
        "metadata": metadata,
    })
}

async fn connect(transport: &Transport) -> Result<(), CliError> {
    transport
        .start()
        .await
        .map_err(|e| CliError::Connection(format!("{:#}", e)))?;

    if let Some(stdio) = transport.as_stdio() {
        if let Some(stderr) = stdio.take_stderr().await {
            let server = stdio.command().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!("[{}] {}", server, line);
                }
            });
        }
    }

    info!("Connected via {}", transport.kind());
    transport
        .close()
        .await
        .map_err(|e| CliError::Connection(format!("{:#}", e)))
}
