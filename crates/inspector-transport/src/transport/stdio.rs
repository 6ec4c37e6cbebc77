use super::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpTransport, MessageRouter, TimeoutConfig,
};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};

/// What happens to the server's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrMode {
    /// Captured; retrieve it with [`StdioTransport::take_stderr`].
    Piped,
    Inherit,
    Null,
}

impl StderrMode {
    fn as_stdio(self) -> Stdio {
        match self {
            StderrMode::Piped => Stdio::piped(),
            StderrMode::Inherit => Stdio::inherit(),
            StderrMode::Null => Stdio::null(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            StderrMode::Piped => "pipe",
            StderrMode::Inherit => "inherit",
            StderrMode::Null => "ignore",
        }
    }
}

/// Parameters a [`StdioTransport`] spawns its server with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioServerParameters {
    pub command: String,
    pub args: Vec<String>,
    /// Complete environment of the child; nothing else is inherited.
    pub env: BTreeMap<String, String>,
    pub stderr: StderrMode,
}

/// Newline-delimited JSON-RPC over a child process's stdin/stdout.
pub struct StdioTransport {
    params: StdioServerParameters,
    timeout_config: TimeoutConfig,
    process: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    stderr: Arc<Mutex<Option<ChildStderr>>>,
    router: MessageRouter,
    is_connected: Arc<AtomicBool>,
}

impl StdioTransport {
    /// Prepare a transport; the process is spawned by [`McpTransport::start`].
    pub fn new(params: StdioServerParameters) -> Self {
        Self::with_timeouts(params, TimeoutConfig::default())
    }

    pub fn with_timeouts(params: StdioServerParameters, timeout_config: TimeoutConfig) -> Self {
        Self {
            params,
            timeout_config,
            process: Arc::new(Mutex::new(None)),
            stdin: Arc::new(Mutex::new(None)),
            stderr: Arc::new(Mutex::new(None)),
            router: MessageRouter::default(),
            is_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn params(&self) -> &StdioServerParameters {
        &self.params
    }

    pub fn command(&self) -> &str {
        &self.params.command
    }

    pub fn args(&self) -> &[String] {
        &self.params.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.params.env
    }

    /// Hand over the captured stderr stream, once.
    ///
    /// Returns `None` before `start`, after a previous call, or when stderr
    /// is not piped.
    pub async fn take_stderr(&self) -> Option<ChildStderr> {
        self.stderr.lock().await.take()
    }

    /// OS process id of the running server.
    pub async fn pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(Child::id)
    }

    fn start_message_loop(&self, stdout: ChildStdout) {
        let router = self.router.clone();
        let is_connected = self.is_connected.clone();
        let command = self.params.command.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            while is_connected.load(Ordering::Relaxed) {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => router.route_text(&line).await,
                    Err(e) => {
                        warn!("Error reading from '{}': {}", command, e);
                        break;
                    }
                }
            }

            debug!("stdout of '{}' closed", command);
            is_connected.store(false, Ordering::Relaxed);
        });
    }

    async fn write_frame<T: Serialize>(&self, frame: &T) -> Result<()> {
        let mut stdin_guard = self.stdin.lock().await;
        if let Some(ref mut stdin) = *stdin_guard {
            let frame_json = serde_json::to_string(frame)?;
            stdin.write_all(frame_json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
            Ok(())
        } else {
            Err(anyhow!("STDIN not available"))
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn start(&self) -> Result<()> {
        if self.process.lock().await.is_some() {
            return Err(anyhow!("Transport already started"));
        }

        let mut child = Command::new(&self.params.command)
            .args(&self.params.args)
            .env_clear()
            .envs(&self.params.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(self.params.stderr.as_stdio())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start MCP server '{}'", self.params.command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Failed to get stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Failed to get stdout"))?;

        *self.stdin.lock().await = Some(stdin);
        *self.stderr.lock().await = child.stderr.take();
        debug!("Spawned '{}' with pid {:?}", self.params.command, child.id());
        *self.process.lock().await = Some(child);

        self.is_connected.store(true, Ordering::Relaxed);
        self.start_message_loop(stdout);

        Ok(())
    }

    async fn send_request(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse> {
        if !self.is_connected().await {
            return Err(anyhow!("Transport not connected"));
        }

        let rx = self.router.register(&request.id).await;
        if let Err(e) = self.write_frame(&request).await {
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
        self.write_frame(&notification).await
    }

    async fn start_listening(&self) -> Result<mpsc::UnboundedReceiver<JsonRpcNotification>> {
        Ok(self.router.listen().await)
    }

    async fn close(&self) -> Result<()> {
        self.is_connected.store(false, Ordering::Relaxed);

        // Close stdin
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }

        // Terminate process
        if let Some(mut process) = self.process.lock().await.take() {
            let _ = process.kill().await;
            let _ = process.wait().await;
        }

        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    fn get_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("transport_type".to_string(), "stdio".to_string());
        metadata.insert("command".to_string(), self.params.command.clone());
        metadata.insert("args".to_string(), self.params.args.join(" "));
        metadata.insert("env_count".to_string(), self.params.env.len().to_string());
        metadata.insert("stderr".to_string(), self.params.stderr.as_str().to_string());
        metadata
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.is_connected.store(false, Ordering::Relaxed);
    }
}
