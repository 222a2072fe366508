//! JSON-RPC stdio client to the tool-server child process (`spec.md` §4.3).
//!
//! Grounded directly on the teacher's `modules::mcp_client::McpClient`: one
//! `Mutex` guards both the child's stdin and the monotonic id allocator, so
//! a single request is in flight at a time and responses are read in the
//! order they were written — no separate demultiplexing read-loop task.

use std::path::PathBuf;
use std::process::Stdio;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::stdio_json::{extract_result_text, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "copilot";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to start tool server '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("tool server child has no {0}")]
    MissingPipe(&'static str),
    #[error("failed to write to tool server stdin: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to read from tool server stdout: {0}")]
    Read(#[source] std::io::Error),
    #[error("tool server closed stdout unexpectedly (child exited)")]
    Eof,
    #[error("failed to encode JSON-RPC request: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode JSON-RPC response: {0} (raw: {raw})")]
    Decode {
        #[source]
        source: serde_json::Error,
        raw: String,
    },
    #[error("MCP error: {0}")]
    Mcp(String),
    #[error("tool server is not running")]
    NotRunning,
}

/// A tool advertised by the child via `tools/list`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

struct LiveProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl LiveProcess {
    fn alloc_id(&mut self) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        Value::Number(id.into())
    }

    async fn send(&mut self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let id = self.alloc_id();
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let mut line = serde_json::to_string(&req).map_err(RpcError::Encode)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(RpcError::Write)?;
        self.stdin.flush().await.map_err(RpcError::Write)?;

        // Skip notifications / stale ids until the matching response arrives.
        loop {
            let mut raw = String::new();
            let read = self
                .stdout
                .read_line(&mut raw)
                .await
                .map_err(RpcError::Read)?;
            if read == 0 {
                return Err(RpcError::Eof);
            }
            let trimmed = raw.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            let resp: JsonRpcResponse = serde_json::from_str(trimmed).map_err(|source| {
                RpcError::Decode {
                    source,
                    raw: trimmed.to_string(),
                }
            })?;
            if resp.is_notification() {
                continue;
            }
            if resp.id != id {
                continue;
            }
            return resp.into_result().map_err(RpcError::Mcp);
        }
    }

    async fn notify(&mut self, method: &str, params: Option<Value>) -> Result<(), RpcError> {
        let notif = JsonRpcNotification {
            jsonrpc: "2.0",
            method: method.to_string(),
            params,
        };
        let mut line = serde_json::to_string(&notif).map_err(RpcError::Encode)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(RpcError::Write)?;
        self.stdin.flush().await.map_err(RpcError::Write)
    }
}

/// Client to a single tool-server child, serializing calls behind one
/// mutex. `ListTools`/`CallTool` from `spec.md` §4.3.
pub struct ToolServerClient {
    command: PathBuf,
    args: Vec<String>,
    process: Mutex<Option<LiveProcess>>,
}

impl ToolServerClient {
    pub fn new(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            process: Mutex::new(None),
        }
    }

    /// Spawn the child and complete the `initialize` handshake, returning
    /// the tools discovered via `tools/list`.
    pub async fn start(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        let mut guard = self.process.lock().await;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| RpcError::Spawn {
                command: self.command.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(RpcError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(RpcError::MissingPipe("stdout"))?;

        let mut proc = LiveProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 0,
        };

        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        proc.send("initialize", Some(init_params)).await?;
        proc.notify("notifications/initialized", None).await?;

        let tools_result = proc.send("tools/list", None).await?;
        let tools: Vec<ToolDescriptor> = tools_result
            .get("tools")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        *guard = Some(proc);
        Ok(tools)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, RpcError> {
        let mut guard = self.process.lock().await;
        let proc = guard.as_mut().ok_or(RpcError::NotRunning)?;
        let result = proc.send("tools/list", None).await?;
        let tools: Vec<ToolDescriptor> = result
            .get("tools")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, args: Value) -> Result<String, RpcError> {
        let mut guard = self.process.lock().await;
        let proc = guard.as_mut().ok_or(RpcError::NotRunning)?;
        let params = serde_json::json!({ "name": name, "arguments": args });
        let result = proc.send("tools/call", Some(params)).await?;
        Ok(extract_result_text(&result))
    }

    /// True if the child has not been observed to exit. Does not reap.
    pub async fn is_running(&self) -> bool {
        let mut guard = self.process.lock().await;
        match guard.as_mut() {
            Some(proc) => matches!(proc.child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Drop the live process, closing stdin so the child observes EOF.
    pub async fn stop(&self) {
        let mut guard = self.process.lock().await;
        if let Some(mut proc) = guard.take() {
            let _ = proc.child.start_kill();
        }
    }
}
