//! Lifecycle supervision for the tool-server child (`spec.md` §4.2).
//!
//! The tool server has no port negotiation — it talks stdio JSON-RPC, not
//! HTTP — so its supervisor is a thin restart-once wrapper around
//! [`ToolServerClient`]. The restart-on-EOF behavior is new relative to the
//! teacher's `SidecarService` (which never auto-restarts); it is grounded
//! in the `McpClient` doc comment naming "restart on failure" as the
//! intended behavior for MCP-shaped children.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::audit::{Actor, AuditLog, AuditResult, DetailValue};
use crate::event_bus::{AppEvent, EventBus};
use crate::rpc::{RpcError, ToolDescriptor, ToolServerClient};

use super::errors::SupervisorError;

const SUBSYSTEM: &str = "tool_server";

pub struct ToolServerSupervisor {
    command: PathBuf,
    args: Vec<String>,
    client: RwLock<Arc<ToolServerClient>>,
    restarted_once: AtomicBool,
    bus: Arc<dyn EventBus>,
    audit: Arc<AuditLog>,
}

impl ToolServerSupervisor {
    pub fn new(
        command: impl Into<PathBuf>,
        args: Vec<String>,
        bus: Arc<dyn EventBus>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let command = command.into();
        let client = Arc::new(ToolServerClient::new(command.clone(), args.clone()));
        Self {
            command,
            args,
            client: RwLock::new(client),
            restarted_once: AtomicBool::new(false),
            bus,
            audit,
        }
    }

    /// Start the child and return the tools it advertises.
    pub async fn start(&self) -> Result<Vec<ToolDescriptor>, SupervisorError> {
        let client = self.client.read().await.clone();
        match client.start().await {
            Ok(tools) => {
                self.bus.publish(AppEvent::SupervisorChildReady {
                    subsystem: SUBSYSTEM.to_string(),
                    base_url: None,
                });
                Ok(tools)
            }
            Err(RpcError::Spawn { .. } | RpcError::MissingPipe(_)) => {
                Err(SupervisorError::ToolServerMissing(self.command.clone()))
            }
            Err(other) => Err(SupervisorError::ToolServerExited(other.to_string())),
        }
    }

    /// Forward a `tools/call`, transparently restarting the child once if
    /// the read loop observed EOF (child crash). A second EOF within the
    /// same supervisor lifetime is surfaced as a fatal error — the
    /// taxonomy only promises one restart attempt.
    pub async fn call_tool(&self, name: &str, args: serde_json::Value) -> Result<String, SupervisorError> {
        let client = self.client.read().await.clone();
        match client.call_tool(name, args.clone()).await {
            Ok(text) => Ok(text),
            Err(RpcError::Eof) if !self.restarted_once.swap(true, Ordering::SeqCst) => {
                self.handle_crash_and_restart().await?;
                let client = self.client.read().await.clone();
                client
                    .call_tool(name, args)
                    .await
                    .map_err(|e| SupervisorError::ToolServerExited(e.to_string()))
            }
            Err(other) => Err(SupervisorError::ToolServerExited(other.to_string())),
        }
    }

    async fn handle_crash_and_restart(&self) -> Result<(), SupervisorError> {
        let mut details = HashMap::new();
        details.insert(
            "subsystem".to_string(),
            DetailValue::from(SUBSYSTEM.to_string()),
        );
        self.audit
            .log_cold(
                Actor::System,
                "SUPERVISOR_CHILD_RESTARTED",
                Some(SUBSYSTEM),
                AuditResult::Ok,
                details,
            )
            .await;
        self.bus.publish(AppEvent::SupervisorChildExited {
            subsystem: SUBSYSTEM.to_string(),
            reason: "read-loop EOF".to_string(),
        });

        let fresh = Arc::new(ToolServerClient::new(self.command.clone(), self.args.clone()));
        fresh
            .start()
            .await
            .map_err(|e| SupervisorError::ToolServerExited(e.to_string()))?;
        *self.client.write().await = fresh;
        self.bus.publish(AppEvent::SupervisorChildReady {
            subsystem: SUBSYSTEM.to_string(),
            base_url: None,
        });
        Ok(())
    }

    pub async fn stop(&self) {
        self.client.read().await.stop().await;
    }
}
