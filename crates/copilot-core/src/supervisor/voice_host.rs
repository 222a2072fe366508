//! Voice-host readiness protocol (`spec.md` §4.2): stale-session reaping,
//! preferred-port probing, bounded port-range search, ephemeral-port
//! fallback, and settings hot-swap teardown.
//!
//! Grounded in the teacher's `SidecarService::start`/`wait_for_health`
//! polling loop, generalized from a single fixed port to the bounded
//! candidate-range search `spec.md` §4.2 describes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

use crate::audit::{Actor, AuditLog, AuditResult, DetailValue};
use crate::config::VoiceHostConfig;
use crate::event_bus::{AppEvent, EventBus};

use super::errors::SupervisorError;
use super::handle::{is_pid_alive, kill_pid_tree, process_matches_command, SessionState, SubprocessHandle};

const SUBSYSTEM: &str = "voice_host";
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const MIN_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceHostHealth {
    pub status: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(rename = "asrReady", default)]
    pub asr_ready: bool,
    #[serde(rename = "ttsReady", default)]
    pub tts_ready: bool,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl VoiceHostHealth {
    pub fn is_ready(&self) -> bool {
        self.status == "ok" && self.ready
    }
}

pub struct VoiceHostSupervisor {
    handle: SubprocessHandle,
    http: reqwest::Client,
    base_url: RwLock<Option<String>>,
    reaped_once: AtomicBool,
    bus: Arc<dyn EventBus>,
    audit: Arc<AuditLog>,
}

impl VoiceHostSupervisor {
    pub fn new(session_path: impl Into<PathBuf>, bus: Arc<dyn EventBus>, audit: Arc<AuditLog>) -> Self {
        Self {
            handle: SubprocessHandle::new(session_path),
            http: reqwest::Client::builder()
                .timeout(HEALTH_PROBE_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: RwLock::new(None),
            reaped_once: AtomicBool::new(false),
            bus,
            audit,
        }
    }

    pub async fn current_base_url(&self) -> Option<String> {
        self.base_url.read().await.clone()
    }

    /// The full readiness protocol of `spec.md` §4.2. Returns `None` when
    /// the voice host is disabled by config.
    pub async fn ensure_ready(
        &self,
        config: &VoiceHostConfig,
    ) -> Result<Option<String>, SupervisorError> {
        if !config.enabled {
            return Ok(None);
        }
        validate_loopback_host(&config.base_host)?;

        if let Some(base) = self.base_url.read().await.clone() {
            if self.probe_health(&base).await.map(|h| h.is_ready()).unwrap_or(false) {
                return Ok(Some(base));
            }
        }

        self.reap_stale_session(&config.command).await?;

        let preferred_url = format!("http://{}:{}", config.base_host, config.preferred_port);
        if let Ok(health) = self.probe_health(&preferred_url).await {
            if health.is_ready() {
                *self.base_url.write().await = Some(preferred_url.clone());
                return Ok(Some(preferred_url));
            }
        }

        let deadline = tokio::time::Instant::now()
            + Duration::from_secs(config.startup_timeout_secs).max(MIN_STARTUP_TIMEOUT);

        for port in config.preferred_port..config.preferred_port.saturating_add(config.port_range_size) {
            let url = format!("http://{}:{port}", config.base_host);
            if let Ok(health) = self.probe_health(&url).await {
                if health.is_ready() {
                    *self.base_url.write().await = Some(url.clone());
                    return Ok(Some(url));
                }
            }
            if self.handle.is_alive().await {
                continue;
            }
            if let Ok(url) = self.spawn_and_await_ready(config, port, deadline).await {
                return Ok(Some(url));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SupervisorError::VoicehostStartupTimeout {
                    timeout_secs: config.startup_timeout_secs,
                });
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(SupervisorError::VoicehostPortUnavailable {
                start: config.preferred_port,
                end: config.preferred_port.saturating_add(config.port_range_size),
            });
        }

        let ephemeral_port = bind_ephemeral_port().await?;
        let url = self
            .spawn_and_await_ready(config, ephemeral_port, deadline)
            .await?;
        Ok(Some(url))
    }

    async fn probe_health(&self, base_url: &str) -> Result<VoiceHostHealth, SupervisorError> {
        let resp = self
            .http
            .get(format!("{base_url}/health"))
            .send()
            .await
            .map_err(|e| SupervisorError::VoicehostUnreachable(e.to_string()))?;
        resp.json::<VoiceHostHealth>()
            .await
            .map_err(|e| SupervisorError::VoicehostUnreachable(e.to_string()))
    }

    async fn spawn_and_await_ready(
        &self,
        config: &VoiceHostConfig,
        port: u16,
        deadline: tokio::time::Instant,
    ) -> Result<String, SupervisorError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .env("PORT", port.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|_| SupervisorError::VoicehostMissing(PathBuf::from(&config.command)))?;
        let pid = child.id();

        let base_url = format!("http://{}:{port}", config.base_host);
        loop {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(SupervisorError::VoicehostProcessExited {
                    exit_code: status.code(),
                });
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = child.start_kill();
                return Err(SupervisorError::VoicehostStartupTimeout {
                    timeout_secs: config.startup_timeout_secs,
                });
            }
            if let Ok(health) = self.probe_health(&base_url).await {
                if health.is_ready() {
                    break;
                }
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        self.handle.set_child(child).await;
        *self.base_url.write().await = Some(base_url.clone());

        let state = SessionState {
            base_url: base_url.clone(),
            port,
            pid: pid.unwrap_or(0),
            updated_at_utc: chrono::Utc::now(),
        };
        state.write(&self.handle.session_path).await?;

        let mut details = HashMap::new();
        details.insert("port".to_string(), DetailValue::from(port as u64));
        self.audit
            .log_cold(
                Actor::System,
                "SUPERVISOR_CHILD_READY",
                Some(SUBSYSTEM),
                AuditResult::Ok,
                details,
            )
            .await;
        self.bus.publish(AppEvent::SupervisorChildReady {
            subsystem: SUBSYSTEM.to_string(),
            base_url: Some(base_url.clone()),
        });

        Ok(base_url)
    }

    /// Reap a stale voice-host process left over from a crashed prior run.
    /// Runs at most once per supervisor lifetime. The recorded PID is only
    /// killed if it is both alive and still names the voice-host
    /// executable — a recycled PID must never be killed on the strength of
    /// a stale JSON file alone.
    async fn reap_stale_session(&self, expected_command: &str) -> Result<(), SupervisorError> {
        if self.reaped_once.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(state) = SessionState::read(&self.handle.session_path).await? else {
            return Ok(());
        };
        if self.handle.is_alive().await {
            // This runtime already owns a live child; never reap our own.
            return Ok(());
        }
        if is_pid_alive(state.pid) && process_matches_command(state.pid, expected_command) {
            kill_pid_tree(state.pid).await;
        }
        SessionState::delete(&self.handle.session_path).await?;
        Ok(())
    }

    /// Tear down the managed child on a settings change that invalidates
    /// it (engine/model swap). The next `ensure_ready` respawns fresh.
    pub async fn teardown(&self) {
        self.handle.stop().await;
        *self.base_url.write().await = None;
    }
}

/// `spec.md` §4.2 failure taxonomy `invalid_voicehost_base`: the voice host
/// is only ever spawned/probed on loopback, so a configured host of
/// anything else is rejected before any spawn/probe attempt.
fn validate_loopback_host(host: &str) -> Result<(), SupervisorError> {
    match host {
        "127.0.0.1" | "localhost" => Ok(()),
        other => Err(SupervisorError::InvalidVoicehostBase(other.to_string())),
    }
}

async fn bind_ephemeral_port() -> Result<u16, SupervisorError> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(SupervisorError::EphemeralPortBind)?;
    let port = listener
        .local_addr()
        .map_err(SupervisorError::EphemeralPortBind)?
        .port();
    drop(listener);
    Ok(port)
}
