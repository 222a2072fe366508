//! Supervisor failure taxonomy (`spec.md` §4.2).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("voice host base url '{0}' is invalid (must be loopback http)")]
    InvalidVoicehostBase(String),

    #[error("voice host executable not found at '{0}'")]
    VoicehostMissing(PathBuf),

    #[error("no port in the candidate range {start}-{end} was available")]
    VoicehostPortUnavailable { start: u16, end: u16 },

    #[error("voice host did not become ready within {timeout_secs}s")]
    VoicehostStartupTimeout { timeout_secs: u64 },

    #[error("voice host is reachable but still warming up")]
    VoicehostWarmingUp,

    #[error("voice host process exited during startup (code: {exit_code:?})")]
    VoicehostProcessExited { exit_code: Option<i32> },

    #[error("voice host health probe reported unhealthy: {reason}")]
    VoicehostUnhealthy { reason: String },

    #[error("voice host is unreachable: {0}")]
    VoicehostUnreachable(String),

    #[error("tool server executable not found at '{0}'")]
    ToolServerMissing(PathBuf),

    #[error("tool server process exited unexpectedly: {0}")]
    ToolServerExited(String),

    #[error("failed to read or write session state file at {path}: {source}")]
    SessionState {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind an ephemeral loopback port: {0}")]
    EphemeralPortBind(#[source] std::io::Error),
}
