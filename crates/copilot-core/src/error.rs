//! Top-level error type for `copilot-core`.
//!
//! Each subsystem owns a closed `thiserror` taxonomy of its own
//! (`permission::GateError`, `supervisor::SupervisorError`, `rpc::RpcError`,
//! `voice::VoiceError`, `config::ConfigError`, `audit::AuditError`); this
//! type only exists at the crate boundary for callers that want one
//! `Result` to match on across subsystems.

use thiserror::Error;

use crate::audit::AuditError;
use crate::config::ConfigError;
use crate::permission::GateError;
use crate::rpc::RpcError;
use crate::supervisor::SupervisorError;
use crate::voice::VoiceError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Voice(#[from] VoiceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}
