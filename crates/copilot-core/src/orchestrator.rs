//! The dialogue orchestrator contract as seen by the core (`spec.md` §1,
//! `SPEC_FULL.md` §4.7): the thin surface the voice state machine calls
//! into and against which the permission gate enforces policy. The
//! concrete agent loop is an external collaborator — this crate only
//! defines the trait and a minimal test double.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator turn failed: {0}")]
    TurnFailed(String),
    #[error("orchestrator turn was cancelled")]
    Cancelled,
}

/// A single conversational turn: hand the orchestrator a transcript (or a
/// preview hint), receive the text to speak back. Tool calls the
/// orchestrator makes internally still traverse
/// [`crate::permission::PermissionGate::check`] — that enforcement lives
/// outside this trait, in whatever concrete orchestrator implements it.
#[async_trait]
pub trait DialogueOrchestrator: Send + Sync {
    async fn handle_turn(&self, input: &str) -> Result<String, OrchestratorError>;
}

/// A no-op orchestrator for tests and the CLI harness: not a real agent
/// loop, mirroring how the teacher's own multi-agent `agents::orchestrator`
/// is a distinct, out-of-scope concern this crate does not carry forward.
pub struct EchoOrchestrator;

#[async_trait]
impl DialogueOrchestrator for EchoOrchestrator {
    async fn handle_turn(&self, input: &str) -> Result<String, OrchestratorError> {
        Ok(format!("you said: {input}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_orchestrator_echoes_input() {
        let orchestrator = EchoOrchestrator;
        let response = orchestrator.handle_turn("hello").await.unwrap();
        assert_eq!(response, "you said: hello");
    }
}
