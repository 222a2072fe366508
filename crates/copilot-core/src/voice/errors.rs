//! Voice pipeline failure taxonomy (`spec.md` §4.4/§5/§7).

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum VoiceError {
    #[error("voice host url is invalid: {0}")]
    InvalidHostUrl(String),
    #[error("voice host transport error: {0}")]
    Transport(String),
    #[error("microphone capture timed out")]
    CaptureTimeout,
    #[error("microphone capture failed: {0}")]
    CaptureFailed(String),
    #[error("speech recognition timed out")]
    AsrTimeout,
    #[error("speech recognition failed: {0}")]
    AsrFailed(String),
    #[error("agent turn timed out")]
    AgentTimeout,
    #[error("agent turn failed: {0}")]
    AgentFailed(String),
    #[error("speech synthesis timed out")]
    TtsTimeout,
    #[error("speech synthesis failed: {0}")]
    TtsFailed(String),
    #[error("playback failed: {0}")]
    PlaybackFailed(String),
    #[error("event '{event}' is not valid from state '{state}'")]
    InvalidTransition { state: String, event: String },
}
