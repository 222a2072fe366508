//! Voice session state machine (`spec.md` §4.4): mic capture through ASR,
//! the agent turn, TTS, and playback, with a background preview-ASR loop
//! and exactly-once UI message emission.

mod errors;
mod host_client;
mod preview;
mod state_machine;
mod timeline;

pub use errors::VoiceError;
pub use host_client::{TtsRequest, VoiceHostClient, VoiceHostSpeechClient};
pub use preview::{merge_preview, PreviewAsrHandle, PREVIEW_CADENCE, PREVIEW_INITIAL_DELAY};
pub use state_machine::{CaptureSource, PlaybackSink, SpeechClient, VoiceSession, VoiceState};
pub use timeline::VoiceSessionTimeline;
