//! The voice session state machine (`spec.md` §4.4/§8): `Idle ->
//! Listening -> Transcribing -> Thinking -> Speaking -> Idle`, plus
//! `Faulted` reachable from any state and `Shutup` cancellation from any
//! non-idle state.
//!
//! Capture, playback and speech (ASR/TTS) are external collaborators
//! (`spec.md` §1 Non-goals) expressed here as small capability traits,
//! mirroring how [`crate::orchestrator::DialogueOrchestrator`] stays a thin
//! contract rather than an owned implementation. Grounded in the teacher's
//! `SidecarService` polling/cancellation idiom (already reused in
//! [`crate::supervisor::VoiceHostSupervisor`]) and in the audio-session
//! bookkeeping style of the pack's `audio_manager.rs` reference file.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::audit::{Actor, AuditLog, AuditResult, DetailValue};
use crate::event_bus::{AppEvent, EventBus};
use crate::orchestrator::DialogueOrchestrator;

use super::errors::VoiceError;
use super::preview::{self, PreviewAsrHandle};
use super::timeline::VoiceSessionTimeline;

/// Cancel playback and stop the preview loop within this deadline on
/// `Shutup` (`spec.md` §8 scenario S6).
const SHUTUP_DEADLINE: Duration = Duration::from_millis(500);
/// How long a clean `MicUp` waits for the final preview snapshot before
/// falling back to whatever has accumulated so far.
const PREVIEW_DRAIN_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
    Transcribing,
    Thinking,
    Speaking,
    Faulted,
}

impl VoiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Faulted => "faulted",
        }
    }
}

/// Microphone capture, owned by the host shell.
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn start(&self) -> Result<(), VoiceError>;
    /// Stop capture, returning the recorded audio (WAV-framed).
    async fn stop(&self) -> Result<Vec<u8>, VoiceError>;
    /// A non-destructive snapshot of the buffer so far, for preview ASR.
    async fn snapshot(&self) -> Vec<u8>;
}

/// Audio playback, owned by the host shell.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    async fn play(&self, audio: Vec<u8>) -> Result<(), VoiceError>;
    /// Interrupt whatever is currently playing. Never fails: there is
    /// nothing a caller can usefully do with a failed stop.
    async fn stop(&self);
}

/// The voice host's ASR/TTS surface, with engine selection baked in by
/// whatever implements it (see [`crate::voice::host_client`]).
#[async_trait]
pub trait SpeechClient: Send + Sync {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        session_id: &str,
        preview: bool,
    ) -> Result<String, VoiceError>;
    async fn synthesize(&self, text: &str, session_id: &str) -> Result<Vec<u8>, VoiceError>;
}

struct Inner {
    state: VoiceState,
    session_id: String,
    timeline: VoiceSessionTimeline,
    cancel_tx: Option<oneshot::Sender<()>>,
    cancel_rx: Option<oneshot::Receiver<()>>,
    preview: Option<PreviewAsrHandle>,
}

/// A single voice session, reused across turns. `MicDown` from `Idle` or
/// `Faulted` starts a fresh timeline and a fresh cancellation channel.
pub struct VoiceSession {
    bus: Arc<dyn EventBus>,
    audit: Arc<AuditLog>,
    capture: Arc<dyn CaptureSource>,
    playback: Arc<dyn PlaybackSink>,
    speech: Arc<dyn SpeechClient>,
    orchestrator: Arc<dyn DialogueOrchestrator>,
    preview_enabled: bool,
    inner: Mutex<Inner>,
}

impl VoiceSession {
    pub fn new(
        bus: Arc<dyn EventBus>,
        audit: Arc<AuditLog>,
        capture: Arc<dyn CaptureSource>,
        playback: Arc<dyn PlaybackSink>,
        speech: Arc<dyn SpeechClient>,
        orchestrator: Arc<dyn DialogueOrchestrator>,
        preview_enabled: bool,
    ) -> Self {
        Self {
            bus,
            audit,
            capture,
            playback,
            speech,
            orchestrator,
            preview_enabled,
            inner: Mutex::new(Inner {
                state: VoiceState::Idle,
                session_id: String::new(),
                timeline: VoiceSessionTimeline::new(""),
                cancel_tx: None,
                cancel_rx: None,
                preview: None,
            }),
        }
    }

    pub async fn state(&self) -> VoiceState {
        self.inner.lock().await.state
    }

    pub async fn session_id(&self) -> String {
        self.inner.lock().await.session_id.clone()
    }

    /// `spec.md` §4.4 `MicDown`: starts capture and, if enabled, a
    /// background preview-ASR loop.
    pub async fn mic_down(&self) -> Result<(), VoiceError> {
        let session_id = Uuid::new_v4().to_string();
        {
            let mut inner = self.inner.lock().await;
            if !matches!(inner.state, VoiceState::Idle | VoiceState::Faulted) {
                return Err(VoiceError::InvalidTransition {
                    state: inner.state.as_str().to_string(),
                    event: "MicDown".to_string(),
                });
            }
            let (tx, rx) = oneshot::channel();
            inner.timeline = VoiceSessionTimeline::new(session_id.clone());
            inner.session_id = session_id.clone();
            inner.cancel_tx = Some(tx);
            inner.cancel_rx = Some(rx);
            inner.state = VoiceState::Listening;
        }

        self.capture.start().await?;
        {
            let mut inner = self.inner.lock().await;
            inner.timeline.mark_first_audio_frame();
        }
        self.emit_state(VoiceState::Listening, &session_id);

        if self.preview_enabled {
            let speech = self.speech.clone();
            let capture = self.capture.clone();
            let preview_session = format!("preview-{session_id}");
            let handle = preview::spawn(move || {
                let speech = speech.clone();
                let capture = capture.clone();
                let preview_session = preview_session.clone();
                async move {
                    let snapshot = capture.snapshot().await;
                    if snapshot.is_empty() {
                        return None;
                    }
                    speech
                        .transcribe(snapshot, &preview_session, true)
                        .await
                        .ok()
                }
            });
            self.inner.lock().await.preview = Some(handle);
        }

        Ok(())
    }

    /// `spec.md` §4.4 `MicUp`: the full ASR -> agent turn -> TTS ->
    /// playback pipeline, cooperatively cancellable at every suspension
    /// point by a concurrent [`Self::shutup`] call.
    pub async fn mic_up(&self) -> Result<(), VoiceError> {
        let (session_id, mut cancel_rx) = {
            let mut inner = self.inner.lock().await;
            if inner.state != VoiceState::Listening {
                return Err(VoiceError::InvalidTransition {
                    state: inner.state.as_str().to_string(),
                    event: "MicUp".to_string(),
                });
            }
            let rx = inner.cancel_rx.take().ok_or_else(|| VoiceError::InvalidTransition {
                state: "listening".to_string(),
                event: "MicUp".to_string(),
            })?;
            (inner.session_id.clone(), rx)
        };

        let audio = self.capture.stop().await?;
        {
            let mut inner = self.inner.lock().await;
            inner.timeline.mark_mic_released();
        }

        let preview_hint = if self.preview_enabled {
            let taken = self.inner.lock().await.preview.take();
            if let Some(mut preview) = taken {
                Some(preview.stop_and_drain(PREVIEW_DRAIN_TIMEOUT).await)
            } else {
                None
            }
        } else {
            None
        };
        if let Some(hint) = preview_hint {
            log::debug!("session {session_id}: final preview hint '{hint}' discarded in favor of the authoritative transcript");
        }

        if cancel_rx.try_recv().is_ok() {
            return self.finish_cancelled().await;
        }

        self.set_state(VoiceState::Transcribing, &session_id).await;
        self.inner.lock().await.timeline.mark_asr_started();
        let transcript = tokio::select! {
            _ = &mut cancel_rx => return self.finish_cancelled().await,
            res = self.speech.transcribe(audio, &session_id, false) => res?,
        };
        {
            let mut inner = self.inner.lock().await;
            inner.timeline.mark_transcript_ready();
            if inner.timeline.try_claim_user_message() {
                let _ = self.bus.publish(AppEvent::VoiceUserMessage {
                    session_id: session_id.clone(),
                    text: transcript.clone(),
                });
            }
        }

        self.set_state(VoiceState::Thinking, &session_id).await;
        self.inner.lock().await.timeline.mark_agent_started();
        let reply = tokio::select! {
            _ = &mut cancel_rx => return self.finish_cancelled().await,
            res = self.orchestrator.handle_turn(&transcript) => {
                res.map_err(|e| VoiceError::AgentFailed(e.to_string()))?
            }
        };
        {
            let mut inner = self.inner.lock().await;
            inner.timeline.mark_agent_ready();
            if inner.timeline.try_claim_agent_message() {
                let _ = self.bus.publish(AppEvent::VoiceAgentMessage {
                    session_id: session_id.clone(),
                    text: reply.clone(),
                });
            }
        }

        self.set_state(VoiceState::Speaking, &session_id).await;
        self.inner.lock().await.timeline.mark_tts_started();
        let audio_out = tokio::select! {
            _ = &mut cancel_rx => return self.finish_cancelled().await,
            res = self.speech.synthesize(&reply, &session_id) => res?,
        };
        self.inner.lock().await.timeline.mark_speaking_started();
        tokio::select! {
            _ = &mut cancel_rx => return self.finish_cancelled().await,
            res = self.playback.play(audio_out) => res?,
        }

        let completion = {
            let mut inner = self.inner.lock().await;
            inner
                .timeline
                .try_claim_completion()
                .then(|| inner.timeline.durations_ms(chrono::Utc::now()))
        };
        if let Some((total_ms, roundtrip_ms)) = completion {
            let _ = self.bus.publish(AppEvent::VoiceSessionComplete {
                session_id: session_id.clone(),
                total_ms,
                roundtrip_ms,
            });
        }
        self.set_state(VoiceState::Idle, &session_id).await;
        Ok(())
    }

    /// `spec.md` §8 scenario S6: cancel the in-flight turn, stop the
    /// preview loop and playback without waiting for either, and return to
    /// `Idle`. A no-op from `Idle`/`Faulted`.
    pub async fn shutup(&self) -> Result<(), VoiceError> {
        let (session_id, cancel_tx, mut preview) = {
            let mut inner = self.inner.lock().await;
            if matches!(inner.state, VoiceState::Idle | VoiceState::Faulted) {
                return Ok(());
            }
            let session_id = inner.session_id.clone();
            let cancel_tx = inner.cancel_tx.take();
            let preview = inner.preview.take();
            (session_id, cancel_tx, preview)
        };

        if let Some(tx) = cancel_tx {
            let _ = tx.send(());
        }
        if let Some(preview) = preview.as_mut() {
            preview.stop_immediately();
        }
        let _ = tokio::time::timeout(SHUTUP_DEADLINE, self.playback.stop()).await;

        {
            let mut inner = self.inner.lock().await;
            inner.state = VoiceState::Idle;
        }
        self.audit
            .log_cold(
                Actor::Voice,
                "VOICE_SHUTUP",
                Some(&session_id),
                AuditResult::Ok,
                HashMap::new(),
            )
            .await;
        self.emit_state(VoiceState::Idle, &session_id);
        Ok(())
    }

    /// `spec.md` §4.4: `Fault` is reachable from any state and ends the
    /// session without further UI messages.
    pub async fn fault(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let (session_id, mut preview) = {
            let mut inner = self.inner.lock().await;
            inner.state = VoiceState::Faulted;
            inner.cancel_tx = None;
            inner.cancel_rx = None;
            (inner.session_id.clone(), inner.preview.take())
        };
        if let Some(preview) = preview.as_mut() {
            preview.stop_immediately();
        }
        self.playback.stop().await;

        let mut details = HashMap::new();
        details.insert("reason".to_string(), DetailValue::from(reason.clone()));
        self.audit
            .log_cold(
                Actor::Voice,
                "VOICE_FAULT",
                Some(&session_id),
                AuditResult::Error(reason.clone()),
                details,
            )
            .await;
        let _ = self.bus.publish(AppEvent::VoiceFault { session_id, reason });
    }

    /// A cancellation was observed mid-turn; the session is already
    /// `Idle` (set by a concurrent [`Self::shutup`]) and no further UI
    /// message may be emitted for this turn.
    async fn finish_cancelled(&self) -> Result<(), VoiceError> {
        Ok(())
    }

    async fn set_state(&self, state: VoiceState, session_id: &str) {
        self.inner.lock().await.state = state;
        self.emit_state(state, session_id);
    }

    fn emit_state(&self, state: VoiceState, session_id: &str) {
        let _ = self.bus.publish(AppEvent::VoiceStateChanged {
            session_id: session_id.to_string(),
            state: state.as_str().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::TokioBroadcastBus;
    use crate::orchestrator::EchoOrchestrator;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct MockCapture;
    #[async_trait]
    impl CaptureSource for MockCapture {
        async fn start(&self) -> Result<(), VoiceError> {
            Ok(())
        }
        async fn stop(&self) -> Result<Vec<u8>, VoiceError> {
            Ok(vec![1, 2, 3])
        }
        async fn snapshot(&self) -> Vec<u8> {
            Vec::new()
        }
    }

    struct MockPlayback {
        delay: Duration,
        stopped: Arc<AtomicBool>,
    }
    #[async_trait]
    impl PlaybackSink for MockPlayback {
        async fn play(&self, _audio: Vec<u8>) -> Result<(), VoiceError> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct MockSpeech;
    #[async_trait]
    impl SpeechClient for MockSpeech {
        async fn transcribe(
            &self,
            _audio: Vec<u8>,
            _session_id: &str,
            _preview: bool,
        ) -> Result<String, VoiceError> {
            Ok("hello there".to_string())
        }
        async fn synthesize(&self, _text: &str, _session_id: &str) -> Result<Vec<u8>, VoiceError> {
            Ok(vec![9, 9, 9])
        }
    }

    async fn make_session(playback_delay: Duration) -> (VoiceSession, Arc<AtomicBool>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::start(tmp.path().join("audit.log")).await.unwrap());
        let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let session = VoiceSession::new(
            bus,
            audit,
            Arc::new(MockCapture),
            Arc::new(MockPlayback {
                delay: playback_delay,
                stopped: stopped.clone(),
            }),
            Arc::new(MockSpeech),
            Arc::new(EchoOrchestrator),
            false,
        );
        (session, stopped, tmp)
    }

    #[tokio::test]
    async fn full_roundtrip_emits_messages_and_completes_idle() {
        let (session, _stopped, _tmp) = make_session(Duration::from_millis(0)).await;
        let mut rx = session.bus.subscribe();

        session.mic_down().await.unwrap();
        session.mic_up().await.unwrap();

        assert_eq!(session.state().await, VoiceState::Idle);

        let mut saw_user = false;
        let mut saw_agent = false;
        let mut completions = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                AppEvent::VoiceUserMessage { text, .. } => {
                    assert_eq!(text, "hello there");
                    saw_user = true;
                }
                AppEvent::VoiceAgentMessage { text, .. } => {
                    assert!(text.contains("hello there"));
                    saw_agent = true;
                }
                AppEvent::VoiceSessionComplete { .. } => completions += 1,
                _ => {}
            }
        }
        assert!(saw_user && saw_agent);
        assert_eq!(completions, 1);
    }

    #[tokio::test]
    async fn mic_up_from_idle_is_invalid_transition() {
        let (session, _stopped, _tmp) = make_session(Duration::from_millis(0)).await;
        let err = session.mic_up().await.unwrap_err();
        assert!(matches!(err, VoiceError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn shutup_mid_speaking_cancels_and_returns_to_idle() {
        let (session, stopped, _tmp) = make_session(Duration::from_secs(2)).await;
        let session = Arc::new(session);

        session.mic_down().await.unwrap();
        let turn = {
            let session = session.clone();
            tokio::spawn(async move { session.mic_up().await })
        };

        tokio::time::sleep(Duration::from_millis(150)).await;
        session.shutup().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), turn)
            .await
            .expect("mic_up task should finish promptly after shutup")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(session.state().await, VoiceState::Idle);
        assert!(stopped.load(Ordering::SeqCst));

        let events = session.audit.last_n(10).await.unwrap();
        assert!(events.iter().any(|e| e.action == "VOICE_SHUTUP"));
    }

    #[tokio::test]
    async fn fault_is_reachable_from_listening_and_audited() {
        let (session, _stopped, _tmp) = make_session(Duration::from_millis(0)).await;
        session.mic_down().await.unwrap();
        session.fault("asr engine crashed").await;
        assert_eq!(session.state().await, VoiceState::Faulted);
        let events = session.audit.last_n(10).await.unwrap();
        assert!(events.iter().any(|e| e.action == "VOICE_FAULT"));
    }

    #[tokio::test]
    async fn mic_down_from_faulted_starts_a_fresh_session() {
        let (session, _stopped, _tmp) = make_session(Duration::from_millis(0)).await;
        session.mic_down().await.unwrap();
        session.fault("boom").await;
        let first_id = session.session_id().await;

        session.mic_down().await.unwrap();
        let second_id = session.session_id().await;
        assert_ne!(first_id, second_id);
        assert_eq!(session.state().await, VoiceState::Listening);
    }
}
