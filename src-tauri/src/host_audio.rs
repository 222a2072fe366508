//! Thin IPC-backed `CaptureSource`/`PlaybackSink` implementations.
//!
//! Per the thin-host role (`spec.md` §1): actual microphone/speaker device
//! access belongs to the frontend (Web Audio API), not this crate. These
//! types only buffer bytes the frontend pushes in via
//! [`crate::commands::voice::push_audio_chunk_command`] and forward
//! synthesized audio back out as a Tauri event for the frontend to play.

use std::sync::Arc;

use async_trait::async_trait;
use copilot_core::voice::{CaptureSource, PlaybackSink, VoiceError};
use tauri::{AppHandle, Emitter};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct IpcCaptureSource {
    buffer: Mutex<Vec<u8>>,
}

impl IpcCaptureSource {
    /// Called by `push_audio_chunk_command` as the frontend streams mic
    /// frames in.
    pub async fn push_chunk(&self, chunk: Vec<u8>) {
        self.buffer.lock().await.extend_from_slice(&chunk);
    }
}

#[async_trait]
impl CaptureSource for IpcCaptureSource {
    async fn start(&self) -> Result<(), VoiceError> {
        self.buffer.lock().await.clear();
        Ok(())
    }

    async fn stop(&self) -> Result<Vec<u8>, VoiceError> {
        Ok(std::mem::take(&mut *self.buffer.lock().await))
    }

    async fn snapshot(&self) -> Vec<u8> {
        self.buffer.lock().await.clone()
    }
}

pub struct IpcPlaybackSink {
    app: AppHandle,
}

impl IpcPlaybackSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

#[async_trait]
impl PlaybackSink for IpcPlaybackSink {
    async fn play(&self, audio: Vec<u8>) -> Result<(), VoiceError> {
        self.app
            .emit("voice-playback-audio", audio)
            .map_err(|e| VoiceError::PlaybackFailed(e.to_string()))
    }

    async fn stop(&self) {
        let _ = self.app.emit("voice-playback-stop", ());
    }
}

pub type SharedCaptureSource = Arc<IpcCaptureSource>;
