use std::sync::Arc;

use copilot_core::voice::VoiceSession;
use tauri::State;

use crate::host_audio::SharedCaptureSource;

/// The frontend streams microphone frames in through this command while a
/// capture is active (between `mic_down_command` and `mic_up_command`).
#[tauri::command]
pub async fn push_audio_chunk_command(
    capture: State<'_, SharedCaptureSource>,
    chunk: Vec<u8>,
) -> Result<(), String> {
    capture.push_chunk(chunk).await;
    Ok(())
}

/// Push-to-talk pressed: start capture and, if enabled, preview ASR.
#[tauri::command]
pub async fn mic_down_command(session: State<'_, Arc<VoiceSession>>) -> Result<(), String> {
    session.mic_down().await.map_err(|e| e.to_string())
}

/// Push-to-talk released: run the ASR -> agent turn -> TTS -> playback
/// pipeline. Cooperatively cancelled by a concurrent `shutup_command`.
#[tauri::command]
pub async fn mic_up_command(session: State<'_, Arc<VoiceSession>>) -> Result<(), String> {
    session.mic_up().await.map_err(|e| e.to_string())
}

/// Interrupt the in-flight turn and return to idle within the bounded
/// shutup deadline.
#[tauri::command]
pub async fn shutup_command(session: State<'_, Arc<VoiceSession>>) -> Result<(), String> {
    session.shutup().await.map_err(|e| e.to_string())
}

/// The session's current state, as a lowercase string matching
/// `VoiceStateChanged`'s `state` field.
#[tauri::command]
pub async fn voice_state_command(session: State<'_, Arc<VoiceSession>>) -> Result<String, String> {
    Ok(session.state().await.as_str().to_string())
}
