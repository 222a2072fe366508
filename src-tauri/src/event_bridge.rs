use std::sync::Arc;

use copilot_core::event_bus::{AppEvent, EventBus};
use tauri::{AppHandle, Emitter, async_runtime};
use tokio::sync::broadcast::error::RecvError;

/// Forwards UI-relevant [`AppEvent`]s from the core's [`EventBus`] to the
/// frontend via Tauri's built-in event system (`app_handle.emit`).
pub struct EventBridge {
    event_bus: Arc<dyn EventBus>,
    app_handle: AppHandle,
}

impl EventBridge {
    pub fn new(event_bus: Arc<dyn EventBus>, app_handle: AppHandle) -> Self {
        Self {
            event_bus,
            app_handle,
        }
    }

    /// Spawn a background task that listens for events and forwards them.
    ///
    /// The task exits cleanly when the broadcast channel is closed (i.e. the
    /// bus is dropped).
    pub fn start(self) {
        let mut receiver = self.event_bus.subscribe();
        let app_handle = self.app_handle;

        async_runtime::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if is_ui_relevant(&event) {
                            if let Err(e) = app_handle.emit("app-event", &event) {
                                log::warn!("event bridge: failed to emit event: {e}");
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("event bridge: lagged, missed {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

/// Returns true for events the frontend UI needs to react to. Internal-only
/// bookkeeping events (`PersistGroupAsAlways`, `SettingsChanged`) are handled
/// by the host shell itself and never reach the frontend through this path.
fn is_ui_relevant(event: &AppEvent) -> bool {
    matches!(
        event,
        AppEvent::PermissionPromptRequested { .. }
            | AppEvent::PermissionResolved { .. }
            | AppEvent::VoiceStateChanged { .. }
            | AppEvent::VoiceUserMessage { .. }
            | AppEvent::VoiceAgentMessage { .. }
            | AppEvent::VoiceFault { .. }
            | AppEvent::VoiceSessionComplete { .. }
            | AppEvent::SupervisorChildReady { .. }
            | AppEvent::SupervisorChildExited { .. }
            | AppEvent::SystemReady
            | AppEvent::SystemError { .. }
    )
}
