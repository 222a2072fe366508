use std::sync::Arc;

use copilot_core::config::{AppSettings, ConfigHandle};
use tauri::State;

/// Get the current application settings snapshot.
#[tauri::command]
pub fn get_app_settings(config: State<'_, Arc<ConfigHandle>>) -> AppSettings {
    (*config.current()).clone()
}

/// Replace the application settings wholesale, persisting to disk and
/// notifying every subscriber of the new snapshot.
#[tauri::command]
pub async fn update_app_settings(
    config: State<'_, Arc<ConfigHandle>>,
    settings: AppSettings,
) -> Result<(), String> {
    config.replace(settings).await.map_err(|e| e.to_string())
}
