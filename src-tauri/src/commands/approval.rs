use std::sync::Arc;

use copilot_core::permission::{PermissionDecision, PermissionGate};
use tauri::State;

/// Called by the frontend approval overlay when the user responds to a
/// pending `PermissionPromptRequested` event.
///
/// `decision` is one of `"denied"`, `"allow_once"`, `"allow_session"`,
/// `"allow_always"`, matching [`PermissionDecision`]'s serde tag.
#[tauri::command]
pub async fn approve_action_command(
    request_id: String,
    decision: String,
    gate: State<'_, Arc<PermissionGate>>,
) -> Result<(), String> {
    let decision: PermissionDecision =
        serde_json::from_value(serde_json::Value::String(decision))
            .map_err(|e| format!("unrecognized permission decision: {e}"))?;
    gate.resolve(&request_id, decision).await;
    Ok(())
}
