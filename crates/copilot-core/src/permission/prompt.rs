//! The permission prompt interface seen by the gate.
//!
//! The gate itself never holds a `Arc<dyn PermissionPrompter>` field — per
//! `spec.md` §9's "no dynamic dispatch through deep hierarchies" note, it
//! only ever publishes a [`crate::event_bus::AppEvent::PermissionPromptRequested`]
//! and awaits a `oneshot` channel. `PermissionPrompter` is provided as the
//! small capability interface a host layer (the CLI harness, a Tauri
//! command handler) implements to answer that event.

use serde::{Deserialize, Serialize};

use super::groups::ToolGroup;

/// What the user (or an automated host) decided for a single pending
/// `Check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Denied,
    AllowOnce,
    AllowSession,
    AllowAlways,
}

/// A request for the user to approve or deny one tool call, with its
/// argument summary already redacted (`spec.md` §4.1/§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub request_id: String,
    pub tool_name: String,
    pub group: ToolGroup,
    /// Truncated, key-filtered argument summary. Never contains raw
    /// free-text arguments, paths, or URLs beyond host and short path.
    pub purpose: String,
}

/// Build a redacted purpose string from a tool name and its raw JSON
/// arguments: truncated, and filtered by key name so secrets and bulk
/// free text never reach the prompt UI.
pub fn build_purpose(tool_name: &str, args: &serde_json::Value) -> String {
    const MAX_SUMMARY_LEN: usize = 120;
    const REDACTED_KEYS: &[&str] = &[
        "password", "token", "secret", "key", "authorization", "cookie",
    ];

    let summary = match args {
        serde_json::Value::Object(map) => {
            let mut parts = Vec::new();
            for (k, v) in map {
                let lower = k.to_lowercase();
                if REDACTED_KEYS.iter().any(|r| lower.contains(r)) {
                    parts.push(format!("{k}=<redacted>"));
                    continue;
                }
                let rendered = match v {
                    serde_json::Value::String(s) => truncate(s, 40),
                    other => truncate(&other.to_string(), 40),
                };
                parts.push(format!("{k}={rendered}"));
            }
            parts.join(", ")
        }
        other => truncate(&other.to_string(), 60),
    };

    let full = format!("{tool_name}({summary})");
    truncate(&full, MAX_SUMMARY_LEN)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('\u{2026}');
        out
    }
}

/// The small capability interface a host layer implements to resolve
/// pending prompts. Not held by the gate itself — only used by the CLI
/// harness and as the shape a Tauri command handler fulfills.
#[async_trait::async_trait]
pub trait PermissionPrompter: Send + Sync {
    async fn prompt(&self, request: PromptRequest) -> PermissionDecision;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_redacts_sensitive_keys() {
        let args = serde_json::json!({"url": "https://example.com/x", "api_key": "sk-1234"});
        let purpose = build_purpose("web_fetch", &args);
        assert!(!purpose.contains("sk-1234"));
        assert!(purpose.contains("<redacted>"));
    }

    #[test]
    fn purpose_truncates_long_values() {
        let long = "a".repeat(500);
        let args = serde_json::json!({"path": long});
        let purpose = build_purpose("file_read", &args);
        assert!(purpose.len() < 500);
        assert!(purpose.starts_with("file_read("));
    }

    #[test]
    fn purpose_handles_non_object_args() {
        let purpose = build_purpose("shell", &serde_json::json!("ls -la"));
        assert!(purpose.starts_with("shell("));
    }
}
