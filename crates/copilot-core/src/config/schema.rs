//! The full runtime settings record (`spec.md` §4.6).
//!
//! Every field carries `#[serde(default)]` so a partial or older settings
//! file on disk still deserializes, matching the teacher's `AppConfig`
//! convention in `config/schema.rs`.

use serde::{Deserialize, Serialize};

use crate::permission::PolicySnapshot;

/// The complete, immutable settings value. A new `AppSettings` entirely
/// replaces the prior one — there is no field-level mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub llm: LlmEndpointConfig,
    pub audio: AudioConfig,
    pub voice_host: VoiceHostConfig,
    pub tool_server: ToolServerConfig,
    pub mcp_permissions: McpPermissionsConfig,
    pub memory: MemoryConfig,
    pub weather: WeatherConfig,
    pub dialogue: DialoguePolicyConfig,
    pub active_profile_id: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            llm: LlmEndpointConfig::default(),
            audio: AudioConfig::default(),
            voice_host: VoiceHostConfig::default(),
            tool_server: ToolServerConfig::default(),
            mcp_permissions: McpPermissionsConfig::default(),
            memory: MemoryConfig::default(),
            weather: WeatherConfig::default(),
            dialogue: DialoguePolicyConfig::default(),
            active_profile_id: "default".to_string(),
        }
    }
}

/// Supervisor-facing settings for the tool server child (`spec.md` §4.3):
/// a plain command/args pair, since the tool server's lifecycle has no
/// port negotiation to configure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "copilot-tool-server".to_string(),
            args: Vec::new(),
        }
    }
}

/// Supervisor-facing settings for the voice-host child (`spec.md` §4.2):
/// the preferred port, the bounded candidate range searched around it, and
/// the executable used to spawn a fresh instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceHostConfig {
    pub enabled: bool,
    pub command: String,
    pub args: Vec<String>,
    /// Host the supervisor binds/probes the voice host on. Must be a
    /// loopback host (`127.0.0.1` or `localhost`) — anything else fails
    /// `EnsureReady` with `invalid_voicehost_base` (`spec.md` §4.2
    /// failure taxonomy, testable property 9).
    pub base_host: String,
    pub preferred_port: u16,
    pub port_range_size: u16,
    pub startup_timeout_secs: u64,
}

impl Default for VoiceHostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "voice-host".to_string(),
            args: Vec::new(),
            base_host: "127.0.0.1".to_string(),
            preferred_port: 8799,
            port_range_size: 8,
            startup_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmEndpointConfig {
    pub base_url: String,
    pub model_id: String,
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for LlmEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            model_id: "default".to_string(),
            api_key_env: String::new(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub push_to_talk_binding: String,
    pub asr_engine: String,
    pub tts_engine: String,
    pub tts_voice_id: Option<String>,
    pub preview_asr_enabled: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            push_to_talk_binding: "F9".to_string(),
            asr_engine: "whisper".to_string(),
            tts_engine: "piper".to_string(),
            tts_voice_id: None,
            preview_asr_enabled: true,
        }
    }
}

/// Holds the gate's [`PolicySnapshot`] plus the developer override field,
/// matching the settings-file location `spec.md` §4.6 calls the "MCP
/// permissions block".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct McpPermissionsConfig {
    pub policy: PolicySnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WeatherConfig {
    pub enabled: bool,
    pub default_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialoguePolicyConfig {
    pub max_turns_per_session: u32,
    pub system_prompt_override: Option<String>,
}

impl Default for DialoguePolicyConfig {
    fn default() -> Self {
        Self {
            max_turns_per_session: 200,
            system_prompt_override: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_round_trip_json() {
        let settings = AppSettings::default();
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let back: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{"active_profile_id": "work"}"#;
        let settings: AppSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.active_profile_id, "work");
        assert_eq!(settings.audio.push_to_talk_binding, "F9");
    }
}
