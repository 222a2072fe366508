mod loader;
mod schema;
mod snapshot;

pub use loader::{default_settings_path, load, save, ConfigError};
pub use schema::{
    AppSettings, AudioConfig, DialoguePolicyConfig, LlmEndpointConfig, McpPermissionsConfig,
    MemoryConfig, ToolServerConfig, VoiceHostConfig, WeatherConfig,
};
pub use snapshot::ConfigHandle;
