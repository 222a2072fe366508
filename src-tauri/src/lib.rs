mod commands;
mod event_bridge;
mod host_audio;
mod plugins;

use std::path::PathBuf;
use std::sync::Arc;

use copilot_core::audit::{AuditLog, CapabilityBroker};
use copilot_core::config::ConfigHandle;
use copilot_core::event_bus::{AppEvent, EventBus, TokioBroadcastBus};
use copilot_core::permission::PermissionGate;
use copilot_core::supervisor::{ToolServerSupervisor, VoiceHostSupervisor};
use copilot_core::voice::{VoiceHostSpeechClient, VoiceSession};
use tauri::Manager;

use event_bridge::EventBridge;

fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("copilot")
}

/// Brings up the core subsystems and registers them as managed state, then
/// signals readiness over the event bus. Runs detached from `setup`; on
/// failure it logs and returns early rather than propagating, since nothing
/// is left to hand the error to by the time this runs.
async fn boot(
    app_handle: tauri::AppHandle,
    bus: Arc<dyn EventBus>,
    data_dir: PathBuf,
) -> Result<(), String> {
    let audit = Arc::new(
        AuditLog::start(data_dir.join("audit.log"))
            .await
            .map_err(|e| format!("failed to start audit log: {e}"))?,
    );
    app_handle.manage(audit.clone());

    let broker = Arc::new(CapabilityBroker::new(audit.clone()));
    app_handle.manage(broker);

    let settings_path = copilot_core::config::default_settings_path()
        .map_err(|e| format!("could not resolve settings path: {e}"))?;
    let config = Arc::new(
        ConfigHandle::load(settings_path)
            .await
            .map_err(|e| format!("failed to load settings: {e}"))?,
    );
    app_handle.manage(config.clone());

    let gate = Arc::new(PermissionGate::new(
        bus.clone(),
        audit.clone(),
        config.current().mcp_permissions.policy.clone(),
    ));
    app_handle.manage(gate);

    let settings = config.current();

    let tool_server = Arc::new(ToolServerSupervisor::new(
        settings.tool_server.command.clone(),
        settings.tool_server.args.clone(),
        bus.clone(),
        audit.clone(),
    ));
    if settings.tool_server.enabled {
        if let Err(e) = tool_server.start().await {
            log::warn!("tool server did not start: {e}");
        }
    }
    app_handle.manage(tool_server);

    let voice_host = Arc::new(VoiceHostSupervisor::new(
        data_dir.join("voice-host-session.json"),
        bus.clone(),
        audit.clone(),
    ));
    let base_url = match voice_host.ensure_ready(&settings.voice_host).await {
        Ok(url) => url,
        Err(e) => {
            log::warn!("voice host did not become ready: {e}");
            None
        }
    };
    app_handle.manage(voice_host);

    if let Some(base_url) = base_url {
        let voice_client = copilot_core::voice::VoiceHostClient::new(base_url)
            .map_err(|e| format!("voice host url: {e}"))?;
        let speech = Arc::new(VoiceHostSpeechClient::new(
            voice_client,
            settings.audio.asr_engine.clone(),
            settings.audio.tts_engine.clone(),
            settings.audio.tts_voice_id.clone(),
        ));
        let capture = host_audio::SharedCaptureSource::default();
        app_handle.manage(capture.clone());
        let playback: Arc<dyn copilot_core::voice::PlaybackSink> =
            Arc::new(host_audio::IpcPlaybackSink::new(app_handle.clone()));
        let orchestrator: Arc<dyn copilot_core::orchestrator::DialogueOrchestrator> =
            Arc::new(copilot_core::orchestrator::EchoOrchestrator);
        let voice_session = Arc::new(VoiceSession::new(
            bus.clone(),
            audit.clone(),
            capture,
            playback,
            speech,
            orchestrator,
            settings.audio.preview_asr_enabled,
        ));
        app_handle.manage(voice_session);
    }

    let _ = bus.publish(AppEvent::SystemReady);
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Install the ring crypto provider for rustls before any network I/O.
    let _ = rustls::crypto::ring::default_provider().install_default();

    plugins::logging::init();

    tauri::Builder::default()
        .plugin(tauri_plugin_notification::init())
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            #[cfg(desktop)]
            plugins::window_state::init(app)?;

            #[cfg(desktop)]
            app.handle()
                .plugin(tauri_plugin_single_instance::init(|_app, _args, _cwd| {
                    log::info!("single-instance: second launch detected, ignoring");
                }))?;

            #[cfg(desktop)]
            app.handle().plugin(tauri_plugin_autostart::init(
                tauri_plugin_autostart::MacosLauncher::LaunchAgent,
                None,
            ))?;

            let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
            app.manage(bus.clone());
            EventBridge::new(bus.clone(), app.handle().clone()).start();

            // The rest of boot (audit log, settings, gate, supervisors) is
            // async; it runs detached so `setup` can return immediately,
            // matching the teacher's own boot-sequence-as-spawned-task
            // shape. Commands that depend on this state are only ever
            // invoked once the frontend observes `AppEvent::SystemReady`.
            let app_handle = app.handle().clone();
            let data_dir = app_data_dir();
            tauri::async_runtime::spawn(async move {
                if let Err(e) = boot(app_handle.clone(), bus.clone(), data_dir).await {
                    log::error!("boot: failed to initialize core: {e}");
                    let _ = bus.publish(AppEvent::SystemError { message: e });
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::approval::approve_action_command,
            commands::voice::push_audio_chunk_command,
            commands::voice::mic_down_command,
            commands::voice::mic_up_command,
            commands::voice::shutup_command,
            commands::voice::voice_state_command,
            commands::settings::get_app_settings,
            commands::settings::update_app_settings,
        ])
        .on_window_event(|window, event| {
            #[cfg(desktop)]
            if let tauri::WindowEvent::CloseRequested { .. } = event {
                plugins::window_state::on_close_requested(window);
            }
        })
        .run(tauri::generate_context!())
        .unwrap_or_else(|e| {
            log::error!("Fatal: failed to run tauri application: {e}");
            std::process::exit(1);
        });
}
