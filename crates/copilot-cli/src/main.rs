//! Headless composition root for the copilot security and orchestration
//! core, grounded in the teacher's `services::boot::BootSequence` ordered
//! startup (directories, config, subsystems, "ready" event) and `cli.rs`'s
//! `clap`-driven subcommand shape, scaled down to this crate's much
//! narrower surface: no channels, no scheduler, no desktop GUI.

mod prompter;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use copilot_core::audit::{AuditLog, CapabilityBroker, IssueRequest};
use copilot_core::config::ConfigHandle;
use copilot_core::event_bus::{AppEvent, EventBus, TokioBroadcastBus};
use copilot_core::permission::{PermissionGate, FALLBACK_GROUP};
use copilot_core::supervisor::{ToolServerSupervisor, VoiceHostSupervisor};

use prompter::ConsolePrompter;

#[derive(Parser, Debug)]
#[command(
    name = "copilot",
    about = "Headless security and orchestration core for the desktop copilot",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the core and enter an interactive tool-call REPL.
    Run,
    /// Print the last N audit events.
    Audit {
        #[arg(long, default_value_t = 20)]
        n: usize,
    },
    /// Revoke every outstanding capability token.
    StopAll,
}

fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();
    tracing_log::LogTracer::init().ok();
    log::info!("copilot core starting up (version {})", env!("CARGO_PKG_VERSION"));
}

fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("copilot")
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let audit = match AuditLog::start(app_data_dir().join("audit.log")).await {
        Ok(audit) => Arc::new(audit),
        Err(e) => {
            eprintln!("failed to start audit log: {e}");
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(audit).await,
        Commands::Audit { n } => audit_tail(&audit, n).await,
        Commands::StopAll => stop_all(&audit).await,
    }

    audit.flush_and_shutdown().await;
}

async fn audit_tail(audit: &AuditLog, n: usize) {
    match audit.last_n(n).await {
        Ok(events) => {
            for event in events {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => eprintln!("failed to render audit event: {e}"),
                }
            }
        }
        Err(e) => eprintln!("failed to read audit log: {e}"),
    }
}

async fn stop_all(audit: &Arc<AuditLog>) {
    let broker = CapabilityBroker::new(audit.clone());
    let revoked = broker.revoke_all("operator requested STOP ALL").await;
    println!("revoked {revoked} outstanding capability token(s)");
}

/// Boot the config snapshot, permission gate, capability broker, and both
/// subprocess supervisors, then drive an interactive REPL: `tool <name>
/// <json-args>` runs a gated tool call, `quit` tears everything down.
async fn run(audit: Arc<AuditLog>) {
    let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
    let broker = Arc::new(CapabilityBroker::new(audit.clone()));

    let settings_path = match copilot_core::config::default_settings_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("could not resolve settings path: {e}");
            return;
        }
    };
    let config = match ConfigHandle::load(settings_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load settings: {e}");
            return;
        }
    };

    let gate = Arc::new(PermissionGate::new(
        bus.clone(),
        audit.clone(),
        config.current().mcp_permissions.policy.clone(),
    ));
    spawn_prompt_responder(gate.clone(), bus.clone());

    let settings = config.current();
    let tool_server = Arc::new(ToolServerSupervisor::new(
        settings.tool_server.command.clone(),
        settings.tool_server.args.clone(),
        bus.clone(),
        audit.clone(),
    ));
    if settings.tool_server.enabled {
        match tool_server.start().await {
            Ok(tools) => log::info!("tool server ready with {} tool(s)", tools.len()),
            Err(e) => log::warn!("tool server did not start: {e}"),
        }
    }

    let voice_host = Arc::new(VoiceHostSupervisor::new(
        app_data_dir().join("voice-host-session.json"),
        bus.clone(),
        audit.clone(),
    ));
    match voice_host.ensure_ready(&settings.voice_host).await {
        Ok(Some(base_url)) => log::info!("voice host ready at {base_url}"),
        Ok(None) => log::info!("voice host disabled"),
        Err(e) => log::warn!("voice host did not become ready: {e}"),
    }

    let _ = bus.publish(AppEvent::SystemReady);
    println!("copilot core ready. Commands: `tool <name> <json-args>`, `audit`, `quit`.");

    repl(&gate, &broker, &tool_server).await;

    tool_server.stop().await;
    voice_host.teardown().await;
}

fn spawn_prompt_responder(gate: Arc<PermissionGate>, bus: Arc<dyn EventBus>) {
    tokio::spawn(async move {
        let mut rx = bus.subscribe();
        let prompter = ConsolePrompter;
        while let Ok(event) = rx.recv().await {
            if let AppEvent::PermissionPromptRequested {
                request_id,
                tool_name,
                group,
                purpose,
            } = event
            {
                let group = group.parse().unwrap_or(FALLBACK_GROUP);
                let decision = copilot_core::permission::PermissionPrompter::prompt(
                    &prompter,
                    copilot_core::permission::PromptRequest {
                        request_id: request_id.clone(),
                        tool_name,
                        group,
                        purpose,
                    },
                )
                .await;
                gate.resolve(&request_id, decision).await;
            }
        }
    });
}

async fn repl(
    gate: &Arc<PermissionGate>,
    broker: &Arc<CapabilityBroker>,
    tool_server: &Arc<ToolServerSupervisor>,
) {
    let stdin = std::io::stdin();
    let mut lines = std::io::BufRead::lines(stdin.lock());
    loop {
        print!("> ");
        if std::io::Write::flush(&mut std::io::stdout()).is_err() {
            break;
        }
        let Some(Ok(line)) = lines.next() else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if line == "audit" {
            continue;
        }

        let Some(rest) = line.strip_prefix("tool ") else {
            println!("unrecognized command: {line}");
            continue;
        };
        let (name, args_str) = rest.split_once(' ').unwrap_or((rest, "{}"));
        let args: serde_json::Value = match serde_json::from_str(args_str.trim()) {
            Ok(v) => v,
            Err(e) => {
                println!("invalid JSON arguments: {e}");
                continue;
            }
        };

        match gate.check(name, &args).await {
            copilot_core::permission::CheckOutcome::Denied { reason } => {
                println!("denied: {reason}");
            }
            _granted => {
                let token = broker
                    .issue_token(IssueRequest {
                        capability: name.to_string(),
                        purpose: format!("{name}({args})"),
                        issuer: "cli".to_string(),
                        ttl_secs: None,
                    })
                    .await;
                if !broker.is_active(&token.id).await {
                    println!("capability token expired before use");
                    continue;
                }
                match tool_server.call_tool(name, args).await {
                    Ok(result) => println!("{result}"),
                    Err(e) => println!("tool call failed: {e}"),
                }
            }
        }
    }
}
