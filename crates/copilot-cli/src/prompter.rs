//! A console [`PermissionPrompter`]: the CLI harness's answer to the
//! small-capability-interface note in `permission::prompt` — stdin/stdout,
//! nothing more.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use copilot_core::permission::{PermissionDecision, PermissionPrompter, PromptRequest};

pub struct ConsolePrompter;

#[async_trait]
impl PermissionPrompter for ConsolePrompter {
    async fn prompt(&self, request: PromptRequest) -> PermissionDecision {
        tokio::task::spawn_blocking(move || prompt_blocking(&request))
            .await
            .unwrap_or(PermissionDecision::Denied)
    }
}

fn prompt_blocking(request: &PromptRequest) -> PermissionDecision {
    println!("\npermission requested: {} [{}]", request.tool_name, request.group);
    println!("  {}", request.purpose);
    print!("allow? [o]nce / [s]ession / [a]lways / [n]o: ");
    if io::stdout().flush().is_err() {
        return PermissionDecision::Denied;
    }

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return PermissionDecision::Denied;
    }

    match line.trim().to_lowercase().as_str() {
        "o" | "once" => PermissionDecision::AllowOnce,
        "s" | "session" => PermissionDecision::AllowSession,
        "a" | "always" => PermissionDecision::AllowAlways,
        _ => PermissionDecision::Denied,
    }
}
