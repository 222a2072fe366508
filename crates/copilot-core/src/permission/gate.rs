//! The permission gate: the sole authorization point for tool calls
//! (`spec.md` §4.1).
//!
//! The suspend/resume mechanism is adapted directly from the example
//! `PermissionGate` (`pending_requests: Mutex<HashMap<String,
//! oneshot::Sender<_>>>`, `check`/`resolve`/`cancel_session_requests`):
//! `check` registers a oneshot sender keyed by a generated request id,
//! publishes a `PermissionPromptRequested` event, and awaits the paired
//! receiver with no timeout — the user may take any amount of time.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{oneshot, Mutex, RwLock};
use uuid::Uuid;

use crate::audit::{AuditLog, Actor, AuditResult};
use crate::event_bus::{AppEvent, EventBus};

use super::groups::ToolGroupMapping;
use super::policy::{PolicySnapshot, PolicyValue};
use super::prompt::{build_purpose, PermissionDecision};

/// The outcome of a single `Check` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    NotRequired,
    Granted { token_id: String },
    Denied { reason: String },
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("prompt channel closed unexpectedly")]
    PromptChannelClosed,
}

/// Session grants are keyed by `(group, epoch)`; bumping the epoch
/// invalidates every prior grant atomically without mutating individual
/// entries (`spec.md` §3).
type GrantKey = (super::groups::ToolGroup, u64);

/// The sole authorization point for tool calls.
pub struct PermissionGate {
    snapshot: RwLock<Arc<PolicySnapshot>>,
    epoch: RwLock<u64>,
    session_grants: RwLock<std::collections::HashSet<GrantKey>>,
    pending: Mutex<HashMap<String, oneshot::Sender<PermissionDecision>>>,
    bus: Arc<dyn EventBus>,
    audit: Arc<AuditLog>,
}

impl PermissionGate {
    pub fn new(bus: Arc<dyn EventBus>, audit: Arc<AuditLog>, initial: PolicySnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
            epoch: RwLock::new(0),
            session_grants: RwLock::new(std::collections::HashSet::new()),
            pending: Mutex::new(HashMap::new()),
            bus,
            audit,
        }
    }

    /// Atomically swap the policy snapshot. Concurrent `Check`s complete
    /// against whichever snapshot they captured at entry.
    pub async fn update_settings(&self, new_snapshot: PolicySnapshot) {
        let mut guard = self.snapshot.write().await;
        *guard = Arc::new(new_snapshot);
    }

    /// Atomically increment the conversation epoch; all prior session
    /// grants become unreachable.
    pub async fn clear_session_grants(&self) {
        let mut epoch = self.epoch.write().await;
        *epoch += 1;
        // Stale entries are simply never matched again (their epoch no
        // longer equals the current one); no need to scrub them eagerly.
    }

    /// The sole authorization entry point. No code path may invoke a tool
    /// without first calling this.
    pub async fn check(&self, tool_name: &str, args_json: &serde_json::Value) -> CheckOutcome {
        let canonical = super::groups::canonicalize_tool_name(tool_name);
        let group = ToolGroupMapping::resolve(&canonical);

        let snapshot = { self.snapshot.read().await.clone() };
        let effective = snapshot.effective_policy(group);

        match effective {
            PolicyValue::Off => {
                self.audit
                    .log(
                        Actor::Gate,
                        "PERMISSION_BLOCKED",
                        Some(&canonical),
                        AuditResult::Error("Disabled in Settings".to_string()),
                        Default::default(),
                    )
                    .await;
                CheckOutcome::Denied {
                    reason: "Disabled in Settings".to_string(),
                }
            }
            PolicyValue::Always => CheckOutcome::NotRequired,
            PolicyValue::Ask => {
                let epoch = *self.epoch.read().await;
                let hit = {
                    let grants = self.session_grants.read().await;
                    grants.contains(&(group, epoch))
                };
                if hit {
                    return CheckOutcome::NotRequired;
                }
                self.prompt_and_resolve(&canonical, group, epoch, args_json)
                    .await
            }
        }
    }

    async fn prompt_and_resolve(
        &self,
        canonical_tool: &str,
        group: super::groups::ToolGroup,
        epoch: u64,
        args_json: &serde_json::Value,
    ) -> CheckOutcome {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(request_id.clone(), tx);
        }

        let purpose = build_purpose(canonical_tool, args_json);
        if self
            .bus
            .publish(AppEvent::PermissionPromptRequested {
                request_id: request_id.clone(),
                tool_name: canonical_tool.to_string(),
                group: group.to_string(),
                purpose,
            })
            .is_err()
        {
            let mut pending = self.pending.lock().await;
            pending.remove(&request_id);
            return CheckOutcome::Denied {
                reason: "prompt channel closed".to_string(),
            };
        }

        let decision = match rx.await {
            Ok(decision) => decision,
            Err(_) => {
                self.audit
                    .log(
                        Actor::Gate,
                        "PERMISSION_DENIED",
                        Some(canonical_tool),
                        AuditResult::Error("prompt cancelled".to_string()),
                        Default::default(),
                    )
                    .await;
                return CheckOutcome::Denied {
                    reason: "prompt cancelled".to_string(),
                };
            }
        };

        self.apply_decision(canonical_tool, group, epoch, decision)
            .await
    }

    async fn apply_decision(
        &self,
        canonical_tool: &str,
        group: super::groups::ToolGroup,
        epoch: u64,
        decision: PermissionDecision,
    ) -> CheckOutcome {
        match decision {
            PermissionDecision::Denied => {
                self.audit
                    .log(
                        Actor::User,
                        "PERMISSION_DENIED",
                        Some(canonical_tool),
                        AuditResult::Ok,
                        Default::default(),
                    )
                    .await;
                CheckOutcome::Denied {
                    reason: "Denied by user".to_string(),
                }
            }
            PermissionDecision::AllowOnce => CheckOutcome::Granted {
                token_id: self.issue_token_id().await,
            },
            PermissionDecision::AllowSession => {
                {
                    let mut grants = self.session_grants.write().await;
                    grants.insert((group, epoch));
                }
                CheckOutcome::Granted {
                    token_id: self.issue_token_id().await,
                }
            }
            PermissionDecision::AllowAlways => {
                let _ = self
                    .bus
                    .publish(AppEvent::PersistGroupAsAlways {
                        group: group.to_string(),
                    });
                CheckOutcome::Granted {
                    token_id: self.issue_token_id().await,
                }
            }
        }
    }

    /// Token issuance is delegated to the capability broker by callers that
    /// wire one in; the gate itself only needs a unique id to hand back in
    /// `Granted`. Real issuance (with TTL tracking) happens in
    /// `crate::audit::CapabilityBroker`.
    async fn issue_token_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Resolve a pending prompt (called by the host layer once the user
    /// decides).
    pub async fn resolve(&self, request_id: &str, decision: PermissionDecision) {
        let mut pending = self.pending.lock().await;
        if let Some(tx) = pending.remove(request_id) {
            let _ = tx.send(decision);
        }
    }

    /// Cancel all pending prompts, e.g. when the host shell is tearing
    /// down. Dropping the oneshot senders causes waiting `check` calls to
    /// observe `Err` on their receiver and return `Denied`.
    pub async fn cancel_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        pending.clear();
    }

    pub async fn current_snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.read().await.clone()
    }

    pub async fn current_epoch(&self) -> u64 {
        *self.epoch.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::TokioBroadcastBus;
    use crate::permission::groups::ToolGroup;
    use tempfile::TempDir;

    async fn make_gate(initial: PolicySnapshot) -> (Arc<PermissionGate>, Arc<dyn EventBus>, TempDir)
    {
        let tmp = TempDir::new().unwrap();
        let bus: Arc<dyn EventBus> = Arc::new(TokioBroadcastBus::new());
        let audit = Arc::new(AuditLog::start(tmp.path().join("audit.log")).await.unwrap());
        let gate = Arc::new(PermissionGate::new(bus.clone(), audit, initial));
        (gate, bus, tmp)
    }

    #[tokio::test]
    async fn always_policy_is_not_required() {
        let policy = PolicySnapshot::default().with_group(ToolGroup::Web, PolicyValue::Always);
        let (gate, _bus, _tmp) = make_gate(policy).await;
        let outcome = gate.check("web_search", &serde_json::json!({})).await;
        assert_eq!(outcome, CheckOutcome::NotRequired);
    }

    #[tokio::test]
    async fn off_policy_is_denied_with_disabled_reason() {
        let policy = PolicySnapshot::default().with_group(ToolGroup::Web, PolicyValue::Off);
        let (gate, _bus, _tmp) = make_gate(policy).await;
        let outcome = gate.check("web_search", &serde_json::json!({})).await;
        assert_eq!(
            outcome,
            CheckOutcome::Denied {
                reason: "Disabled in Settings".to_string()
            }
        );
    }

    #[tokio::test]
    async fn s1_ask_then_allow_once_reprompts_next_time() {
        let policy = PolicySnapshot::default().with_group(ToolGroup::Web, PolicyValue::Ask);
        let (gate, bus, _tmp) = make_gate(policy).await;
        let mut rx = bus.subscribe();

        let gate2 = gate.clone();
        let handle = tokio::spawn(async move {
            gate2.check("web_search", &serde_json::json!({})).await
        });

        let request_id = match rx.recv().await.unwrap() {
            AppEvent::PermissionPromptRequested { request_id, .. } => request_id,
            other => panic!("unexpected event: {other:?}"),
        };
        gate.resolve(&request_id, PermissionDecision::AllowOnce).await;

        let outcome = handle.await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Granted { .. }));

        // Second check re-prompts: no session grant was created.
        let gate3 = gate.clone();
        let handle2 = tokio::spawn(async move {
            gate3.check("web_search", &serde_json::json!({})).await
        });
        let request_id2 = match rx.recv().await.unwrap() {
            AppEvent::PermissionPromptRequested { request_id, .. } => request_id,
            other => panic!("unexpected event: {other:?}"),
        };
        assert_ne!(request_id, request_id2);
        gate.resolve(&request_id2, PermissionDecision::Denied).await;
        let outcome2 = handle2.await.unwrap();
        assert!(matches!(outcome2, CheckOutcome::Denied { .. }));
    }

    #[tokio::test]
    async fn s2_ask_then_allow_session_then_epoch_clear_reprompts() {
        let policy = PolicySnapshot::default().with_group(ToolGroup::Web, PolicyValue::Ask);
        let (gate, bus, _tmp) = make_gate(policy).await;
        let mut rx = bus.subscribe();

        let gate2 = gate.clone();
        let handle = tokio::spawn(async move {
            gate2.check("web_search", &serde_json::json!({})).await
        });
        let request_id = match rx.recv().await.unwrap() {
            AppEvent::PermissionPromptRequested { request_id, .. } => request_id,
            other => panic!("unexpected: {other:?}"),
        };
        gate.resolve(&request_id, PermissionDecision::AllowSession)
            .await;
        assert!(matches!(
            handle.await.unwrap(),
            CheckOutcome::Granted { .. }
        ));

        // Second check: grant hit, no prompt.
        let outcome = gate.check("web_search", &serde_json::json!({})).await;
        assert_eq!(outcome, CheckOutcome::NotRequired);

        // After ClearSessionGrants, a third check re-prompts.
        gate.clear_session_grants().await;
        let gate3 = gate.clone();
        let handle3 = tokio::spawn(async move {
            gate3.check("web_search", &serde_json::json!({})).await
        });
        let request_id3 = match rx.recv().await.unwrap() {
            AppEvent::PermissionPromptRequested { request_id, .. } => request_id,
            other => panic!("unexpected: {other:?}"),
        };
        gate.resolve(&request_id3, PermissionDecision::Denied).await;
        assert!(matches!(
            handle3.await.unwrap(),
            CheckOutcome::Denied { .. }
        ));
    }

    #[tokio::test]
    async fn s3_memory_disabled_denies_regardless_of_always() {
        let policy = PolicySnapshot::default()
            .with_group(ToolGroup::MemoryRead, PolicyValue::Always);
        let policy = PolicySnapshot {
            memory_enabled: false,
            ..policy
        };
        let (gate, _bus, _tmp) = make_gate(policy).await;
        let outcome = gate.check("memory_retrieve", &serde_json::json!({})).await;
        assert_eq!(
            outcome,
            CheckOutcome::Denied {
                reason: "Disabled in Settings".to_string()
            }
        );
    }

    #[tokio::test]
    async fn cancelling_pending_denies_waiting_check() {
        let policy = PolicySnapshot::default().with_group(ToolGroup::Web, PolicyValue::Ask);
        let (gate, bus, _tmp) = make_gate(policy).await;
        let mut rx = bus.subscribe();

        let gate2 = gate.clone();
        let handle = tokio::spawn(async move {
            gate2.check("web_search", &serde_json::json!({})).await
        });
        let _event = rx.recv().await.unwrap();
        gate.cancel_all_pending().await;

        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome,
            CheckOutcome::Denied {
                reason: "prompt cancelled".to_string()
            }
        );
    }

    #[tokio::test]
    async fn gate_purity_repeated_checks_same_snapshot_same_decision() {
        let policy = PolicySnapshot::default().with_group(ToolGroup::Files, PolicyValue::Always);
        let (gate, _bus, _tmp) = make_gate(policy).await;
        let a = gate.check("file_read", &serde_json::json!({})).await;
        let b = gate.check("file_read", &serde_json::json!({})).await;
        assert_eq!(a, b);
    }
}
