//! Capability tokens and their issuing/revoking broker (`spec.md` §3,
//! §4.5).
//!
//! The TTL-expiry check is grounded in the fixed-window arithmetic of the
//! teacher's `security::policy::SlidingWindow` rate limiter (`chrono`
//! duration comparisons against an issued-at timestamp), applied here to
//! token expiry instead of request counting.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::event::{Actor, AuditResult, DetailValue};
use super::log::AuditLog;

const DEFAULT_TTL_SECS: i64 = 60;

/// Short-lived proof that a named capability was granted (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub id: String,
    pub capability: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub purpose: String,
    pub issuer: String,
}

impl CapabilityToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Request to issue a new [`CapabilityToken`].
#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub capability: String,
    pub purpose: String,
    pub issuer: String,
    /// Overrides [`DEFAULT_TTL_SECS`] when set.
    pub ttl_secs: Option<i64>,
}

/// Issues capability tokens with a fixed TTL, revocable in bulk. Tokens
/// are never re-issued; the token table is cleared on `STOP ALL` and on
/// process exit, each producing a single audit event tagged with the
/// revoked count (`spec.md` §4.5).
pub struct CapabilityBroker {
    tokens: Mutex<HashMap<String, CapabilityToken>>,
    audit: Arc<AuditLog>,
}

impl CapabilityBroker {
    pub fn new(audit: Arc<AuditLog>) -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            audit,
        }
    }

    pub async fn issue_token(&self, request: IssueRequest) -> CapabilityToken {
        let now = Utc::now();
        let ttl = ChronoDuration::seconds(request.ttl_secs.unwrap_or(DEFAULT_TTL_SECS));
        let token = CapabilityToken {
            id: Uuid::new_v4().to_string(),
            capability: request.capability,
            issued_at: now,
            expires_at: now + ttl,
            purpose: request.purpose,
            issuer: request.issuer,
        };
        self.tokens
            .lock()
            .await
            .insert(token.id.clone(), token.clone());
        token
    }

    /// True only if `token_id` names an active, non-expired, non-revoked
    /// token.
    pub async fn is_active(&self, token_id: &str) -> bool {
        let tokens = self.tokens.lock().await;
        match tokens.get(token_id) {
            Some(token) => !token.is_expired_at(Utc::now()),
            None => false,
        }
    }

    pub async fn active_count(&self) -> usize {
        let now = Utc::now();
        let tokens = self.tokens.lock().await;
        tokens.values().filter(|t| !t.is_expired_at(now)).count()
    }

    /// Revoke every token, returning the number of tokens that were
    /// actually active (i.e. not already expired) at the moment of
    /// revocation. Always clears the table. Emits exactly one
    /// `TOKENS_REVOKED` audit event tagged with the revoked count, via the
    /// cold-path (never-dropped) logger.
    pub async fn revoke_all(&self, reason: &str) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.lock().await;
        let revoked = tokens.values().filter(|t| !t.is_expired_at(now)).count();
        tokens.clear();
        drop(tokens);

        let mut details = HashMap::new();
        details.insert("revoked_count".to_string(), DetailValue::from(revoked as u64));
        details.insert("reason".to_string(), DetailValue::from(reason.to_string()));
        self.audit
            .log_cold(
                Actor::System,
                "TOKENS_REVOKED",
                None,
                AuditResult::Ok,
                details,
            )
            .await;

        revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn make_broker() -> (CapabilityBroker, TempDir) {
        let tmp = TempDir::new().unwrap();
        let audit = Arc::new(AuditLog::start(tmp.path().join("audit.log")).await.unwrap());
        (CapabilityBroker::new(audit), tmp)
    }

    #[tokio::test]
    async fn issued_token_is_active() {
        let (broker, _tmp) = make_broker().await;
        let token = broker
            .issue_token(IssueRequest {
                capability: "web.search".to_string(),
                purpose: "web_search(...)".to_string(),
                issuer: "gate".to_string(),
                ttl_secs: None,
            })
            .await;
        assert!(broker.is_active(&token.id).await);
        assert_eq!(broker.active_count().await, 1);
    }

    #[tokio::test]
    async fn expired_token_is_never_active() {
        let (broker, _tmp) = make_broker().await;
        let token = broker
            .issue_token(IssueRequest {
                capability: "web.search".to_string(),
                purpose: "p".to_string(),
                issuer: "gate".to_string(),
                ttl_secs: Some(-1), // already expired at issuance
            })
            .await;
        assert!(!broker.is_active(&token.id).await);
        assert_eq!(broker.active_count().await, 0);
    }

    #[tokio::test]
    async fn revoke_all_clears_table_and_reports_count() {
        let (broker, _tmp) = make_broker().await;
        for _ in 0..3 {
            broker
                .issue_token(IssueRequest {
                    capability: "files.read".to_string(),
                    purpose: "p".to_string(),
                    issuer: "gate".to_string(),
                    ttl_secs: None,
                })
                .await;
        }
        let revoked = broker.revoke_all("STOP ALL").await;
        assert_eq!(revoked, 3);
        assert_eq!(broker.active_count().await, 0);
    }

    #[tokio::test]
    async fn revoke_all_after_expiry_reports_zero() {
        let (broker, _tmp) = make_broker().await;
        broker
            .issue_token(IssueRequest {
                capability: "files.read".to_string(),
                purpose: "p".to_string(),
                issuer: "gate".to_string(),
                ttl_secs: Some(-1),
            })
            .await;
        let revoked = broker.revoke_all("expired cleanup").await;
        assert_eq!(revoked, 0);
    }

    #[tokio::test]
    async fn unknown_token_is_not_active() {
        let (broker, _tmp) = make_broker().await;
        assert!(!broker.is_active("nonexistent").await);
    }
}
