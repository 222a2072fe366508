//! The append-only audit event record (`spec.md` §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who initiated the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Agent,
    Runtime,
    Voice,
    Gate,
    System,
}

/// A leaf value in an audit event's `details` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for DetailValue {
    fn from(s: &str) -> Self {
        DetailValue::String(s.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(s: String) -> Self {
        DetailValue::String(s)
    }
}

impl From<bool> for DetailValue {
    fn from(b: bool) -> Self {
        DetailValue::Bool(b)
    }
}

impl From<u64> for DetailValue {
    fn from(n: u64) -> Self {
        DetailValue::Number(n as f64)
    }
}

/// The result of an audited action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Ok,
    Error(String),
}

/// An append-only audit record, serialized one-per-line as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub actor: Actor,
    /// SCREAMING_SNAKE action name, e.g. `"PERMISSION_BLOCKED"`.
    pub action: String,
    pub target: Option<String>,
    pub result: AuditResult,
    #[serde(default)]
    pub details: HashMap<String, DetailValue>,
}
