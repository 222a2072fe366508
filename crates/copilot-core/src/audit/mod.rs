mod broker;
mod event;
mod log;

pub use broker::{CapabilityBroker, CapabilityToken, IssueRequest};
pub use event::{Actor, AuditEvent, AuditResult, DetailValue};
pub use log::{AuditError, AuditLog};
