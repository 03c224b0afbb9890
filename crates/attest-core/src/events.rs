//! Shapers for common audit categories.
//!
//! Each function maps caller data onto a generic `ActionData`; none carries
//! extra invariants. `AuditLogService` exposes best-effort `record_*`
//! wrappers built on these.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use attest_contracts::entry::ActionData;

pub const SYSTEM_ERROR: &str = "system_error";
pub const SECURITY_EVENT: &str = "security_event";
pub const PERFORMANCE_EVENT: &str = "performance_event";
pub const CONFIGURATION_CHANGE: &str = "configuration_change";

/// Severity attached to security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// An unexpected failure inside `component`.
pub fn system_error(component: &str, message: &str, context: Option<Value>) -> ActionData {
    ActionData::new(SYSTEM_ERROR)
        .subject("system", component)
        .after(json!({
            "message": message,
            "context": context.unwrap_or(Value::Null),
        }))
}

/// A security-relevant occurrence such as a failed login burst.
pub fn security_event(kind: &str, severity: Severity, details: Value) -> ActionData {
    ActionData::new(SECURITY_EVENT)
        .subject("security", kind)
        .after(json!({
            "severity": severity,
            "details": details,
        }))
}

/// A timing measurement for `operation`.
pub fn performance_event(operation: &str, duration: Duration, details: Option<Value>) -> ActionData {
    let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    ActionData::new(PERFORMANCE_EVENT)
        .subject("performance", operation)
        .after(json!({
            "duration_ms": duration_ms,
            "details": details.unwrap_or(Value::Null),
        }))
}

/// A configuration key changing value. `old_value` is absent for new keys.
pub fn configuration_change(key: &str, old_value: Option<Value>, new_value: Value) -> ActionData {
    let mut data = ActionData::new(CONFIGURATION_CHANGE)
        .subject("configuration", key)
        .after(json!({ "value": new_value }));
    if let Some(old) = old_value {
        data = data.before(json!({ "value": old }));
    }
    data
}
