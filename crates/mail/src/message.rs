use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use handoff_core::domain::task::TaskId;

/// Inbound message as the messaging collaborator delivers it. Wire payloads
/// arrive camel-cased; both spellings are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    #[serde(alias = "threadId")]
    pub thread_id: String,
    pub from: String,
    #[serde(alias = "plainBody")]
    pub plain_body: String,
    pub timestamp: DateTime<Utc>,
}

/// Strips a display name down to the bare address: `"Name <addr>"` → `addr`,
/// lowercased and trimmed.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.rfind('<') {
        if let Some(offset) = trimmed[start..].find('>') {
            return trimmed[start + 1..start + offset].trim().to_ascii_lowercase();
        }
    }
    trimmed.trim_matches('"').trim().to_ascii_lowercase()
}

/// Strict scan for an embedded `[task:<id>]` reference. Used only as the
/// correlation fallback when the thread id matches nothing.
pub fn embedded_task_reference(body: &str) -> Option<TaskId> {
    const MARKER: &str = "[task:";

    let lower = body.to_ascii_lowercase();
    let start = lower.find(MARKER)? + MARKER.len();
    let rest = &body[start..];
    let end = rest.find(']')?;
    let candidate = rest[..end].trim();

    let valid = !candidate.is_empty()
        && candidate.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    valid.then(|| TaskId(candidate.to_string()))
}
