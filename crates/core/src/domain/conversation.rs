use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Delegator,
    Delegate,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delegator => "delegator",
            Self::Delegate => "delegate",
            Self::System => "system",
        }
    }

    /// The counterpart in the two-party protocol. System has no counterpart
    /// and maps to itself.
    pub fn counterpart(&self) -> SenderRole {
        match self {
            Self::Delegator => Self::Delegate,
            Self::Delegate => Self::Delegator,
            Self::System => Self::System,
        }
    }
}

/// One immutable entry in a task's conversation ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub sender_role: SenderRole,
    pub sender_identity: String,
    pub event_type: String,
    pub content: String,
    /// Pre-cleaning body, kept for diagnostics when it differs.
    pub raw_content: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ConversationEvent {
    pub fn new(
        id: impl Into<String>,
        timestamp: DateTime<Utc>,
        sender_role: SenderRole,
        sender_identity: impl Into<String>,
        event_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let id = id.into();
        let id = if id.trim().is_empty() { local_event_id() } else { id };
        Self {
            id,
            timestamp,
            sender_role,
            sender_identity: sender_identity.into(),
            event_type: event_type.into(),
            content: content.into(),
            raw_content: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_raw_content(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw != self.content {
            self.raw_content = Some(raw);
        }
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn system_note(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(local_event_id(), timestamp, SenderRole::System, "handoff", "system-note", content)
    }
}

pub fn local_event_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

/// Cheap display summary of the most recent ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub timestamp: DateTime<Utc>,
    pub sender: String,
    pub snippet: String,
}
