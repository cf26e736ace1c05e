use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::SenderRole;

/// Task parameter a change request can target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskParameter {
    Name,
    DueDate,
    Scope,
}

impl TaskParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::DueDate => "due_date",
            Self::Scope => "scope",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "due_date" | "duedate" | "due" => Some(Self::DueDate),
            "scope" => Some(Self::Scope),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
    Confirmed,
}

/// One outstanding change request extracted from the conversation. These are
/// facts the classifier surfaced; the confirmation protocol itself runs on
/// the single [`PendingDecision`] slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: String,
    pub parameter: TaskParameter,
    pub change_type: String,
    pub current_value: Option<String>,
    pub proposed_value: String,
    pub requested_by: SenderRole,
    pub awaiting_from: Option<SenderRole>,
    pub requires_approval: bool,
    pub status: ChangeStatus,
    pub reasoning: String,
}

/// The one live two-party negotiation. Values are canonical strings (dates
/// in ISO `YYYY-MM-DD`) so one slot serves every parameter.
///
/// `awaiting_from == requested_by` marks the final confirmation leg: the
/// counterpart has approved and the ball is back with the original
/// requester to confirm before the value becomes effective.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub parameter: TaskParameter,
    pub current_value: Option<String>,
    pub proposed_value: String,
    pub requested_by: SenderRole,
    pub awaiting_from: SenderRole,
    pub message_id: String,
    pub created_at: DateTime<Utc>,
}

impl PendingDecision {
    pub fn awaiting_final_confirmation(&self) -> bool {
        self.awaiting_from == self.requested_by
    }
}
