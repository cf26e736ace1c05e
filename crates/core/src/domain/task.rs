use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decision::{PendingChange, PendingDecision};
use crate::domain::snapshot::{DerivedProvenance, DerivedSnapshot};
use crate::idempotency::ProcessedMessages;
use crate::ledger::ConversationLedger;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

/// Coarse lifecycle bucket, deliberately coarser than [`ConversationState`]:
/// negotiation churn happens entirely inside `Active`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Drafted,
    AwaitingFirstResponse,
    Active,
    Blocked,
    CompletionPending,
    Closed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafted => "drafted",
            Self::AwaitingFirstResponse => "awaiting_first_response",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::CompletionPending => "completion_pending",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "drafted" => Some(Self::Drafted),
            "awaiting_first_response" => Some(Self::AwaitingFirstResponse),
            "active" => Some(Self::Active),
            "blocked" => Some(Self::Blocked),
            "completion_pending" => Some(Self::CompletionPending),
            "closed" => Some(Self::Closed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Cancelled)
    }
}

/// Fine-grained conversation state derived from the message stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Active,
    UpdateReceived,
    ChangeRequested,
    CompletionPending,
    BlockerReported,
    AwaitingCounterpart,
    AwaitingConfirmation,
    CounterpartProposed,
    Negotiating,
    Resolved,
    Rejected,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::UpdateReceived => "update_received",
            Self::ChangeRequested => "change_requested",
            Self::CompletionPending => "completion_pending",
            Self::BlockerReported => "blocker_reported",
            Self::AwaitingCounterpart => "awaiting_counterpart",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::CounterpartProposed => "counterpart_proposed",
            Self::Negotiating => "negotiating",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "update_received" => Some(Self::UpdateReceived),
            "change_requested" => Some(Self::ChangeRequested),
            "completion_pending" => Some(Self::CompletionPending),
            "blocker_reported" => Some(Self::BlockerReported),
            "awaiting_counterpart" => Some(Self::AwaitingCounterpart),
            "awaiting_confirmation" => Some(Self::AwaitingConfirmation),
            "counterpart_proposed" => Some(Self::CounterpartProposed),
            "negotiating" => Some(Self::Negotiating),
            "resolved" => Some(Self::Resolved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// One of the two fixed parties on a task's conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    pub address: String,
}

/// Effective task parameters. Mutated only through decision application,
/// never directly from classifier output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskParams {
    pub name: String,
    pub due_date: Option<NaiveDate>,
    pub scope: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub conversation_state: ConversationState,
    pub params: TaskParams,
    pub delegator: Party,
    pub delegate: Party,
    /// Conversation/thread identifier the messaging collaborator assigns.
    pub thread_ref: Option<String>,
    pub pending_changes: Vec<PendingChange>,
    pub pending_decision: Option<PendingDecision>,
    pub derived_snapshot: DerivedSnapshot,
    pub derived_provenance: DerivedProvenance,
    pub ledger: ConversationLedger,
    pub processed: ProcessedMessages,
    pub analysis_summary: Option<String>,
    pub last_analyzed_at: Option<DateTime<Utc>>,
    /// Set by the messaging collaborator when a follow-up nudge goes out.
    /// Typed marker, not a scan over the ledger.
    pub follow_up_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        id: TaskId,
        params: TaskParams,
        delegator: Party,
        delegate: Party,
        thread_ref: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: TaskStatus::Drafted,
            conversation_state: ConversationState::Active,
            params,
            delegator,
            delegate,
            thread_ref,
            pending_changes: Vec::new(),
            pending_decision: None,
            derived_snapshot: DerivedSnapshot::default(),
            derived_provenance: DerivedProvenance::default(),
            ledger: ConversationLedger::default(),
            processed: ProcessedMessages::default(),
            analysis_summary: None,
            last_analyzed_at: None,
            follow_up_sent_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationState, TaskStatus};

    #[test]
    fn task_status_round_trips_from_storage_encoding() {
        let cases = [
            TaskStatus::Drafted,
            TaskStatus::AwaitingFirstResponse,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::CompletionPending,
            TaskStatus::Closed,
            TaskStatus::Cancelled,
        ];

        for status in cases {
            let decoded = TaskStatus::parse(status.as_str());
            assert_eq!(decoded, Some(status));
        }
    }

    #[test]
    fn conversation_state_round_trips_from_storage_encoding() {
        let cases = [
            ConversationState::Active,
            ConversationState::UpdateReceived,
            ConversationState::ChangeRequested,
            ConversationState::CompletionPending,
            ConversationState::BlockerReported,
            ConversationState::AwaitingCounterpart,
            ConversationState::AwaitingConfirmation,
            ConversationState::CounterpartProposed,
            ConversationState::Negotiating,
            ConversationState::Resolved,
            ConversationState::Rejected,
        ];

        for state in cases {
            let decoded = ConversationState::parse(state.as_str());
            assert_eq!(decoded, Some(state));
        }
    }

    #[test]
    fn unknown_state_strings_do_not_parse() {
        assert_eq!(ConversationState::parse("definitely_not_a_state"), None);
        assert_eq!(TaskStatus::parse(""), None);
    }

    #[test]
    fn terminal_statuses_are_closed_and_cancelled() {
        assert!(TaskStatus::Closed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }
}
