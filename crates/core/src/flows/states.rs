use serde::{Deserialize, Serialize};

use crate::domain::decision::TaskParameter;
use crate::domain::task::TaskStatus;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEvent {
    Assigned,
    FirstReplyReceived,
    BlockerRaised,
    BlockerCleared,
    CompletionClaimed,
    CompletionApproved,
    CompletionRejected,
    CancelRequested,
}

/// Facts about the task that gate certain transitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    /// Parameter of the live negotiation, if any. A task cannot close while
    /// a negotiation is still open.
    pub open_negotiation: Option<TaskParameter>,
}

/// Follow-up work the caller performs after a transition lands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    ScheduleFollowUp,
    ClearFollowUp,
    RecordSystemNote,
    AnnotateScopeLog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}
