use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use handoff_core::domain::conversation::{ConversationEvent, SenderRole};
use handoff_core::domain::task::{Task, TaskStatus};
use handoff_core::flows::{DelegationFlow, FlowContext, FlowEngine, FlowEvent};

use crate::cleaning::clean_body;
use crate::message::InboundMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// False when the ledger rejected the event as a duplicate.
    pub appended: bool,
}

/// One side of the conversation. Handlers own nothing but the ledger append
/// and any role-specific lifecycle nudge; derived state is the
/// reconciliation engine's job, which the gateway runs right after.
#[async_trait]
pub trait InboundPathHandler: Send + Sync {
    async fn handle(
        &self,
        task: &mut Task,
        message: &InboundMessage,
        now: DateTime<Utc>,
    ) -> HandlerOutcome;
}

fn inbound_event(message: &InboundMessage, role: SenderRole) -> ConversationEvent {
    ConversationEvent::new(
        message.id.clone(),
        message.timestamp,
        role,
        normalize_sender(&message.from),
        "message",
        clean_body(&message.plain_body),
    )
    .with_raw_content(message.plain_body.clone())
}

fn normalize_sender(from: &str) -> String {
    crate::message::normalize_address(from)
}

/// Messages from the party the task was delegated to.
pub struct DelegatePathHandler {
    flow: FlowEngine<DelegationFlow>,
}

impl Default for DelegatePathHandler {
    fn default() -> Self {
        Self { flow: FlowEngine::default() }
    }
}

#[async_trait]
impl InboundPathHandler for DelegatePathHandler {
    async fn handle(
        &self,
        task: &mut Task,
        message: &InboundMessage,
        _now: DateTime<Utc>,
    ) -> HandlerOutcome {
        let appended = task.ledger.append(inbound_event(message, SenderRole::Delegate));

        // The delegate's first message is what activates the task.
        if appended && task.status == TaskStatus::AwaitingFirstResponse {
            match self.flow.apply(
                &task.status,
                &FlowEvent::FirstReplyReceived,
                &FlowContext::default(),
            ) {
                Ok(outcome) => task.status = outcome.to,
                Err(error) => {
                    debug!(task_id = %task.id.0, error = %error, "first-reply transition skipped");
                }
            }
        }

        HandlerOutcome { appended }
    }
}

/// Messages from the party that delegated the task.
#[derive(Default)]
pub struct DelegatorPathHandler;

#[async_trait]
impl InboundPathHandler for DelegatorPathHandler {
    async fn handle(
        &self,
        task: &mut Task,
        message: &InboundMessage,
        _now: DateTime<Utc>,
    ) -> HandlerOutcome {
        let appended = task.ledger.append(inbound_event(message, SenderRole::Delegator));
        HandlerOutcome { appended }
    }
}
