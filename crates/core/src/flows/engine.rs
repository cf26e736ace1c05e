use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::decision::TaskParameter;
use crate::domain::task::TaskStatus;
use crate::flows::states::{FlowAction, FlowContext, FlowEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> TaskStatus;
    fn transition(
        &self,
        current: &TaskStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// The one delegation lifecycle: drafted → awaiting_first_response →
/// active ⇄ blocked → completion_pending → closed, cancel from anywhere
/// short of closed.
#[derive(Clone, Debug, Default)]
pub struct DelegationFlow;

impl FlowDefinition for DelegationFlow {
    fn initial_state(&self) -> TaskStatus {
        TaskStatus::Drafted
    }

    fn transition(
        &self,
        current: &TaskStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_delegation(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> TaskStatus {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &TaskStatus,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &TaskStatus,
        event: &FlowEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::for_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::for_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<DelegationFlow> {
    fn default() -> Self {
        Self::new(DelegationFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("cannot close task while a {parameter:?} negotiation is still open")]
    OpenNegotiation { parameter: TaskParameter },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TaskStatus, event: FlowEvent },
}

fn transition_delegation(
    current: &TaskStatus,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{AnnotateScopeLog, ClearFollowUp, RecordSystemNote, ScheduleFollowUp};
    use FlowEvent::{
        Assigned, BlockerCleared, BlockerRaised, CancelRequested, CompletionApproved,
        CompletionClaimed, CompletionRejected, FirstReplyReceived,
    };
    use TaskStatus::{
        Active, AwaitingFirstResponse, Blocked, Cancelled, Closed, CompletionPending, Drafted,
    };

    let (to, actions) = match (current, event) {
        (Drafted, Assigned) => (AwaitingFirstResponse, vec![ScheduleFollowUp]),
        (AwaitingFirstResponse, FirstReplyReceived) => (Active, vec![ClearFollowUp]),
        (Active, BlockerRaised) => (Blocked, vec![RecordSystemNote]),
        (Blocked, BlockerCleared) => (Active, Vec::new()),
        (Active, CompletionClaimed) => (CompletionPending, Vec::new()),
        (CompletionPending, CompletionApproved) => {
            if let Some(parameter) = context.open_negotiation {
                return Err(FlowTransitionError::OpenNegotiation { parameter });
            }
            (Closed, vec![RecordSystemNote])
        }
        (CompletionPending, CompletionRejected) => (Active, vec![AnnotateScopeLog]),
        (Closed, CancelRequested) => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
        (_, CancelRequested) => (Cancelled, Vec::new()),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::decision::TaskParameter;
    use crate::domain::task::{TaskId, TaskStatus};
    use crate::flows::engine::{DelegationFlow, FlowEngine, FlowTransitionError};
    use crate::flows::states::{FlowAction, FlowContext, FlowEvent};

    #[test]
    fn delegation_happy_path_to_closed() {
        let engine = FlowEngine::new(DelegationFlow);
        let context = FlowContext::default();
        let mut state = engine.initial_state();

        for event in [
            FlowEvent::Assigned,
            FlowEvent::FirstReplyReceived,
            FlowEvent::CompletionClaimed,
            FlowEvent::CompletionApproved,
        ] {
            state = engine.apply(&state, &event, &context).expect("valid transition").to;
        }

        assert_eq!(state, TaskStatus::Closed);
    }

    #[test]
    fn blocked_is_reversible_back_to_active() {
        let engine = FlowEngine::default();
        let context = FlowContext::default();

        let blocked = engine
            .apply(&TaskStatus::Active, &FlowEvent::BlockerRaised, &context)
            .expect("active -> blocked");
        assert_eq!(blocked.to, TaskStatus::Blocked);
        assert!(blocked.actions.contains(&FlowAction::RecordSystemNote));

        let active = engine
            .apply(&blocked.to, &FlowEvent::BlockerCleared, &context)
            .expect("blocked -> active");
        assert_eq!(active.to, TaskStatus::Active);
    }

    #[test]
    fn completion_rejection_returns_to_active_with_annotation() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(
                &TaskStatus::CompletionPending,
                &FlowEvent::CompletionRejected,
                &FlowContext::default(),
            )
            .expect("rejection reopens the task");

        assert_eq!(outcome.to, TaskStatus::Active);
        assert_eq!(outcome.actions, vec![FlowAction::AnnotateScopeLog]);
    }

    #[test]
    fn completion_approval_is_refused_while_negotiation_is_open() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &TaskStatus::CompletionPending,
                &FlowEvent::CompletionApproved,
                &FlowContext { open_negotiation: Some(TaskParameter::DueDate) },
            )
            .expect_err("open negotiation must block closing");

        assert!(matches!(
            error,
            FlowTransitionError::OpenNegotiation { parameter: TaskParameter::DueDate }
        ));
    }

    #[test]
    fn cancel_is_reachable_from_any_state_except_closed() {
        let engine = FlowEngine::default();
        let context = FlowContext::default();

        for state in [
            TaskStatus::Drafted,
            TaskStatus::AwaitingFirstResponse,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::CompletionPending,
        ] {
            let outcome = engine
                .apply(&state, &FlowEvent::CancelRequested, &context)
                .expect("cancel should be allowed");
            assert_eq!(outcome.to, TaskStatus::Cancelled);
        }

        let error = engine
            .apply(&TaskStatus::Closed, &FlowEvent::CancelRequested, &context)
            .expect_err("closed tasks cannot be cancelled");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(&TaskStatus::Drafted, &FlowEvent::CompletionClaimed, &FlowContext::default())
            .expect_err("drafted task has no completion to claim");

        assert!(matches!(
            error,
            FlowTransitionError::InvalidTransition { state: TaskStatus::Drafted, .. }
        ));
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &TaskStatus::Drafted,
                &FlowEvent::Assigned,
                &FlowContext::default(),
                &sink,
                &AuditContext::new(
                    Some(TaskId("T-2026-0009".to_owned())),
                    None,
                    "req-42",
                    "flow-engine",
                ),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-42");
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("awaiting_first_response"));
    }
}
