use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use handoff_core::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink,
};
use handoff_core::decision::{ChangeProposal, DecisionManager, DecisionOutcome};
use handoff_core::domain::conversation::{ConversationEvent, SenderRole};
use handoff_core::domain::decision::{ChangeStatus, PendingChange, TaskParameter};
use handoff_core::domain::snapshot::{
    apply_field, DerivedSnapshot, FieldProvenance, FieldValue, SnapshotField,
};
use handoff_core::domain::task::{ConversationState, Task, TaskStatus};
use handoff_core::flows::{DelegationFlow, FlowContext, FlowEngine, FlowEvent};

use crate::classify::{
    validated_state, ClassificationAdapter, ClassificationRequest, ClassifierOutcome,
    ExtractedChange, MessageIntent,
};
use crate::dates;

struct LatestMessage {
    id: String,
    sender: SenderRole,
    content: String,
}

/// Merges classifier output into durable task state.
///
/// Safe to re-invoke on the same ledger contents: decision routing is
/// driven through the slot protocol (which ignores settled steps), invalid
/// lifecycle transitions are dropped, and the field merge is value-based.
/// Classifier failures degrade to "no new information".
pub struct ReconciliationEngine<A> {
    adapter: A,
    decisions: DecisionManager,
    flow: FlowEngine<DelegationFlow>,
    sink: Arc<dyn AuditSink>,
}

impl<A> ReconciliationEngine<A>
where
    A: ClassificationAdapter,
{
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            decisions: DecisionManager,
            flow: FlowEngine::default(),
            sink: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Rebuilds derived state from the ledger. Never fails: a classifier
    /// error leaves every stored field untouched and returns the prior
    /// snapshot.
    pub async fn reconcile(&self, task: &mut Task, now: DateTime<Utc>) -> DerivedSnapshot {
        let request = ClassificationRequest::for_task(task);
        let outcome = match self.adapter.classify(&request).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(
                    task_id = %task.id.0,
                    error = %error,
                    "classification failed; retaining prior derived state"
                );
                self.sink.emit(AuditEvent::new(
                    Some(task.id.clone()),
                    None,
                    "reconcile",
                    "reconcile.classifier_failed",
                    AuditCategory::Reconcile,
                    "reconciliation-engine",
                    AuditOutcome::Failed,
                ));
                return task.derived_snapshot.clone();
            }
        };

        let mut state = validated_state(&outcome.conversation_state);
        let latest = task.ledger.latest_party_event().map(|event| LatestMessage {
            id: event.id.clone(),
            sender: event.sender_role,
            content: event.content.clone(),
        });

        // The adapter only reliably detects new requests, not the absence of
        // old ones: an empty list keeps whatever was already outstanding.
        if !outcome.pending_changes.is_empty() {
            task.pending_changes =
                outcome.pending_changes.iter().map(materialize_change).collect();
        }

        if let Some(latest) = &latest {
            self.route_decision(task, &outcome, latest, now, &mut state);
        }

        self.enforce_awaiting_override(task, &mut state);
        self.merge_snapshot(task, &outcome, now);
        self.fill_proposed_date_fallback(task, latest.as_ref(), now);
        self.advance_lifecycle(task, &state, &outcome, latest.as_ref());

        task.conversation_state = state;
        if !outcome.summary.trim().is_empty() {
            task.analysis_summary = Some(outcome.summary.trim().to_string());
        }
        task.last_analyzed_at = Some(now);
        task.updated_at = now;

        task.derived_snapshot.clone()
    }

    fn route_decision(
        &self,
        task: &mut Task,
        outcome: &ClassifierOutcome,
        latest: &LatestMessage,
        now: DateTime<Utc>,
        state: &mut ConversationState,
    ) {
        match outcome.latest_intent {
            MessageIntent::ChangeRequest => {
                for change in &outcome.pending_changes {
                    if !change.requires_approval {
                        continue;
                    }
                    let proposal = ChangeProposal {
                        parameter: change.parameter,
                        current_value: change
                            .current_value
                            .clone()
                            .or_else(|| current_value_of(task, change.parameter)),
                        proposed_value: change.proposed_value.clone(),
                        // The message sender outranks the wire attribution.
                        requested_by: latest.sender,
                        message_id: latest.id.clone(),
                    };
                    let step =
                        self.decisions.propose(task.pending_decision.as_ref(), proposal, now);
                    self.apply_decision_step(task, step, latest, now, state);
                }
            }
            MessageIntent::Acceptance => {
                let step =
                    self.decisions.accept(task.pending_decision.as_ref(), latest.sender, &latest.id);
                self.apply_decision_step(task, step, latest, now, state);
            }
            MessageIntent::Rejection => {
                let step = self.decisions.reject(task.pending_decision.as_ref(), latest.sender);
                self.apply_decision_step(task, step, latest, now, state);
            }
            _ => {}
        }
    }

    fn apply_decision_step(
        &self,
        task: &mut Task,
        step: DecisionOutcome,
        latest: &LatestMessage,
        now: DateTime<Utc>,
        state: &mut ConversationState,
    ) {
        if let Some(new_state) = step.conversation_state() {
            *state = new_state;
        }
        if let Some(slot) = step.slot() {
            task.pending_decision = slot;
        }

        match &step {
            DecisionOutcome::Applied { parameter, value, summary } => {
                self.apply_effective_value(task, *parameter, value, &latest.id, now);
                task.ledger.append(ConversationEvent::system_note(summary.clone(), now));
                mark_changes(task, *parameter, ChangeStatus::Confirmed);
                self.emit_decision_event(task, latest, "decision.applied", AuditOutcome::Success);
            }
            DecisionOutcome::Rejected { parameter, summary } => {
                task.ledger.append(ConversationEvent::system_note(summary.clone(), now));
                mark_changes(task, *parameter, ChangeStatus::Rejected);
                self.emit_decision_event(task, latest, "decision.rejected", AuditOutcome::Success);
            }
            DecisionOutcome::ConfirmationRequested { .. } => {
                mark_changes_approved(task);
                self.emit_decision_event(
                    task,
                    latest,
                    "decision.confirmation_requested",
                    AuditOutcome::Success,
                );
            }
            DecisionOutcome::Ignored { reason } => {
                debug!(task_id = %task.id.0, reason, "decision step ignored");
            }
            _ => {}
        }
    }

    fn apply_effective_value(
        &self,
        task: &mut Task,
        parameter: TaskParameter,
        value: &str,
        message_id: &str,
        now: DateTime<Utc>,
    ) {
        let provenance = FieldProvenance {
            source_message_id: message_id.to_string(),
            source_snippet: format!("confirmed: {value}"),
            confidence: 1.0,
            extracted_at: now,
        };

        match parameter {
            TaskParameter::DueDate => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                Ok(date) => {
                    task.params.due_date = Some(date);
                    apply_field(
                        &mut task.derived_snapshot,
                        &mut task.derived_provenance,
                        SnapshotField::DueDateEffective,
                        FieldValue::Date(date),
                        provenance,
                    );
                    task.derived_snapshot
                        .clear_field(SnapshotField::DueDateProposed, &mut task.derived_provenance);
                }
                Err(_) => {
                    warn!(
                        task_id = %task.id.0,
                        value,
                        "confirmed due date is not ISO formatted; effective value unchanged"
                    );
                }
            },
            TaskParameter::Name => {
                task.params.name = value.to_string();
                apply_field(
                    &mut task.derived_snapshot,
                    &mut task.derived_provenance,
                    SnapshotField::Name,
                    FieldValue::Text(value.to_string()),
                    provenance,
                );
            }
            TaskParameter::Scope => {
                task.params.scope = value.to_string();
            }
        }
    }

    /// A live negotiation can only be cleared by an explicit confirmation or
    /// rejection message; the classifier asserting `resolved` or `active` on
    /// its own is overridden back to the matching awaiting state.
    fn enforce_awaiting_override(&self, task: &Task, state: &mut ConversationState) {
        let Some(decision) = &task.pending_decision else {
            return;
        };
        if !matches!(state, ConversationState::Resolved | ConversationState::Active) {
            return;
        }

        let forced = if decision.awaiting_final_confirmation() {
            ConversationState::AwaitingConfirmation
        } else {
            ConversationState::AwaitingCounterpart
        };
        warn!(
            task_id = %task.id.0,
            proposed = state.as_str(),
            forced = forced.as_str(),
            awaiting = decision.awaiting_from.as_str(),
            "classifier proposed clearing an open negotiation; overriding"
        );
        self.sink.emit(
            AuditEvent::new(
                Some(task.id.clone()),
                None,
                "reconcile",
                "reconcile.awaiting_override",
                AuditCategory::Reconcile,
                "reconciliation-engine",
                AuditOutcome::Rejected,
            )
            .with_metadata("proposed", state.as_str())
            .with_metadata("forced", forced.as_str()),
        );
        *state = forced;
    }

    fn merge_snapshot(&self, task: &mut Task, outcome: &ClassifierOutcome, now: DateTime<Utc>) {
        let provenance_for = |field: SnapshotField| {
            outcome.provenance.get(&field).cloned().unwrap_or(FieldProvenance {
                source_message_id: String::new(),
                source_snippet: String::new(),
                confidence: 0.0,
                extracted_at: now,
            })
        };

        if let Some(name) = &outcome.task_snapshot.name {
            apply_field(
                &mut task.derived_snapshot,
                &mut task.derived_provenance,
                SnapshotField::Name,
                FieldValue::Text(name.clone()),
                provenance_for(SnapshotField::Name),
            );
        }
        if let Some(date) = outcome.task_snapshot.due_date_effective {
            apply_field(
                &mut task.derived_snapshot,
                &mut task.derived_provenance,
                SnapshotField::DueDateEffective,
                FieldValue::Date(date),
                provenance_for(SnapshotField::DueDateEffective),
            );
        }
        if let Some(date) = outcome.task_snapshot.due_date_proposed {
            apply_field(
                &mut task.derived_snapshot,
                &mut task.derived_provenance,
                SnapshotField::DueDateProposed,
                FieldValue::Date(date),
                provenance_for(SnapshotField::DueDateProposed),
            );
        }
        if let Some(scope) = &outcome.task_snapshot.scope_summary {
            apply_field(
                &mut task.derived_snapshot,
                &mut task.derived_provenance,
                SnapshotField::ScopeSummary,
                FieldValue::Text(scope.clone()),
                provenance_for(SnapshotField::ScopeSummary),
            );
        }
    }

    /// Second, lower-priority extractor: a deterministic date scan may fill
    /// a proposed due date the classifier left empty, never replace one.
    fn fill_proposed_date_fallback(
        &self,
        task: &mut Task,
        latest: Option<&LatestMessage>,
        now: DateTime<Utc>,
    ) {
        if !task.derived_snapshot.field_is_empty(SnapshotField::DueDateProposed) {
            return;
        }
        let Some(latest) = latest else {
            return;
        };
        let Some(extracted) = dates::extract_due_date(&latest.content, now.date_naive()) else {
            return;
        };

        apply_field(
            &mut task.derived_snapshot,
            &mut task.derived_provenance,
            SnapshotField::DueDateProposed,
            FieldValue::Date(extracted.date),
            FieldProvenance {
                source_message_id: latest.id.clone(),
                source_snippet: extracted.snippet,
                confidence: dates::FALLBACK_CONFIDENCE,
                extracted_at: now,
            },
        );
    }

    fn advance_lifecycle(
        &self,
        task: &mut Task,
        state: &ConversationState,
        outcome: &ClassifierOutcome,
        latest: Option<&LatestMessage>,
    ) {
        let sender = latest.map(|message| message.sender);
        let mut events = Vec::new();

        match outcome.latest_intent {
            MessageIntent::BlockerReport => events.push(FlowEvent::BlockerRaised),
            MessageIntent::CompletionClaim if sender == Some(SenderRole::Delegate) => {
                events.push(FlowEvent::CompletionClaimed);
            }
            MessageIntent::CompletionApproval if sender == Some(SenderRole::Delegator) => {
                events.push(FlowEvent::CompletionApproved);
            }
            MessageIntent::CompletionRejection if sender == Some(SenderRole::Delegator) => {
                events.push(FlowEvent::CompletionRejected);
            }
            _ => match state {
                ConversationState::BlockerReported => events.push(FlowEvent::BlockerRaised),
                ConversationState::CompletionPending => events.push(FlowEvent::CompletionClaimed),
                _ => {}
            },
        }

        if task.status == TaskStatus::Blocked
            && matches!(
                state,
                ConversationState::Active
                    | ConversationState::UpdateReceived
                    | ConversationState::Resolved
            )
        {
            events.push(FlowEvent::BlockerCleared);
        }

        for event in events {
            let context = FlowContext {
                open_negotiation: task.pending_decision.as_ref().map(|d| d.parameter),
            };
            let audit = AuditContext::new(
                Some(task.id.clone()),
                latest.map(|message| message.id.clone()),
                "reconcile",
                "reconciliation-engine",
            );
            match self.flow.apply_with_audit(&task.status, &event, &context, self.sink.as_ref(), &audit)
            {
                Ok(transition) => task.status = transition.to,
                Err(error) => {
                    // Replays and stale classifier signals land here; the
                    // current status is already correct.
                    debug!(task_id = %task.id.0, error = %error, "lifecycle event skipped");
                }
            }
        }
    }

    fn emit_decision_event(
        &self,
        task: &Task,
        latest: &LatestMessage,
        event_type: &str,
        outcome: AuditOutcome,
    ) {
        self.sink.emit(AuditEvent::new(
            Some(task.id.clone()),
            Some(latest.id.clone()),
            "reconcile",
            event_type,
            AuditCategory::Decision,
            "reconciliation-engine",
            outcome,
        ));
    }
}

fn materialize_change(change: &ExtractedChange) -> PendingChange {
    PendingChange {
        id: change_key(change.parameter, &change.proposed_value),
        parameter: change.parameter,
        change_type: format!("{}_change", change.parameter.as_str()),
        current_value: change.current_value.clone(),
        proposed_value: change.proposed_value.clone(),
        requested_by: change.requested_by,
        awaiting_from: change.requires_approval.then(|| change.requested_by.counterpart()),
        requires_approval: change.requires_approval,
        status: ChangeStatus::Pending,
        reasoning: change.reasoning.clone(),
    }
}

/// Deterministic id so re-running on the same ledger yields the same list.
fn change_key(parameter: TaskParameter, proposed_value: &str) -> String {
    let slug: String = proposed_value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(24)
        .collect();
    format!("chg-{}-{}", parameter.as_str(), slug.to_ascii_lowercase())
}

fn current_value_of(task: &Task, parameter: TaskParameter) -> Option<String> {
    match parameter {
        TaskParameter::Name => Some(task.params.name.clone()),
        TaskParameter::DueDate => {
            task.params.due_date.map(|date| date.format("%Y-%m-%d").to_string())
        }
        TaskParameter::Scope => Some(task.params.scope.clone()),
    }
}

fn mark_changes(task: &mut Task, parameter: TaskParameter, status: ChangeStatus) {
    for change in &mut task.pending_changes {
        if change.parameter == parameter {
            change.status = status.clone();
            change.awaiting_from = None;
        }
    }
}

fn mark_changes_approved(task: &mut Task) {
    let Some((parameter, awaiting_from)) =
        task.pending_decision.as_ref().map(|decision| (decision.parameter, decision.awaiting_from))
    else {
        return;
    };
    for change in &mut task.pending_changes {
        if change.parameter == parameter {
            change.status = ChangeStatus::Approved;
            change.awaiting_from = Some(awaiting_from);
        }
    }
}
