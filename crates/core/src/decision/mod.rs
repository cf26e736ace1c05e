use chrono::{DateTime, Utc};

use crate::domain::conversation::SenderRole;
use crate::domain::decision::{PendingDecision, TaskParameter};
use crate::domain::task::ConversationState;

/// A freshly raised change request, before it enters the slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeProposal {
    pub parameter: TaskParameter,
    pub current_value: Option<String>,
    pub proposed_value: String,
    pub requested_by: SenderRole,
    pub message_id: String,
}

/// Result of driving the negotiation slot one step. The caller owns writing
/// the new slot value and conversation state back onto the task.
#[derive(Clone, Debug, PartialEq)]
pub enum DecisionOutcome {
    /// A new negotiation opened; the counterpart must respond.
    Opened { decision: PendingDecision },
    /// The same proposal was raised again; the slot is unchanged.
    Reaffirmed { decision: PendingDecision },
    /// The requester revised their own ask; roles unchanged.
    Revised { decision: PendingDecision },
    /// The awaited party answered with a different value; roles flipped and
    /// the old proposal was discarded in favor of the new one.
    Countered { decision: PendingDecision },
    /// The delegator approved; the original requester must now confirm.
    ConfirmationRequested { decision: PendingDecision },
    /// The awaited party confirmed; the proposed value is now effective.
    Applied { parameter: TaskParameter, value: String, summary: String },
    /// The negotiation was explicitly declined or withdrawn.
    Rejected { parameter: TaskParameter, summary: String },
    /// Nothing to do (no open slot, wrong party, occupied slot).
    Ignored { reason: &'static str },
}

impl DecisionOutcome {
    /// Conversation state this step lands the task in, when it implies one.
    pub fn conversation_state(&self) -> Option<ConversationState> {
        match self {
            Self::Opened { .. } | Self::Revised { .. } => Some(ConversationState::ChangeRequested),
            Self::Reaffirmed { decision } => Some(if decision.awaiting_final_confirmation() {
                ConversationState::AwaitingConfirmation
            } else {
                ConversationState::ChangeRequested
            }),
            Self::Countered { .. } => Some(ConversationState::CounterpartProposed),
            Self::ConfirmationRequested { .. } => Some(ConversationState::AwaitingConfirmation),
            Self::Applied { .. } => Some(ConversationState::Resolved),
            Self::Rejected { .. } => Some(ConversationState::Rejected),
            Self::Ignored { .. } => None,
        }
    }

    /// New slot contents after this step, for outcomes that change it.
    /// `Ignored` and `Reaffirmed` leave the existing slot in place.
    pub fn slot(&self) -> Option<Option<PendingDecision>> {
        match self {
            Self::Opened { decision }
            | Self::Revised { decision }
            | Self::Countered { decision }
            | Self::ConfirmationRequested { decision } => Some(Some(decision.clone())),
            Self::Applied { .. } | Self::Rejected { .. } => Some(None),
            Self::Reaffirmed { .. } | Self::Ignored { .. } => None,
        }
    }
}

/// Single-slot two-party negotiation protocol.
///
/// One proposal per parameter is live at a time. A slot clears only through
/// explicit confirmation, explicit rejection, or replacement by a
/// counter-proposal; it never silently vanishes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecisionManager;

impl DecisionManager {
    pub fn propose(
        &self,
        slot: Option<&PendingDecision>,
        proposal: ChangeProposal,
        now: DateTime<Utc>,
    ) -> DecisionOutcome {
        let Some(open) = slot else {
            return DecisionOutcome::Opened { decision: new_decision(proposal, now) };
        };

        if open.parameter != proposal.parameter {
            // The live negotiation is never evicted by a request for a
            // different parameter; that request stays in pending_changes.
            return DecisionOutcome::Ignored { reason: "negotiation open for another parameter" };
        }

        if open.proposed_value == proposal.proposed_value {
            return DecisionOutcome::Reaffirmed { decision: open.clone() };
        }

        // Any new value restarts the negotiation with the proposer as the
        // requester and the counterpart awaited; a mid-confirmation revision
        // therefore goes back for approval instead of self-confirming.
        let roles_flipped = proposal.requested_by != open.requested_by;
        let decision = PendingDecision {
            parameter: proposal.parameter,
            current_value: open.current_value.clone(),
            proposed_value: proposal.proposed_value,
            requested_by: proposal.requested_by,
            awaiting_from: proposal.requested_by.counterpart(),
            message_id: proposal.message_id,
            created_at: now,
        };
        if roles_flipped {
            // Counter-proposal: the old proposal is discarded, not dropped.
            DecisionOutcome::Countered { decision }
        } else {
            DecisionOutcome::Revised { decision }
        }
    }

    /// The awaited party accepted. The delegate's acceptance is final and
    /// applies the value; the delegator's acceptance of a delegate-raised
    /// change hands the slot back to the delegate for a confirmation leg.
    pub fn accept(
        &self,
        slot: Option<&PendingDecision>,
        by: SenderRole,
        _message_id: &str,
    ) -> DecisionOutcome {
        let Some(open) = slot else {
            return DecisionOutcome::Ignored { reason: "no open negotiation" };
        };
        if by != open.awaiting_from {
            return DecisionOutcome::Ignored { reason: "acceptance from non-awaited party" };
        }

        match by {
            SenderRole::Delegate => DecisionOutcome::Applied {
                parameter: open.parameter,
                value: open.proposed_value.clone(),
                summary: format!(
                    "{} updated to {} after confirmation from the delegate.",
                    parameter_label(open.parameter),
                    open.proposed_value
                ),
            },
            SenderRole::Delegator => {
                let decision =
                    PendingDecision { awaiting_from: SenderRole::Delegate, ..open.clone() };
                DecisionOutcome::ConfirmationRequested { decision }
            }
            SenderRole::System => DecisionOutcome::Ignored { reason: "system cannot accept" },
        }
    }

    /// Either party may clear the slot: the awaited party declining, or the
    /// requester withdrawing. The task is left awaiting the requester's next
    /// move, never resolved.
    pub fn reject(&self, slot: Option<&PendingDecision>, by: SenderRole) -> DecisionOutcome {
        let Some(open) = slot else {
            return DecisionOutcome::Ignored { reason: "no open negotiation" };
        };
        if by == SenderRole::System {
            return DecisionOutcome::Ignored { reason: "system cannot reject" };
        }

        let action = if by == open.requested_by { "withdrawn by" } else { "declined by" };
        DecisionOutcome::Rejected {
            parameter: open.parameter,
            summary: format!(
                "Proposed {} change to {} was {} the {}.",
                parameter_label(open.parameter),
                open.proposed_value,
                action,
                by.as_str()
            ),
        }
    }
}

fn new_decision(proposal: ChangeProposal, now: DateTime<Utc>) -> PendingDecision {
    PendingDecision {
        parameter: proposal.parameter,
        current_value: proposal.current_value,
        proposed_value: proposal.proposed_value,
        requested_by: proposal.requested_by,
        awaiting_from: proposal.requested_by.counterpart(),
        message_id: proposal.message_id,
        created_at: now,
    }
}

fn parameter_label(parameter: TaskParameter) -> &'static str {
    match parameter {
        TaskParameter::Name => "Task name",
        TaskParameter::DueDate => "Due date",
        TaskParameter::Scope => "Scope",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ChangeProposal, DecisionManager, DecisionOutcome};
    use crate::domain::conversation::SenderRole;
    use crate::domain::decision::{PendingDecision, TaskParameter};
    use crate::domain::task::ConversationState;

    fn proposal(value: &str, by: SenderRole) -> ChangeProposal {
        ChangeProposal {
            parameter: TaskParameter::DueDate,
            current_value: Some("2026-01-10".to_string()),
            proposed_value: value.to_string(),
            requested_by: by,
            message_id: "msg-1".to_string(),
        }
    }

    fn open_decision(value: &str, requested_by: SenderRole) -> PendingDecision {
        PendingDecision {
            parameter: TaskParameter::DueDate,
            current_value: Some("2026-01-10".to_string()),
            proposed_value: value.to_string(),
            requested_by,
            awaiting_from: requested_by.counterpart(),
            message_id: "msg-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn proposal_opens_slot_awaiting_the_counterpart() {
        let manager = DecisionManager;
        let outcome = manager.propose(None, proposal("2026-01-15", SenderRole::Delegate), Utc::now());

        let DecisionOutcome::Opened { decision } = &outcome else {
            panic!("expected Opened, got {outcome:?}");
        };
        assert_eq!(decision.requested_by, SenderRole::Delegate);
        assert_eq!(decision.awaiting_from, SenderRole::Delegator);
        assert_eq!(decision.proposed_value, "2026-01-15");
        assert_eq!(outcome.conversation_state(), Some(ConversationState::ChangeRequested));
    }

    #[test]
    fn delegator_acceptance_requests_final_confirmation() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome = manager.accept(Some(&open), SenderRole::Delegator, "msg-2");

        let DecisionOutcome::ConfirmationRequested { decision } = &outcome else {
            panic!("expected ConfirmationRequested, got {outcome:?}");
        };
        assert_eq!(decision.awaiting_from, SenderRole::Delegate);
        assert_eq!(decision.requested_by, SenderRole::Delegate);
        assert!(decision.awaiting_final_confirmation());
        assert_eq!(outcome.conversation_state(), Some(ConversationState::AwaitingConfirmation));
    }

    #[test]
    fn delegate_confirmation_applies_the_proposed_value() {
        let manager = DecisionManager;
        let mut open = open_decision("2026-01-15", SenderRole::Delegate);
        open.awaiting_from = SenderRole::Delegate;

        let outcome = manager.accept(Some(&open), SenderRole::Delegate, "msg-3");

        let DecisionOutcome::Applied { parameter, value, summary } = &outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(*parameter, TaskParameter::DueDate);
        assert_eq!(value, "2026-01-15");
        assert!(summary.contains("2026-01-15"));
        assert_eq!(outcome.conversation_state(), Some(ConversationState::Resolved));
        assert_eq!(outcome.slot(), Some(None));
    }

    #[test]
    fn delegate_acceptance_of_delegator_proposal_applies_directly() {
        let manager = DecisionManager;
        let open = open_decision("2026-02-01", SenderRole::Delegator);

        let outcome = manager.accept(Some(&open), SenderRole::Delegate, "msg-2");

        assert!(matches!(outcome, DecisionOutcome::Applied { .. }));
    }

    #[test]
    fn counter_proposal_flips_roles_and_never_clears_the_slot() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome = manager.propose(
            Some(&open),
            ChangeProposal {
                parameter: TaskParameter::DueDate,
                current_value: Some("2026-01-10".to_string()),
                proposed_value: "2026-01-20".to_string(),
                requested_by: SenderRole::Delegator,
                message_id: "msg-2".to_string(),
            },
            Utc::now(),
        );

        let DecisionOutcome::Countered { decision } = &outcome else {
            panic!("expected Countered, got {outcome:?}");
        };
        assert_eq!(decision.requested_by, SenderRole::Delegator);
        assert_eq!(decision.awaiting_from, SenderRole::Delegate);
        assert_eq!(decision.proposed_value, "2026-01-20");
        assert_eq!(outcome.conversation_state(), Some(ConversationState::CounterpartProposed));
        assert!(outcome.slot().expect("slot update").is_some());
    }

    #[test]
    fn identical_reproposal_is_reaffirmed_without_slot_change() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome =
            manager.propose(Some(&open), proposal("2026-01-15", SenderRole::Delegate), Utc::now());

        assert!(matches!(outcome, DecisionOutcome::Reaffirmed { .. }));
        assert_eq!(outcome.slot(), None);
    }

    #[test]
    fn requester_can_revise_own_ask_without_flipping_roles() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome =
            manager.propose(Some(&open), proposal("2026-01-22", SenderRole::Delegate), Utc::now());

        let DecisionOutcome::Revised { decision } = &outcome else {
            panic!("expected Revised, got {outcome:?}");
        };
        assert_eq!(decision.requested_by, SenderRole::Delegate);
        assert_eq!(decision.awaiting_from, SenderRole::Delegator);
        assert_eq!(decision.proposed_value, "2026-01-22");
    }

    #[test]
    fn rejection_clears_slot_and_never_lands_on_resolved() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome = manager.reject(Some(&open), SenderRole::Delegator);

        assert!(matches!(outcome, DecisionOutcome::Rejected { .. }));
        assert_eq!(outcome.conversation_state(), Some(ConversationState::Rejected));
        assert_eq!(outcome.slot(), Some(None));
    }

    #[test]
    fn different_parameter_proposal_does_not_evict_live_slot() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome = manager.propose(
            Some(&open),
            ChangeProposal {
                parameter: TaskParameter::Scope,
                current_value: None,
                proposed_value: "add the appendix".to_string(),
                requested_by: SenderRole::Delegator,
                message_id: "msg-9".to_string(),
            },
            Utc::now(),
        );

        assert!(matches!(outcome, DecisionOutcome::Ignored { .. }));
        assert_eq!(outcome.slot(), None);
    }

    #[test]
    fn acceptance_from_the_wrong_party_is_ignored() {
        let manager = DecisionManager;
        let open = open_decision("2026-01-15", SenderRole::Delegate);

        let outcome = manager.accept(Some(&open), SenderRole::Delegate, "msg-2");
        assert!(matches!(outcome, DecisionOutcome::Ignored { .. }));

        let outcome = manager.accept(None, SenderRole::Delegator, "msg-2");
        assert!(matches!(outcome, DecisionOutcome::Ignored { .. }));
    }
}
