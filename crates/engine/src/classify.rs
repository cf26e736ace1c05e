use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use handoff_core::domain::conversation::SenderRole;
use handoff_core::domain::decision::{PendingChange, PendingDecision, TaskParameter};
use handoff_core::domain::snapshot::DerivedProvenance;
use handoff_core::domain::task::{ConversationState, Task, TaskParams, TaskStatus};

/// What the classifier decided the latest message is doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageIntent {
    Update,
    ChangeRequest,
    Acceptance,
    Rejection,
    CompletionClaim,
    CompletionApproval,
    CompletionRejection,
    BlockerReport,
    Question,
    Other,
}

impl MessageIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::ChangeRequest => "change_request",
            Self::Acceptance => "acceptance",
            Self::Rejection => "rejection",
            Self::CompletionClaim => "completion_claim",
            Self::CompletionApproval => "completion_approval",
            Self::CompletionRejection => "completion_rejection",
            Self::BlockerReport => "blocker_report",
            Self::Question => "question",
            Self::Other => "other",
        }
    }

    /// Unknown intent strings degrade to `Other`, never to an error.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "update" => Self::Update,
            "change_request" => Self::ChangeRequest,
            "acceptance" | "confirmation" => Self::Acceptance,
            "rejection" => Self::Rejection,
            "completion_claim" => Self::CompletionClaim,
            "completion_approval" => Self::CompletionApproval,
            "completion_rejection" => Self::CompletionRejection,
            "blocker_report" => Self::BlockerReport,
            "question" => Self::Question,
            _ => Self::Other,
        }
    }
}

/// One chronological transcript line handed to the classifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranscriptLine {
    pub message_id: String,
    pub sender_role: SenderRole,
    pub sender: String,
    pub content: String,
}

/// Everything the classifier sees for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassificationRequest {
    pub transcript: Vec<TranscriptLine>,
    pub params: TaskParams,
    pub pending_changes: Vec<PendingChange>,
    pub pending_decision: Option<PendingDecision>,
    pub status: TaskStatus,
}

impl ClassificationRequest {
    pub fn for_task(task: &Task) -> Self {
        let transcript = task
            .ledger
            .events()
            .iter()
            .map(|event| TranscriptLine {
                message_id: event.id.clone(),
                sender_role: event.sender_role,
                sender: event.sender_identity.clone(),
                content: event.content.clone(),
            })
            .collect();

        Self {
            transcript,
            params: task.params.clone(),
            pending_changes: task.pending_changes.clone(),
            pending_decision: task.pending_decision.clone(),
            status: task.status.clone(),
        }
    }
}

/// A structured change request the classifier extracted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedChange {
    pub parameter: TaskParameter,
    pub current_value: Option<String>,
    pub proposed_value: String,
    pub requested_by: SenderRole,
    pub requires_approval: bool,
    pub reasoning: String,
}

/// Classifier's reconstruction of the task parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotExtraction {
    pub name: Option<String>,
    pub due_date_effective: Option<NaiveDate>,
    pub due_date_proposed: Option<NaiveDate>,
    pub scope_summary: Option<String>,
}

/// Complete adapter output. `Default` is the safe empty value callers fall
/// back to: it carries no new information and changes nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierOutcome {
    pub latest_intent: MessageIntent,
    /// Raw state string; validate through [`validated_state`] before use.
    pub conversation_state: String,
    pub pending_changes: Vec<ExtractedChange>,
    pub summary: String,
    pub requires_action: bool,
    pub task_snapshot: SnapshotExtraction,
    pub provenance: DerivedProvenance,
}

impl Default for ClassifierOutcome {
    fn default() -> Self {
        Self {
            latest_intent: MessageIntent::Other,
            conversation_state: String::new(),
            pending_changes: Vec::new(),
            summary: String::new(),
            requires_action: false,
            task_snapshot: SnapshotExtraction::default(),
            provenance: DerivedProvenance::new(),
        }
    }
}

/// Clamps the classifier's free-form state string onto the known enum,
/// falling back to `active` for anything it has never heard of.
pub fn validated_state(raw: &str) -> ConversationState {
    ConversationState::parse(raw).unwrap_or(ConversationState::Active)
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classifier transport failure: {0}")]
    Transport(String),
    #[error("classifier returned malformed output: {0}")]
    MalformedOutput(String),
}

/// The external probabilistic classifier. Implementations are untrusted:
/// callers must treat every error as "no new information" and keep prior
/// state, never as a pipeline failure.
#[async_trait]
pub trait ClassificationAdapter: Send + Sync {
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierOutcome, ClassificationError>;
}

/// Adapter that reports nothing new, whatever the conversation says.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClassificationAdapter;

#[async_trait]
impl ClassificationAdapter for NoopClassificationAdapter {
    async fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<ClassifierOutcome, ClassificationError> {
        Ok(ClassifierOutcome::default())
    }
}

/// Adapter that replays a pre-arranged script of outcomes in order, then
/// keeps returning the safe default once the script runs dry.
#[derive(Default)]
pub struct ScriptedClassificationAdapter {
    script: std::sync::Mutex<std::collections::VecDeque<Result<ClassifierOutcome, ClassificationError>>>,
}

impl ScriptedClassificationAdapter {
    pub fn new(steps: Vec<Result<ClassifierOutcome, ClassificationError>>) -> Self {
        Self { script: std::sync::Mutex::new(steps.into_iter().collect()) }
    }

    pub fn push(&self, step: Result<ClassifierOutcome, ClassificationError>) {
        match self.script.lock() {
            Ok(mut script) => script.push_back(step),
            Err(poisoned) => poisoned.into_inner().push_back(step),
        }
    }
}

#[async_trait]
impl ClassificationAdapter for ScriptedClassificationAdapter {
    async fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<ClassifierOutcome, ClassificationError> {
        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Ok(ClassifierOutcome::default()))
    }
}
