pub mod audit;
pub mod config;
pub mod decision;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod idempotency;
pub mod ledger;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use decision::{ChangeProposal, DecisionManager, DecisionOutcome};
pub use domain::conversation::{ConversationEvent, LedgerSummary, SenderRole};
pub use domain::decision::{ChangeStatus, PendingChange, PendingDecision, TaskParameter};
pub use domain::snapshot::{
    DerivedProvenance, DerivedSnapshot, FieldProvenance, SnapshotField, CONFIDENCE_FLOOR,
};
pub use domain::task::{ConversationState, Party, Task, TaskId, TaskParams, TaskStatus};
pub use errors::{ApplicationError, DomainError};
pub use idempotency::ProcessedMessages;
pub use ledger::ConversationLedger;
