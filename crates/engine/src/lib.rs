pub mod classify;
pub mod dates;
pub mod llm;
pub mod reconcile;

pub use classify::{
    validated_state, ClassificationAdapter, ClassificationError, ClassificationRequest,
    ClassifierOutcome, ExtractedChange, MessageIntent, NoopClassificationAdapter,
    ScriptedClassificationAdapter, SnapshotExtraction, TranscriptLine,
};
pub use dates::{extract_due_date, ExtractedDate, FALLBACK_CONFIDENCE};
pub use llm::{HttpLlmClient, LlmClassificationAdapter, LlmClient};
pub use reconcile::ReconciliationEngine;
