use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Per-task set of already-handled inbound message identifiers.
///
/// Checked before any side-effecting handler runs; marked only after the
/// handler and reconciliation both complete. The set lives inside the task
/// record, so the mark and the effects it guards land in the same row write:
/// a failed write leaves the message unprocessed and the retry safe.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedMessages(BTreeSet<String>);

impl ProcessedMessages {
    pub fn has_processed(&self, message_id: &str) -> bool {
        self.0.contains(message_id)
    }

    /// Returns `false` when the id was already present.
    pub fn mark_processed(&mut self, message_id: impl Into<String>) -> bool {
        self.0.insert(message_id.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
