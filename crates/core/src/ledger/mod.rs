use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationEvent, LedgerSummary, SenderRole};

/// Hard cap on retained events; oldest entries drop first.
pub const MAX_EVENTS: usize = 30;
/// Serialized-size cap for the whole event list, in characters.
pub const MAX_SERIALIZED_CHARS: usize = 45_000;

const TRIM_TO_EVENTS: usize = 20;
const TRUNCATE_CONTENT_CHARS: usize = 500;
const TRUNCATION_MARKER: &str = "...[truncated]";
const DUPLICATE_WINDOW_MS: i64 = 1_000;
const SUMMARY_SNIPPET_CHARS: usize = 160;

/// Bounded append-only log of a task's conversation.
///
/// Events are never mutated after append; the only destructive operations
/// are the size-bounding trims, which drop oldest entries first and only
/// truncate content as a last resort. The summary is recomputed on every
/// append so callers can render the latest message without walking the log.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationLedger {
    events: Vec<ConversationEvent>,
    summary: Option<LedgerSummary>,
}

impl ConversationLedger {
    /// Appends one event, returning `false` without mutation when it is a
    /// duplicate: same id as an existing event, or same content from the
    /// same sender within one second of an existing event.
    pub fn append(&mut self, event: ConversationEvent) -> bool {
        if self.is_duplicate(&event) {
            return false;
        }

        self.events.push(event);
        self.enforce_bounds();
        self.recompute_summary();
        true
    }

    fn is_duplicate(&self, candidate: &ConversationEvent) -> bool {
        self.events.iter().any(|existing| {
            if existing.id == candidate.id {
                return true;
            }
            existing.sender_identity == candidate.sender_identity
                && existing.content == candidate.content
                && (candidate.timestamp - existing.timestamp).num_milliseconds().abs()
                    <= DUPLICATE_WINDOW_MS
        })
    }

    fn enforce_bounds(&mut self) {
        if self.events.len() > MAX_EVENTS {
            let excess = self.events.len() - MAX_EVENTS;
            self.events.drain(..excess);
        }

        if self.serialized_len() <= MAX_SERIALIZED_CHARS {
            return;
        }

        if self.events.len() > TRIM_TO_EVENTS {
            let excess = self.events.len() - TRIM_TO_EVENTS;
            self.events.drain(..excess);
        }

        if self.serialized_len() <= MAX_SERIALIZED_CHARS {
            return;
        }

        for event in &mut self.events {
            if event.content.chars().count() > TRUNCATE_CONTENT_CHARS {
                let mut truncated: String =
                    event.content.chars().take(TRUNCATE_CONTENT_CHARS).collect();
                truncated.push_str(TRUNCATION_MARKER);
                event.content = truncated;
                // Raw bodies are diagnostics only; they go first under pressure.
                event.raw_content = None;
            }
        }
    }

    fn recompute_summary(&mut self) {
        self.summary = self.events.last().map(|event| LedgerSummary {
            timestamp: event.timestamp,
            sender: event.sender_identity.clone(),
            snippet: snippet(&event.content),
        });
    }

    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(&self.events).map(|json| json.len()).unwrap_or(0)
    }

    pub fn events(&self) -> &[ConversationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn summary(&self) -> Option<&LedgerSummary> {
        self.summary.as_ref()
    }

    /// Most recent non-system event, i.e. the latest actual party message.
    pub fn latest_party_event(&self) -> Option<&ConversationEvent> {
        self.events.iter().rev().find(|event| !matches!(event.sender_role, SenderRole::System))
    }
}

fn snippet(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SUMMARY_SNIPPET_CHARS).collect()
}
