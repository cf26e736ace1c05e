use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A derived field is only replaced when the new extraction clears this
/// confidence floor; anything below keeps the previous value and provenance.
pub const CONFIDENCE_FLOOR: f64 = 0.6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotField {
    Name,
    DueDateEffective,
    DueDateProposed,
    ScopeSummary,
}

impl SnapshotField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::DueDateEffective => "due_date_effective",
            Self::DueDateProposed => "due_date_proposed",
            Self::ScopeSummary => "scope_summary",
        }
    }
}

/// Where a derived value came from and how sure the extractor was.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldProvenance {
    pub source_message_id: String,
    pub source_snippet: String,
    pub confidence: f64,
    pub extracted_at: DateTime<Utc>,
}

pub type DerivedProvenance = BTreeMap<SnapshotField, FieldProvenance>;

/// Classifier-reconstructed current truth of the task parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedSnapshot {
    pub name: Option<String>,
    pub due_date_effective: Option<NaiveDate>,
    pub due_date_proposed: Option<NaiveDate>,
    pub scope_summary: Option<String>,
}

impl DerivedSnapshot {
    pub fn field_is_empty(&self, field: SnapshotField) -> bool {
        match field {
            SnapshotField::Name => self.name.is_none(),
            SnapshotField::DueDateEffective => self.due_date_effective.is_none(),
            SnapshotField::DueDateProposed => self.due_date_proposed.is_none(),
            SnapshotField::ScopeSummary => self.scope_summary.is_none(),
        }
    }

    fn set_text(&mut self, field: SnapshotField, value: String) {
        match field {
            SnapshotField::Name => self.name = Some(value),
            SnapshotField::ScopeSummary => self.scope_summary = Some(value),
            SnapshotField::DueDateEffective | SnapshotField::DueDateProposed => {}
        }
    }

    fn set_date(&mut self, field: SnapshotField, value: NaiveDate) {
        match field {
            SnapshotField::DueDateEffective => self.due_date_effective = Some(value),
            SnapshotField::DueDateProposed => self.due_date_proposed = Some(value),
            SnapshotField::Name | SnapshotField::ScopeSummary => {}
        }
    }

    pub fn clear_field(&mut self, field: SnapshotField, provenance: &mut DerivedProvenance) {
        match field {
            SnapshotField::Name => self.name = None,
            SnapshotField::DueDateEffective => self.due_date_effective = None,
            SnapshotField::DueDateProposed => self.due_date_proposed = None,
            SnapshotField::ScopeSummary => self.scope_summary = None,
        }
        provenance.remove(&field);
    }
}

/// Candidate extraction for a single snapshot field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(value) => value.trim().is_empty(),
            Self::Date(_) => false,
        }
    }
}

/// Confidence-gated merge of one extracted field into the snapshot.
///
/// Returns `true` when the field was replaced. Empty extractions and
/// extractions below [`CONFIDENCE_FLOOR`] leave value and provenance
/// untouched.
pub fn apply_field(
    snapshot: &mut DerivedSnapshot,
    provenance_map: &mut DerivedProvenance,
    field: SnapshotField,
    value: FieldValue,
    provenance: FieldProvenance,
) -> bool {
    if value.is_empty() || provenance.confidence < CONFIDENCE_FLOOR {
        return false;
    }

    match value {
        FieldValue::Text(text) => snapshot.set_text(field, text.trim().to_string()),
        FieldValue::Date(date) => snapshot.set_date(field, date),
    }
    provenance_map.insert(field, provenance);
    true
}
