use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use handoff_core::domain::decision::TaskParameter;
use handoff_core::domain::snapshot::{DerivedProvenance, FieldProvenance, SnapshotField};

use crate::classify::{
    ClassificationAdapter, ClassificationError, ClassificationRequest, ClassifierOutcome,
    ExtractedChange, MessageIntent, SnapshotExtraction,
};

/// Raw completion transport. Implementations return the model's text for a
/// prompt; everything above this seam is deterministic.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Classification adapter backed by an [`LlmClient`]. Builds the prompt,
/// parses the model's JSON reply, and maps every failure mode onto
/// [`ClassificationError`] so callers can degrade to "no new information".
pub struct LlmClassificationAdapter<C> {
    client: C,
}

impl<C> LlmClassificationAdapter<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ClassificationAdapter for LlmClassificationAdapter<C>
where
    C: LlmClient,
{
    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierOutcome, ClassificationError> {
        let prompt = build_prompt(request);
        let reply = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ClassificationError::Transport(error.to_string()))?;
        parse_reply(&reply)
    }
}

pub fn build_prompt(request: &ClassificationRequest) -> String {
    let mut prompt = String::from(
        "You are tracking a delegated task negotiated over email between a \
         delegator and a delegate. Analyze the conversation and reply with \
         ONLY a JSON object with these keys: latest_intent, \
         conversation_state, pending_changes, summary, requires_action, \
         task_snapshot, provenance.\n\n",
    );

    prompt.push_str(&format!(
        "Current parameters: name={:?}, due_date={}, scope={:?}, status={}\n",
        request.params.name,
        request
            .params
            .due_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "none".to_string()),
        request.params.scope,
        request.status.as_str(),
    ));

    if let Some(decision) = &request.pending_decision {
        prompt.push_str(&format!(
            "Open negotiation: {} change to {} requested by the {}, awaiting the {}.\n",
            decision.parameter.as_str(),
            decision.proposed_value,
            decision.requested_by.as_str(),
            decision.awaiting_from.as_str(),
        ));
    }
    if !request.pending_changes.is_empty() {
        prompt.push_str(&format!(
            "Outstanding change requests: {}.\n",
            request
                .pending_changes
                .iter()
                .map(|change| {
                    format!("{} -> {}", change.parameter.as_str(), change.proposed_value)
                })
                .collect::<Vec<_>>()
                .join("; ")
        ));
    }

    prompt.push_str("\nConversation, oldest first:\n");
    for line in &request.transcript {
        prompt.push_str(&format!(
            "[{}] {} ({}): {}\n",
            line.message_id,
            line.sender_role.as_str(),
            line.sender,
            line.content
        ));
    }

    prompt
}

/// Parses the model reply, tolerating markdown fences around the JSON but
/// nothing structurally wrong inside it.
pub fn parse_reply(reply: &str) -> Result<ClassifierOutcome, ClassificationError> {
    let json = strip_fences(reply);
    let wire: WireOutcome = serde_json::from_str(json)
        .map_err(|error| ClassificationError::MalformedOutput(error.to_string()))?;
    Ok(wire.into_outcome())
}

fn strip_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[derive(Debug, Default, Deserialize)]
struct WireOutcome {
    latest_intent: Option<String>,
    conversation_state: Option<String>,
    #[serde(default)]
    pending_changes: Vec<WireChange>,
    summary: Option<String>,
    requires_action: Option<bool>,
    task_snapshot: Option<WireSnapshot>,
    #[serde(default)]
    provenance: BTreeMap<String, WireProvenance>,
}

#[derive(Debug, Deserialize)]
struct WireChange {
    parameter: String,
    current_value: Option<String>,
    proposed_value: Option<String>,
    requested_by: Option<String>,
    requires_approval: Option<bool>,
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSnapshot {
    name: Option<String>,
    due_date_effective: Option<String>,
    due_date_proposed: Option<String>,
    scope_summary: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireProvenance {
    source_message_id: Option<String>,
    source_snippet: Option<String>,
    confidence: Option<f64>,
}

impl WireOutcome {
    fn into_outcome(self) -> ClassifierOutcome {
        let snapshot = self.task_snapshot.unwrap_or_default();
        let provenance = self
            .provenance
            .into_iter()
            .filter_map(|(field, wire)| {
                let field = parse_field(&field)?;
                Some((
                    field,
                    FieldProvenance {
                        source_message_id: wire.source_message_id.unwrap_or_default(),
                        source_snippet: wire.source_snippet.unwrap_or_default(),
                        confidence: wire.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
                        extracted_at: Utc::now(),
                    },
                ))
            })
            .collect::<DerivedProvenance>();

        ClassifierOutcome {
            latest_intent: MessageIntent::parse(self.latest_intent.as_deref().unwrap_or("")),
            conversation_state: self.conversation_state.unwrap_or_default(),
            pending_changes: self
                .pending_changes
                .into_iter()
                .filter_map(wire_change)
                .collect(),
            summary: self.summary.unwrap_or_default(),
            requires_action: self.requires_action.unwrap_or(false),
            task_snapshot: SnapshotExtraction {
                name: snapshot.name.filter(|name| !name.trim().is_empty()),
                due_date_effective: snapshot.due_date_effective.as_deref().and_then(parse_date),
                due_date_proposed: snapshot.due_date_proposed.as_deref().and_then(parse_date),
                scope_summary: snapshot.scope_summary.filter(|scope| !scope.trim().is_empty()),
            },
            provenance,
        }
    }
}

fn wire_change(wire: WireChange) -> Option<ExtractedChange> {
    let parameter = TaskParameter::parse(&wire.parameter)?;
    let proposed_value = wire.proposed_value.filter(|value| !value.trim().is_empty())?;
    let requested_by = match wire.requested_by.as_deref().map(str::trim) {
        Some("delegator") => handoff_core::SenderRole::Delegator,
        Some("delegate") | None => handoff_core::SenderRole::Delegate,
        Some(_) => return None,
    };
    Some(ExtractedChange {
        parameter,
        current_value: wire.current_value,
        proposed_value,
        requested_by,
        requires_approval: wire.requires_approval.unwrap_or(true),
        reasoning: wire.reasoning.unwrap_or_default(),
    })
}

fn parse_field(raw: &str) -> Option<SnapshotField> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "name" => Some(SnapshotField::Name),
        "due_date_effective" => Some(SnapshotField::DueDateEffective),
        "due_date_proposed" => Some(SnapshotField::DueDateProposed),
        "scope_summary" => Some(SnapshotField::ScopeSummary),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// OpenAI-style chat-completions transport.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpLlmClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut request = self.http.post(self.completions_url()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?.error_for_status()?;
        let payload: serde_json::Value = response.json().await?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(|value| value.as_str())
            .ok_or_else(|| anyhow::anyhow!("completion response missing message content"))?;
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use handoff_core::domain::snapshot::SnapshotField;
    use handoff_core::domain::task::{Task, TaskId, TaskParams, TaskStatus};
    use handoff_core::domain::task::Party;

    use crate::classify::{ClassificationError, ClassificationRequest, MessageIntent};

    use super::{build_prompt, parse_reply, HttpLlmClient};

    fn request() -> ClassificationRequest {
        let task = Task::new(
            TaskId("T-1".to_string()),
            TaskParams {
                name: "Quarterly report".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 1, 10),
                scope: "Draft and final deck".to_string(),
            },
            Party { name: "Morgan".to_string(), address: "boss@example.com".to_string() },
            Party { name: "Riley".to_string(), address: "dev@example.com".to_string() },
            None,
            chrono::Utc::now(),
        );
        ClassificationRequest::for_task(&task)
    }

    #[test]
    fn prompt_carries_parameters_and_status() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("Quarterly report"));
        assert!(prompt.contains("2026-01-10"));
        assert!(prompt.contains(TaskStatus::Drafted.as_str()));
    }

    #[test]
    fn parses_a_complete_reply() {
        let reply = r#"
        {
            "latest_intent": "change_request",
            "conversation_state": "change_requested",
            "pending_changes": [{
                "parameter": "due_date",
                "current_value": "2026-01-10",
                "proposed_value": "2026-01-15",
                "requested_by": "delegate",
                "requires_approval": true,
                "reasoning": "delegate asked for more time"
            }],
            "summary": "Delegate asked to move the due date to Jan 15.",
            "requires_action": true,
            "task_snapshot": {
                "name": "Quarterly report",
                "due_date_effective": "2026-01-10",
                "due_date_proposed": "2026-01-15",
                "scope_summary": "Draft and final deck"
            },
            "provenance": {
                "due_date_proposed": {
                    "source_message_id": "msg-2",
                    "source_snippet": "move it to Jan 15",
                    "confidence": 0.92
                }
            }
        }"#;

        let outcome = parse_reply(reply).expect("parse");
        assert_eq!(outcome.latest_intent, MessageIntent::ChangeRequest);
        assert_eq!(outcome.conversation_state, "change_requested");
        assert_eq!(outcome.pending_changes.len(), 1);
        assert_eq!(outcome.pending_changes[0].proposed_value, "2026-01-15");
        assert_eq!(
            outcome.task_snapshot.due_date_proposed,
            NaiveDate::from_ymd_opt(2026, 1, 15)
        );
        let provenance =
            outcome.provenance.get(&SnapshotField::DueDateProposed).expect("provenance");
        assert!((provenance.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn tolerates_markdown_fences_and_missing_fields() {
        let reply = "```json\n{\"latest_intent\": \"update\"}\n```";
        let outcome = parse_reply(reply).expect("parse");
        assert_eq!(outcome.latest_intent, MessageIntent::Update);
        assert!(outcome.pending_changes.is_empty());
        assert!(outcome.summary.is_empty());
    }

    #[test]
    fn malformed_json_is_a_malformed_output_error() {
        let error = parse_reply("the task looks fine to me").expect_err("should fail");
        assert!(matches!(error, ClassificationError::MalformedOutput(_)));
    }

    #[test]
    fn unknown_change_parameters_are_dropped_not_fatal() {
        let reply = r#"{
            "latest_intent": "change_request",
            "pending_changes": [
                {"parameter": "priority", "proposed_value": "urgent"},
                {"parameter": "due_date", "proposed_value": "2026-01-15"}
            ]
        }"#;
        let outcome = parse_reply(reply).expect("parse");
        assert_eq!(outcome.pending_changes.len(), 1);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let reply = r#"{
            "provenance": {"name": {"confidence": 3.5}}
        }"#;
        let outcome = parse_reply(reply).expect("parse");
        let provenance = outcome.provenance.get(&SnapshotField::Name).expect("provenance");
        assert!((provenance.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn http_client_builds_completions_url_from_base() {
        let client =
            HttpLlmClient::new("http://localhost:11434/", None, "llama3.1", 30).expect("client");
        assert_eq!(client.completions_url(), "http://localhost:11434/v1/chat/completions");
    }
}
