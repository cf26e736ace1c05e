use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use handoff_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use handoff_core::domain::conversation::SenderRole;
use handoff_core::domain::task::{Task, TaskId};
use handoff_db::repositories::{RepositoryError, TaskRepository};
use handoff_engine::classify::ClassificationAdapter;
use handoff_engine::reconcile::ReconciliationEngine;

use crate::handlers::{DelegatePathHandler, DelegatorPathHandler, InboundPathHandler};
use crate::message::{embedded_task_reference, normalize_address, InboundMessage};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestReceipt {
    pub task_id: TaskId,
    pub message_id: String,
    pub skipped: bool,
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Needs manual triage; never retried automatically.
    #[error("message {message_id} could not be correlated to any task")]
    Correlation { message_id: String },
    /// Dropped and logged; the sender is neither party on the task.
    #[error("message {message_id} sender `{sender}` is not a party on task {task_id}")]
    UnknownSender { message_id: String, sender: String, task_id: String },
    /// The row write failed, so the message stays unprocessed and a retry
    /// is safe.
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

/// Entry point for every inbound message: correlate, dedupe, verify the
/// sender, run the matching path handler, reconcile, then persist the whole
/// record (idempotency mark included) as one write.
pub struct MessageGateway<R, A> {
    tasks: Arc<R>,
    engine: ReconciliationEngine<A>,
    delegator_path: DelegatorPathHandler,
    delegate_path: DelegatePathHandler,
    sink: Arc<dyn AuditSink>,
}

impl<R, A> MessageGateway<R, A>
where
    R: TaskRepository,
    A: ClassificationAdapter,
{
    pub fn new(tasks: Arc<R>, engine: ReconciliationEngine<A>) -> Self {
        Self {
            tasks,
            engine,
            delegator_path: DelegatorPathHandler,
            delegate_path: DelegatePathHandler::default(),
            sink: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn ingest(&self, message: &InboundMessage) -> Result<IngestReceipt, IngestError> {
        let mut task = self.correlate(message).await?;

        if task.processed.has_processed(&message.id) {
            info!(
                task_id = %task.id.0,
                message_id = %message.id,
                "duplicate delivery skipped"
            );
            self.emit(
                Some(task.id.clone()),
                message,
                "ingress.duplicate_skipped",
                AuditOutcome::Success,
            );
            return Ok(IngestReceipt {
                task_id: task.id,
                message_id: message.id.clone(),
                skipped: true,
            });
        }

        let role = self.resolve_sender(&task, message)?;
        let now = Utc::now();

        let handler: &dyn InboundPathHandler = match role {
            SenderRole::Delegator => &self.delegator_path,
            _ => &self.delegate_path,
        };
        let outcome = handler.handle(&mut task, message, now).await;
        if !outcome.appended {
            info!(
                task_id = %task.id.0,
                message_id = %message.id,
                "ledger reported near-duplicate content; no event appended"
            );
        }

        // Post-step. Classifier trouble is absorbed inside reconcile; only a
        // failed row write below leaves the message unprocessed.
        self.engine.reconcile(&mut task, now).await;

        task.processed.mark_processed(&message.id);
        task.updated_at = now;
        let task_id = task.id.clone();
        self.tasks.save(task).await.map_err(|error| {
            warn!(
                task_id = %task_id.0,
                message_id = %message.id,
                error = %error,
                "task write failed; message stays unprocessed for retry"
            );
            IngestError::Persistence(error)
        })?;

        self.emit(Some(task_id.clone()), message, "ingress.message_processed", AuditOutcome::Success);
        Ok(IngestReceipt { task_id, message_id: message.id.clone(), skipped: false })
    }

    /// Forces a re-derivation of a task's state from its ledger.
    pub async fn reconcile_task(&self, task_id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let Some(mut task) = self.tasks.find_by_id(task_id).await? else {
            return Ok(None);
        };
        self.engine.reconcile(&mut task, Utc::now()).await;
        self.tasks.save(task.clone()).await?;
        Ok(Some(task))
    }

    async fn correlate(&self, message: &InboundMessage) -> Result<Task, IngestError> {
        if let Some(task) = self.tasks.find_by_thread(&message.thread_id).await? {
            return Ok(task);
        }

        if let Some(reference) = embedded_task_reference(&message.plain_body) {
            if let Some(task) = self.tasks.find_by_id(&reference).await? {
                return Ok(task);
            }
        }

        warn!(
            message_id = %message.id,
            thread_id = %message.thread_id,
            "message matches no task; surfacing for manual triage"
        );
        self.emit(None, message, "ingress.correlation_failed", AuditOutcome::Rejected);
        Err(IngestError::Correlation { message_id: message.id.clone() })
    }

    fn resolve_sender(
        &self,
        task: &Task,
        message: &InboundMessage,
    ) -> Result<SenderRole, IngestError> {
        let sender = normalize_address(&message.from);
        if sender == normalize_address(&task.delegator.address) {
            return Ok(SenderRole::Delegator);
        }
        if sender == normalize_address(&task.delegate.address) {
            return Ok(SenderRole::Delegate);
        }

        warn!(
            task_id = %task.id.0,
            message_id = %message.id,
            sender = %sender,
            "message from unrecognized sender dropped"
        );
        self.emit(Some(task.id.clone()), message, "ingress.unknown_sender", AuditOutcome::Rejected);
        Err(IngestError::UnknownSender {
            message_id: message.id.clone(),
            sender,
            task_id: task.id.0.clone(),
        })
    }

    fn emit(
        &self,
        task_id: Option<TaskId>,
        message: &InboundMessage,
        event_type: &str,
        outcome: AuditOutcome,
    ) {
        self.sink.emit(AuditEvent::new(
            task_id,
            Some(message.id.clone()),
            message.thread_id.clone(),
            event_type,
            AuditCategory::Ingress,
            "message-gateway",
            outcome,
        ));
    }
}
