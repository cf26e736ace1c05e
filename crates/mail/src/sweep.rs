use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use handoff_db::repositories::{RepositoryError, TaskRepository};
use handoff_engine::classify::ClassificationAdapter;

use crate::gateway::{IngestError, MessageGateway};
use crate::message::InboundMessage;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("mailbox transport failure: {0}")]
    Transport(String),
}

/// The polling side of the messaging collaborator: fetch whatever arrived
/// on a thread since a given time.
#[async_trait::async_trait]
pub trait MailboxClient: Send + Sync {
    async fn fetch_since(
        &self,
        thread_ref: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<InboundMessage>, MailboxError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tasks_checked: usize,
    pub messages_seen: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub failures: usize,
}

/// Walks every open task with a thread reference and ingests new messages.
///
/// A sweep may rediscover messages a push path already handled; the
/// idempotency tracker turns those into skips, so overlapping sweeps and
/// pushes are safe. Per-message failures are logged and counted, never
/// aborting the rest of the sweep.
pub async fn run_sweep<R, A, M>(
    gateway: &MessageGateway<R, A>,
    tasks: &R,
    mailbox: &M,
) -> Result<SweepReport, RepositoryError>
where
    R: TaskRepository,
    A: ClassificationAdapter,
    M: MailboxClient,
{
    let mut report = SweepReport::default();

    for task in tasks.list_open().await? {
        let Some(thread_ref) = task.thread_ref.clone() else {
            continue;
        };
        report.tasks_checked += 1;

        let since = task.last_analyzed_at.unwrap_or(task.created_at);
        let messages = match mailbox.fetch_since(&thread_ref, since).await {
            Ok(messages) => messages,
            Err(error) => {
                warn!(task_id = %task.id.0, error = %error, "mailbox fetch failed; task skipped");
                report.failures += 1;
                continue;
            }
        };

        for message in messages {
            report.messages_seen += 1;
            match gateway.ingest(&message).await {
                Ok(receipt) if receipt.skipped => report.skipped += 1,
                Ok(_) => report.ingested += 1,
                Err(IngestError::Correlation { message_id }) => {
                    warn!(message_id = %message_id, "sweep message needs manual triage");
                    report.failures += 1;
                }
                Err(IngestError::UnknownSender { message_id, sender, .. }) => {
                    warn!(message_id = %message_id, sender = %sender, "sweep message dropped");
                    report.failures += 1;
                }
                Err(IngestError::Persistence(error)) => {
                    warn!(
                        message_id = %message.id,
                        error = %error,
                        "sweep write failed; message will retry next sweep"
                    );
                    report.failures += 1;
                }
            }
        }
    }

    info!(
        tasks = report.tasks_checked,
        seen = report.messages_seen,
        ingested = report.ingested,
        skipped = report.skipped,
        failures = report.failures,
        "sweep finished"
    );
    Ok(report)
}
