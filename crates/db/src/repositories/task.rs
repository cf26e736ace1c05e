use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use handoff_core::domain::task::{ConversationState, Party, Task, TaskId, TaskParams, TaskStatus};

use super::{RepositoryError, TaskRepository};
use crate::DbPool;

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "id, status, conversation_state, name, due_date, scope, \
     delegator_name, delegator_address, delegate_name, delegate_address, thread_ref, \
     pending_changes, pending_decision, ledger, derived_snapshot, derived_provenance, \
     processed_message_ids, analysis_summary, last_analyzed_at, follow_up_sent_at, \
     created_at, updated_at";

fn decode<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, RepositoryError> {
    result.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    decode(DateTime::parse_from_rfc3339(raw)).map(|dt| dt.with_timezone(&Utc))
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let state_str: String = decode(row.try_get("conversation_state"))?;
    let name: String = decode(row.try_get("name"))?;
    let due_date_str: Option<String> = decode(row.try_get("due_date"))?;
    let scope: String = decode(row.try_get("scope"))?;
    let delegator_name: String = decode(row.try_get("delegator_name"))?;
    let delegator_address: String = decode(row.try_get("delegator_address"))?;
    let delegate_name: String = decode(row.try_get("delegate_name"))?;
    let delegate_address: String = decode(row.try_get("delegate_address"))?;
    let thread_ref: Option<String> = decode(row.try_get("thread_ref"))?;
    let pending_changes_json: String = decode(row.try_get("pending_changes"))?;
    let pending_decision_json: Option<String> = decode(row.try_get("pending_decision"))?;
    let ledger_json: String = decode(row.try_get("ledger"))?;
    let snapshot_json: String = decode(row.try_get("derived_snapshot"))?;
    let provenance_json: String = decode(row.try_get("derived_provenance"))?;
    let processed_json: String = decode(row.try_get("processed_message_ids"))?;
    let analysis_summary: Option<String> = decode(row.try_get("analysis_summary"))?;
    let last_analyzed_str: Option<String> = decode(row.try_get("last_analyzed_at"))?;
    let follow_up_str: Option<String> = decode(row.try_get("follow_up_sent_at"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;
    let updated_at_str: String = decode(row.try_get("updated_at"))?;

    let status = TaskStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown task status `{status_str}`")))?;
    let conversation_state = ConversationState::parse(&state_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown conversation state `{state_str}`"))
    })?;
    let due_date = match due_date_str {
        Some(raw) => Some(decode(NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))?),
        None => None,
    };
    let pending_decision = match pending_decision_json {
        Some(raw) => Some(decode(serde_json::from_str(&raw))?),
        None => None,
    };
    let last_analyzed_at = match last_analyzed_str {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };
    let follow_up_sent_at = match follow_up_str {
        Some(raw) => Some(parse_timestamp(&raw)?),
        None => None,
    };

    Ok(Task {
        id: TaskId(id),
        status,
        conversation_state,
        params: TaskParams { name, due_date, scope },
        delegator: Party { name: delegator_name, address: delegator_address },
        delegate: Party { name: delegate_name, address: delegate_address },
        thread_ref,
        pending_changes: decode(serde_json::from_str(&pending_changes_json))?,
        pending_decision,
        derived_snapshot: decode(serde_json::from_str(&snapshot_json))?,
        derived_provenance: decode(serde_json::from_str(&provenance_json))?,
        ledger: decode(serde_json::from_str(&ledger_json))?,
        processed: decode(serde_json::from_str(&processed_json))?,
        analysis_summary,
        last_analyzed_at,
        follow_up_sent_at,
        created_at: parse_timestamp(&created_at_str)?,
        updated_at: parse_timestamp(&updated_at_str)?,
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Decode(e.to_string()))
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn find_by_id(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM task WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_task(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_thread(&self, thread_ref: &str) -> Result<Option<Task>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM task WHERE thread_ref = ?"))
            .bind(thread_ref)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_task(r)?)),
            None => Ok(None),
        }
    }

    async fn list_open(&self) -> Result<Vec<Task>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM task \
             WHERE status NOT IN ('closed', 'cancelled') ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect::<Result<Vec<_>, _>>()
    }

    async fn save(&self, task: Task) -> Result<(), RepositoryError> {
        let pending_decision_json =
            task.pending_decision.as_ref().map(encode_json).transpose()?;

        sqlx::query(
            "INSERT INTO task (id, status, conversation_state, name, due_date, scope,
                               delegator_name, delegator_address, delegate_name, delegate_address,
                               thread_ref, pending_changes, pending_decision, ledger,
                               derived_snapshot, derived_provenance, processed_message_ids,
                               analysis_summary, last_analyzed_at, follow_up_sent_at,
                               created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 conversation_state = excluded.conversation_state,
                 name = excluded.name,
                 due_date = excluded.due_date,
                 scope = excluded.scope,
                 delegator_name = excluded.delegator_name,
                 delegator_address = excluded.delegator_address,
                 delegate_name = excluded.delegate_name,
                 delegate_address = excluded.delegate_address,
                 thread_ref = excluded.thread_ref,
                 pending_changes = excluded.pending_changes,
                 pending_decision = excluded.pending_decision,
                 ledger = excluded.ledger,
                 derived_snapshot = excluded.derived_snapshot,
                 derived_provenance = excluded.derived_provenance,
                 processed_message_ids = excluded.processed_message_ids,
                 analysis_summary = excluded.analysis_summary,
                 last_analyzed_at = excluded.last_analyzed_at,
                 follow_up_sent_at = excluded.follow_up_sent_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&task.id.0)
        .bind(task.status.as_str())
        .bind(task.conversation_state.as_str())
        .bind(&task.params.name)
        .bind(task.params.due_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(&task.params.scope)
        .bind(&task.delegator.name)
        .bind(&task.delegator.address)
        .bind(&task.delegate.name)
        .bind(&task.delegate.address)
        .bind(&task.thread_ref)
        .bind(encode_json(&task.pending_changes)?)
        .bind(&pending_decision_json)
        .bind(encode_json(&task.ledger)?)
        .bind(encode_json(&task.derived_snapshot)?)
        .bind(encode_json(&task.derived_provenance)?)
        .bind(encode_json(&task.processed)?)
        .bind(&task.analysis_summary)
        .bind(task.last_analyzed_at.map(|dt| dt.to_rfc3339()))
        .bind(task.follow_up_sent_at.map(|dt| dt.to_rfc3339()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use handoff_core::domain::conversation::{ConversationEvent, SenderRole};
    use handoff_core::domain::decision::{PendingDecision, TaskParameter};
    use handoff_core::domain::task::{Party, Task, TaskId, TaskParams, TaskStatus};

    use super::SqlTaskRepository;
    use crate::repositories::TaskRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_task(id: &str) -> Task {
        let mut task = Task::new(
            TaskId(id.to_string()),
            TaskParams {
                name: "Quarterly report".to_string(),
                due_date: NaiveDate::from_ymd_opt(2026, 1, 10),
                scope: "Draft and final deck".to_string(),
            },
            Party { name: "Morgan".to_string(), address: "boss@example.com".to_string() },
            Party { name: "Riley".to_string(), address: "dev@example.com".to_string() },
            Some(format!("thread-{id}")),
            Utc::now(),
        );
        task.ledger.append(ConversationEvent::new(
            "msg-1",
            Utc::now(),
            SenderRole::Delegate,
            "dev@example.com",
            "message",
            "I'll have it by Friday.",
        ));
        task.processed.mark_processed("msg-1");
        task
    }

    #[tokio::test]
    async fn save_and_find_round_trips_the_whole_record() {
        let pool = setup().await;
        let repo = SqlTaskRepository::new(pool);
        let task = sample_task("T-2026-0001");

        repo.save(task.clone()).await.expect("save");
        let found = repo
            .find_by_id(&TaskId("T-2026-0001".to_string()))
            .await
            .expect("find")
            .expect("should exist");

        assert_eq!(found, task);
        assert_eq!(found.ledger.len(), 1);
        assert!(found.processed.has_processed("msg-1"));
    }

    #[tokio::test]
    async fn save_upserts_on_conflict() {
        let pool = setup().await;
        let repo = SqlTaskRepository::new(pool);

        let mut task = sample_task("T-100");
        repo.save(task.clone()).await.expect("save");

        task.status = TaskStatus::Active;
        task.pending_decision = Some(PendingDecision {
            parameter: TaskParameter::DueDate,
            current_value: Some("2026-01-10".to_string()),
            proposed_value: "2026-01-15".to_string(),
            requested_by: SenderRole::Delegate,
            awaiting_from: SenderRole::Delegator,
            message_id: "msg-2".to_string(),
            created_at: Utc::now(),
        });
        repo.save(task.clone()).await.expect("upsert");

        let found =
            repo.find_by_id(&TaskId("T-100".to_string())).await.expect("find").expect("exists");
        assert_eq!(found.status, TaskStatus::Active);
        assert_eq!(
            found.pending_decision.as_ref().map(|d| d.proposed_value.as_str()),
            Some("2026-01-15")
        );
    }

    #[tokio::test]
    async fn find_by_thread_matches_the_stored_reference() {
        let pool = setup().await;
        let repo = SqlTaskRepository::new(pool);
        repo.save(sample_task("T-1")).await.expect("save");
        repo.save(sample_task("T-2")).await.expect("save");

        let found = repo.find_by_thread("thread-T-2").await.expect("lookup");
        assert_eq!(found.map(|task| task.id.0), Some("T-2".to_string()));
    }

    #[tokio::test]
    async fn list_open_skips_closed_and_cancelled_rows() {
        let pool = setup().await;
        let repo = SqlTaskRepository::new(pool);
        repo.save(sample_task("T-1")).await.expect("save");

        let mut closed = sample_task("T-2");
        closed.status = TaskStatus::Closed;
        repo.save(closed).await.expect("save");

        let open = repo.list_open().await.expect("list");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id.0, "T-1");
    }
}
