use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use secrecy::ExposeSecret;
use uuid::Uuid;

use handoff_core::config::AppConfig;
use handoff_core::domain::task::{Party, Task, TaskId, TaskParams};
use handoff_core::flows::{FlowContext, FlowEngine, FlowEvent};
use handoff_db::repositories::{SqlTaskRepository, TaskRepository};
use handoff_db::{connect_with_settings, migrations, DbPool};
use handoff_engine::llm::{HttpLlmClient, LlmClassificationAdapter};
use handoff_engine::reconcile::ReconciliationEngine;
use handoff_mail::{normalize_address, InboundMessage, MessageGateway};

pub struct CreateArgs {
    pub name: String,
    pub due: Option<String>,
    pub scope: String,
    pub delegator: String,
    pub delegate: String,
    pub thread: Option<String>,
    pub assign: bool,
}

async fn pool(config: &AppConfig) -> Result<DbPool> {
    connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .with_context(|| format!("connecting to {}", config.database.url))
}

fn classification_adapter(
    config: &AppConfig,
) -> Result<LlmClassificationAdapter<HttpLlmClient>> {
    let base_url = config
        .classifier
        .base_url
        .clone()
        .ok_or_else(|| anyhow!("classifier.base_url is not configured"))?;
    let api_key = config.classifier.api_key.as_ref().map(|key| key.expose_secret().to_string());
    let client = HttpLlmClient::new(
        base_url,
        api_key,
        config.classifier.model.clone(),
        config.classifier.timeout_secs,
    )?;
    Ok(LlmClassificationAdapter::new(client))
}

fn gateway(
    pool: DbPool,
    config: &AppConfig,
) -> Result<MessageGateway<SqlTaskRepository, LlmClassificationAdapter<HttpLlmClient>>> {
    let repo = Arc::new(SqlTaskRepository::new(pool));
    let engine = ReconciliationEngine::new(classification_adapter(config)?);
    Ok(MessageGateway::new(repo, engine))
}

fn parse_party(raw: &str) -> Party {
    let address = normalize_address(raw);
    let name = match raw.find('<') {
        Some(offset) => raw[..offset].trim().trim_matches('"').to_string(),
        None => String::new(),
    };
    let name = if name.is_empty() { address.clone() } else { name };
    Party { name, address }
}

pub async fn migrate(config: &AppConfig) -> Result<String> {
    let pool = pool(config).await?;
    migrations::run_pending(&pool).await.context("running migrations")?;
    Ok("migrations applied".to_string())
}

pub async fn create(config: &AppConfig, args: CreateArgs) -> Result<String> {
    let due_date = args
        .due
        .as_deref()
        .map(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .transpose()
        .context("--due must be YYYY-MM-DD")?;

    let id = TaskId(format!("T-{}", Uuid::new_v4()));
    let mut task = Task::new(
        id.clone(),
        TaskParams { name: args.name, due_date, scope: args.scope },
        parse_party(&args.delegator),
        parse_party(&args.delegate),
        args.thread,
        Utc::now(),
    );

    if args.assign {
        let flow = FlowEngine::default();
        let outcome = flow.apply(&task.status, &FlowEvent::Assigned, &FlowContext::default())?;
        task.status = outcome.to;
    }

    let pool = pool(config).await?;
    let repo = SqlTaskRepository::new(pool);
    repo.save(task.clone()).await?;

    Ok(format!("created {} ({})", id.0, task.status.as_str()))
}

pub async fn ingest(config: &AppConfig, file: Option<PathBuf>) -> Result<String> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer).context("reading stdin")?;
            buffer
        }
    };
    let message: InboundMessage =
        serde_json::from_str(&raw).context("message JSON must be {id, threadId/thread_id, from, plain_body, timestamp}")?;

    let pool = pool(config).await?;
    let gateway = gateway(pool, config)?;
    let receipt = gateway.ingest(&message).await?;

    Ok(if receipt.skipped {
        format!("{} already processed for {}", receipt.message_id, receipt.task_id.0)
    } else {
        format!("{} processed into {}", receipt.message_id, receipt.task_id.0)
    })
}

pub async fn reconcile(config: &AppConfig, task_id: &str) -> Result<String> {
    let pool = pool(config).await?;
    let gateway = gateway(pool, config)?;
    let task = gateway
        .reconcile_task(&TaskId(task_id.to_string()))
        .await?
        .ok_or_else(|| anyhow!("no task with id {task_id}"))?;

    Ok(format!(
        "reconciled {}: status={} state={}",
        task.id.0,
        task.status.as_str(),
        task.conversation_state.as_str()
    ))
}

pub async fn cancel(config: &AppConfig, task_id: &str) -> Result<String> {
    let pool = pool(config).await?;
    let repo = SqlTaskRepository::new(pool);
    let mut task = repo
        .find_by_id(&TaskId(task_id.to_string()))
        .await?
        .ok_or_else(|| anyhow!("no task with id {task_id}"))?;

    let flow = FlowEngine::default();
    let outcome = flow.apply(&task.status, &FlowEvent::CancelRequested, &FlowContext::default())?;
    task.status = outcome.to;
    task.updated_at = Utc::now();
    repo.save(task.clone()).await?;

    Ok(format!("cancelled {}", task.id.0))
}

pub async fn show(config: &AppConfig, task_id: &str) -> Result<String> {
    let pool = pool(config).await?;
    let repo = SqlTaskRepository::new(pool);
    let task = repo
        .find_by_id(&TaskId(task_id.to_string()))
        .await?
        .ok_or_else(|| anyhow!("no task with id {task_id}"))?;

    let mut lines = vec![
        format!("task      {}", task.id.0),
        format!("name      {}", task.params.name),
        format!("status    {} / {}", task.status.as_str(), task.conversation_state.as_str()),
        format!(
            "due       {}",
            task.params
                .due_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("delegator {} <{}>", task.delegator.name, task.delegator.address),
        format!("delegate  {} <{}>", task.delegate.name, task.delegate.address),
    ];

    if let Some(decision) = &task.pending_decision {
        lines.push(format!(
            "pending   {} -> {} (requested by {}, awaiting {})",
            decision.parameter.as_str(),
            decision.proposed_value,
            decision.requested_by.as_str(),
            decision.awaiting_from.as_str()
        ));
    }
    if let Some(summary) = &task.analysis_summary {
        lines.push(format!("analysis  {summary}"));
    }
    if let Some(last) = task.ledger.summary() {
        lines.push(format!("last msg  {} {}: {}", last.timestamp.to_rfc3339(), last.sender, last.snippet));
    }
    if let Some(sent) = task.follow_up_sent_at {
        lines.push(format!("follow-up sent {}", sent.to_rfc3339()));
    }

    Ok(lines.join("\n"))
}
