pub mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use handoff_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "handoff",
    about = "Handoff operator CLI",
    long_about = "Operate the delegated-task conversation engine: migrations, task \
                  creation, message ingestion, forced reconciliation, and inspection.",
    after_help = "Examples:\n  handoff migrate\n  handoff ingest --file message.json\n  handoff show T-2026-0001"
)]
pub struct Cli {
    /// Path to handoff.toml (defaults to ./handoff.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Create a task and optionally hand it to the delegate")]
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, help = "Due date, ISO format YYYY-MM-DD")]
        due: Option<String>,
        #[arg(long, default_value = "")]
        scope: String,
        #[arg(long, help = "Delegator, `Name <addr>` or bare address")]
        delegator: String,
        #[arg(long, help = "Delegate, `Name <addr>` or bare address")]
        delegate: String,
        #[arg(long, help = "Conversation/thread reference for correlation")]
        thread: Option<String>,
        #[arg(long, help = "Immediately mark the task as handed to the delegate")]
        assign: bool,
    },
    #[command(about = "Ingest one inbound message (JSON file or stdin)")]
    Ingest {
        #[arg(long, help = "Path to a JSON message; omit to read stdin")]
        file: Option<PathBuf>,
    },
    #[command(about = "Force re-derivation of a task's state from its ledger")]
    Reconcile { task_id: String },
    #[command(about = "Cancel a task (allowed from any state except closed)")]
    Cancel { task_id: String },
    #[command(about = "Print a task's current state")]
    Show { task_id: String },
}

fn init_logging(config: &AppConfig) {
    use handoff_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config.clone(),
        require_file: false,
        overrides: Default::default(),
    })?;
    init_logging(&config);

    let output = match cli.command {
        Command::Migrate => commands::migrate(&config).await?,
        Command::Create { name, due, scope, delegator, delegate, thread, assign } => {
            commands::create(
                &config,
                commands::CreateArgs { name, due, scope, delegator, delegate, thread, assign },
            )
            .await?
        }
        Command::Ingest { file } => commands::ingest(&config, file).await?,
        Command::Reconcile { task_id } => commands::reconcile(&config, &task_id).await?,
        Command::Cancel { task_id } => commands::cancel(&config, &task_id).await?,
        Command::Show { task_id } => commands::show(&config, &task_id).await?,
    };

    println!("{output}");
    Ok(())
}
