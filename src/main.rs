//! Absolute Learner CLI entry point.
//!
//! Provides `serve`, `plan`, and `topics` subcommands for running the WhatsApp
//! webhook server, previewing the next daily plan, or listing the catalog.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use absolute_learner::config::LearnerConfig;
use absolute_learner::conversation::{ConversationDelegate, RetryPolicy};
use absolute_learner::learning::{greeting_reply, TopicCatalog};
use absolute_learner::orchestrator::Orchestrator;
use absolute_learner::profiles::SqliteProfileStore;
use absolute_learner::providers::openai::OpenAiCompatProvider;
use absolute_learner::server::{self, AppState};
use absolute_learner::whatsapp::TwilioClient;

/// Absolute Learner: a WhatsApp mentor that teaches one skill a day.
#[derive(Parser)]
#[command(name = "absolute-learner", version, about)]
struct Cli {
    /// Subcommand to execute (defaults to `serve`).
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the webhook server.
    Serve,
    /// Print the reply a learner with the given history would get for `start`.
    Plan {
        /// Topics already completed; repeat the flag for each one.
        #[arg(long = "history")]
        history: Vec<String>,
    },
    /// List the topic catalog in hand-out order.
    Topics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => handle_serve().await,
        Command::Plan { history } => {
            let topic = TopicCatalog::default().select_topic(&history);
            println!("{}", greeting_reply(&topic));
            Ok(())
        }
        Command::Topics => {
            for (i, topic) in TopicCatalog::default().topics().iter().enumerate() {
                println!("{:>2}. {topic}", i.saturating_add(1));
            }
            Ok(())
        }
    }
}

/// Run the webhook server until Ctrl-C.
async fn handle_serve() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(e).context("failed to load .env");
        }
    }

    let config = LearnerConfig::load().context("failed to load configuration")?;

    let _logging_guard = match config.logging.logs_dir.as_deref() {
        Some(dir) => Some(absolute_learner::logging::init_production(Path::new(dir))?),
        None => {
            absolute_learner::logging::init_cli();
            None
        }
    };

    config.report();
    config.validate()?;
    info!(
        model = %config.completion.model,
        store = %config.store.database_url,
        "configuration loaded"
    );

    let state = build_state(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr()))?;
    server::serve(
        listener,
        state,
        Duration::from_secs(config.server.shutdown_timeout_secs),
    )
    .await
}

/// Wire the store, completion provider, and delivery client together.
async fn build_state(config: &LearnerConfig) -> anyhow::Result<AppState> {
    let store = SqliteProfileStore::connect(&config.store.database_url)
        .await
        .context("failed to open profile store")?;

    let provider = OpenAiCompatProvider::new(
        config.completion.base_url.clone(),
        config.completion.model.clone(),
        config.completion.api_key.clone().unwrap_or_default(),
    );
    let policy = RetryPolicy {
        timeout: Duration::from_secs(config.completion.timeout_secs),
        max_retries: config.completion.max_retries,
        ..RetryPolicy::default()
    };
    let conversation = ConversationDelegate::new(Arc::new(provider), policy);

    let sender = TwilioClient::new(
        config.delivery.api_base.clone(),
        config.delivery.account_sid.clone().unwrap_or_default(),
        config.delivery.auth_token.clone().unwrap_or_default(),
        config.delivery.sender.as_deref().unwrap_or_default(),
        Duration::from_secs(config.delivery.timeout_secs),
    );

    let catalog = Arc::new(TopicCatalog::default());
    info!(topics = catalog.len(), "topic catalog loaded");

    let orchestrator = Orchestrator::new(
        Arc::new(store),
        catalog,
        conversation,
        Arc::new(sender),
    );
    Ok(AppState {
        orchestrator: Arc::new(orchestrator),
    })
}
