// ABOUTME: valet entry point: logging, config, runtime startup, Ctrl-C shutdown.
// ABOUTME: `run` keeps the assistant and its feed monitors alive; `task` submits one task.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use valet::{Assistant, Config};

#[derive(Parser)]
#[command(name = "valet", about = "Personal-assistant backend")]
struct Cli {
    /// Path to the config file (defaults to VALET_CONFIG or ./valet.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the assistant and its feed monitors
    Run,
    /// Submit one task and print its result
    Task {
        /// Task category (e.g. document, mailbox, social)
        category: String,
        /// Task parameters as key=value pairs
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    tracing::info!(
        model = %config.llm.model,
        endpoint = %config.llm.endpoint,
        workers = config.dispatcher.workers,
        mailbox = config.mailbox.is_some(),
        share = config.share.is_some(),
        social = config.social.is_some(),
        "configuration loaded"
    );

    match cli.command {
        Command::Run => run(config).await,
        Command::Task { category, params } => run_task(config, category, params).await,
    }
}

async fn run(config: Config) -> Result<()> {
    let assistant = Assistant::builder(config).start()?;

    // Surface every event in the logs until a real subscriber is attached.
    let mut events = assistant.events();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::info!(event_type = event.event_type(), event = ?event, "assistant event");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event log subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tracing::info!("assistant running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("shutting down");
    assistant.shutdown().await;
    event_logger.abort();
    Ok(())
}

async fn run_task(config: Config, category: String, params: Vec<(String, String)>) -> Result<()> {
    let assistant = Assistant::builder(config).start()?;

    let parameters = Value::Object(
        params
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect(),
    );
    let result = assistant.run_task(&category, parameters).await?;
    assistant.shutdown().await;

    if result.success {
        let payload = result.payload.unwrap_or(Value::Null);
        println!("{}", serde_json::to_string_pretty(&payload)?);
        Ok(())
    } else {
        bail!("task failed: {}", result.error_message());
    }
}
