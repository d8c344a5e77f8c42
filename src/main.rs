// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use floatbot::chat::{Notifier, SlackClient};
use floatbot::config::BotConfig;
use floatbot::crm::{CrmApi, CrmClient};
use floatbot::dispatch::Dispatcher;
use floatbot::float::FloatClient;
use floatbot::report;
use floatbot::sync::Reconciler;

#[derive(Parser)]
#[command(
    name = "floatbot",
    about = "Slack bot that reconciles Float schedules into Salesforce PSA project tasks",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Optional TOML config file with non-secret overrides
    #[arg(long, env = "FLOATBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "FLOATBOT_LOG")]
    log: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot (default when no subcommand given).
    ///
    /// Connects to the Slack event stream and handles `sync`, `report`,
    /// and `plan` commands addressed at the bot.
    Serve,
    /// Run one Float → Salesforce sync from the command line.
    ///
    /// Reports go to stdout instead of a Slack channel; useful for
    /// cron-driven syncs and for trying a session token out.
    Sync {
        /// Salesforce session token
        #[arg(long, env = "SALESFORCE_SESSION_TOKEN")]
        session_token: String,
    },
    /// Build the weekly report CSV and write it to a local file.
    Report {
        /// Output path for the CSV
        #[arg(long, default_value = "weekly_report.csv")]
        out: PathBuf,
    },
}

/// Stand-in notifier for the one-shot subcommands: progress lines go to
/// stdout, uploads become local files.
struct CliNotifier;

#[async_trait::async_trait]
impl Notifier for CliNotifier {
    async fn post(&self, _channel: &str, text: &str) -> Result<(), floatbot::chat::ChatError> {
        println!("{text}");
        Ok(())
    }

    async fn upload(
        &self,
        _channel: &str,
        filename: &str,
        contents: &str,
    ) -> Result<(), floatbot::chat::ChatError> {
        // The report subcommand persists the CSV itself; just note it.
        println!("({filename}: {} bytes)", contents.len());
        Ok(())
    }
}

fn setup_logging(log_level: &str, log_format: &str) {
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = BotConfig::new(args.config.as_deref(), args.log);
    setup_logging(&config.log, &config.log_format);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sync { session_token } => one_shot_sync(config, &session_token).await,
        Command::Report { out } => one_shot_report(config, &out).await,
    }
}

async fn serve(config: BotConfig) -> Result<()> {
    let token = config.require_slack_token()?.to_string();
    let slack = SlackClient::new(&config.slack_api_url, &token)?;
    info!(version = env!("CARGO_PKG_VERSION"), "floatbot starting");
    Dispatcher::new(config, slack).run().await
}

async fn one_shot_sync(config: BotConfig, session_token: &str) -> Result<()> {
    let instance_url = config
        .salesforce_url
        .as_deref()
        .context("SALESFORCE_URL is not set")?;
    let crm = CrmClient::new(instance_url, session_token)?;
    CrmApi::verify_session(&crm)
        .await
        .context("Salesforce session check failed")?;

    let scheduling = FloatClient::new(&config)?;
    let notifier = CliNotifier;
    let report = Reconciler::new(&scheduling, &crm, &notifier, "stdout")
        .run()
        .await?;
    info!(updated = report.tasks_updated, "sync finished");
    Ok(())
}

async fn one_shot_report(config: BotConfig, out: &std::path::Path) -> Result<()> {
    let scheduling = FloatClient::new(&config)?;
    let notifier = CliNotifier;
    let today = chrono::Utc::now().date_naive();
    let csv =
        report::run_weekly_report(&scheduling, &notifier, "stdout", today).await?;
    std::fs::write(out, &csv).with_context(|| format!("writing {}", out.display()))?;
    println!("wrote {}", out.display());
    Ok(())
}
