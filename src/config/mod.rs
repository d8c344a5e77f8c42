// SPDX-License-Identifier: MIT
//! Bot configuration.
//!
//! Priority (highest to lowest):
//!   1. CLI / env — passed as `Some(value)` from clap
//!   2. TOML file (`--config` / `FLOATBOT_CONFIG`)
//!   3. Built-in defaults
//!
//! All secrets (Slack bot token, Float API key) come from the process
//! environment; the TOML layer only carries non-secret overrides.

use std::path::Path;

use serde::Deserialize;
use tracing::error;

const DEFAULT_FLOAT_API_URL: &str = "https://api.float.com/v3";
const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Optional TOML override file — all fields are optional.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Float API base URL (default: https://api.float.com/v3).
    float_api_url: Option<String>,
    /// Slack Web API base URL. Override only for testing.
    slack_api_url: Option<String>,
    /// Salesforce instance URL, e.g. "https://na1.salesforce.com".
    salesforce_url: Option<String>,
    /// Log level filter string, e.g. "debug", "info,floatbot=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json".
    log_format: Option<String>,
    /// Milliseconds each event-stream read window lasts (default: 1000).
    poll_interval_ms: Option<u64>,
}

fn load_toml(path: &Path) -> Option<TomlConfig> {
    let contents = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config file — using defaults");
            None
        }
    }
}

/// Immutable process-wide configuration, loaded once at startup and
/// passed into each client constructor.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Slack bot token (SLACK_BOT_TOKEN). Required for `serve`.
    pub slack_bot_token: Option<String>,
    /// Slack Web API base URL (default: https://slack.com/api).
    pub slack_api_url: String,
    /// Float API key (FLOAT_API_KEY).
    pub float_api_key: Option<String>,
    /// Float API base URL (FLOAT_API_URL, default: https://api.float.com/v3).
    pub float_api_url: String,
    /// Salesforce instance URL (SALESFORCE_URL).
    pub salesforce_url: Option<String>,
    /// Log level filter (FLOATBOT_LOG, default: "info").
    pub log: String,
    /// Log output format: "pretty" (default) | "json" (FLOATBOT_LOG_FORMAT).
    pub log_format: String,
    /// Length of each event-stream read window; one command is handled
    /// per window.
    pub poll_interval: std::time::Duration,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout: std::time::Duration,
}

impl BotConfig {
    /// Build config from CLI/env args + optional TOML file.
    pub fn new(config_path: Option<&Path>, log: Option<String>) -> Self {
        let toml = config_path
            .and_then(load_toml)
            .unwrap_or_default();

        let slack_bot_token = env_nonempty("SLACK_BOT_TOKEN");
        let float_api_key = env_nonempty("FLOAT_API_KEY");

        let float_api_url = env_nonempty("FLOAT_API_URL")
            .or(toml.float_api_url)
            .unwrap_or_else(|| DEFAULT_FLOAT_API_URL.to_string());

        let slack_api_url = env_nonempty("SLACK_API_URL")
            .or(toml.slack_api_url)
            .unwrap_or_else(|| DEFAULT_SLACK_API_URL.to_string());

        let salesforce_url = env_nonempty("SALESFORCE_URL").or(toml.salesforce_url);

        let log = log
            .or(toml.log)
            .unwrap_or_else(|| "info".to_string());

        let log_format = env_nonempty("FLOATBOT_LOG_FORMAT")
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let poll_interval = std::time::Duration::from_millis(
            toml.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );

        Self {
            slack_bot_token,
            slack_api_url,
            float_api_key,
            float_api_url,
            salesforce_url,
            log,
            log_format,
            poll_interval,
            http_timeout: std::time::Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// The Slack bot token, or an error suitable for startup failure.
    ///
    /// A missing bot token is the one unrecoverable configuration error:
    /// without it the bot can neither read commands nor report anything.
    pub fn require_slack_token(&self) -> anyhow::Result<&str> {
        self.slack_bot_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("SLACK_BOT_TOKEN is not set — the bot cannot start"))
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}
