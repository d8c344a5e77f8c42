// SPDX-License-Identifier: MIT
//! Command dispatcher.
//!
//! The control loop of the bot: connect the event stream, read one
//! poll-interval's worth of inbound events, handle at most one
//! recognized direct-mention command per iteration, repeat. Any
//! stream failure drops the dispatcher back to Disconnected and it
//! reconnects with capped exponential backoff.
//!
//! Command handling never kills the loop — every failure becomes a
//! channel message and the dispatcher keeps polling.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::chat::{ChatError, EventStream, MessageEvent, Notifier, SlackClient};
use crate::config::BotConfig;
use crate::crm::{CrmApi, CrmClient, CrmError};
use crate::float::FloatClient;
use crate::report;
use crate::sync::Reconciler;

/// Fixed reply to unrecognized text addressed at the bot.
pub const HELP_TEXT: &str = "I understand these commands:\n\
    • `sync [session token]` — sync Float schedules into Salesforce\n\
    • `report` — weekly scheduling report CSV\n\
    • `plan <session token> <YYYY-MM-DD>` — export project tasks modified since a date";

// ─── Command grammar ──────────────────────────────────────────────────────────

/// A recognized direct-mention command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Sync { session_token: Option<String> },
    Report,
    Plan {
        session_token: String,
        modified_since: NaiveDate,
    },
    /// Addressed to the bot but not understood.
    Help,
}

/// Parse a message into a command, if it is addressed at the bot.
///
/// Mentions arrive as `<@UXXXX> rest of text`; anything not opening
/// with the bot's own mention is ignored entirely.
pub fn parse_command(self_id: &str, text: &str) -> Option<Command> {
    let mention = format!("<@{self_id}>");
    let rest = text.trim().strip_prefix(&mention)?.trim();
    let mut words = rest.split_whitespace();

    match words.next() {
        Some("sync") => Some(Command::Sync {
            session_token: words.next().map(str::to_string),
        }),
        Some("report") => Some(Command::Report),
        Some("plan") => {
            let token = words.next();
            let date = words.next().and_then(|d| d.parse::<NaiveDate>().ok());
            match (token, date) {
                (Some(token), Some(modified_since)) => Some(Command::Plan {
                    session_token: token.to_string(),
                    modified_since,
                }),
                _ => Some(Command::Help),
            }
        }
        _ => Some(Command::Help),
    }
}

// ─── Reconnect policy ─────────────────────────────────────────────────────────

/// Backoff between reconnect attempts. Unlimited attempts; the delay
/// doubles up to the cap and resets on a successful handshake.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: std::time::Duration,
    pub max_delay: std::time::Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl ReconnectPolicy {
    /// The delay following `current`, multiplied and capped.
    pub fn next_delay(&self, current: std::time::Duration) -> std::time::Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier) as u128;
        std::time::Duration::from_millis(next_ms.min(self.max_delay.as_millis()) as u64)
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

/// The long-running command loop.
pub struct Dispatcher {
    config: BotConfig,
    slack: SlackClient,
    policy: ReconnectPolicy,
    /// The most recent session token supplied in-channel; `sync` with no
    /// token reuses it.
    last_session_token: Option<String>,
}

impl Dispatcher {
    pub fn new(config: BotConfig, slack: SlackClient) -> Self {
        Self {
            config,
            slack,
            policy: ReconnectPolicy::default(),
            last_session_token: None,
        }
    }

    /// Run forever: Disconnected → Connected → poll, with backoff on
    /// every drop back to Disconnected.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut delay = self.policy.initial_delay;
        loop {
            match EventStream::connect(&self.slack).await {
                Ok(stream) => {
                    delay = self.policy.initial_delay;
                    if let Err(e) = self.poll(stream).await {
                        warn!(err = %e, "event stream dropped — reconnecting");
                    }
                }
                Err(e) => {
                    warn!(err = %e, delay_ms = delay.as_millis(), "handshake failed — backing off");
                }
            }
            tokio::time::sleep(delay).await;
            delay = self.policy.next_delay(delay);
        }
    }

    /// Connected state: read batches until the stream fails. The read
    /// window itself paces the loop, so each iteration takes one
    /// `poll_interval`.
    async fn poll(&mut self, mut stream: EventStream) -> Result<(), ChatError> {
        loop {
            let events = stream.read_batch(self.config.poll_interval).await?;
            if let Some((channel, command)) = first_command(&stream.self_id, &events) {
                self.handle(&channel, command).await;
            }
        }
    }

    /// Execute one command; all failures become channel messages.
    async fn handle(&mut self, channel: &str, command: Command) {
        info!(channel, ?command, "handling command");
        let result = match command {
            Command::Help => self.slack.post(channel, HELP_TEXT).await.map_err(Into::into),
            Command::Sync { session_token } => self.handle_sync(channel, session_token).await,
            Command::Report => self.handle_report(channel).await,
            Command::Plan {
                session_token,
                modified_since,
            } => self.handle_plan(channel, &session_token, modified_since).await,
        };

        if let Err(e) = result {
            warn!(err = %e, "command failed");
            self.slack
                .post(channel, &format!("Command failed: {e:#}"))
                .await
                .ok();
        }
    }

    /// Build a CRM client for the supplied token, verifying the session.
    ///
    /// Session expiry is user-visible and aborts the command, never
    /// retried.
    async fn crm_for(&self, channel: &str, token: &str) -> anyhow::Result<Option<CrmClient>> {
        let instance_url = match self.config.salesforce_url.as_deref() {
            Some(url) => url,
            None => {
                self.slack
                    .post(channel, "SALESFORCE_URL is not configured on my side.")
                    .await?;
                return Ok(None);
            }
        };

        let crm = CrmClient::new(instance_url, token)?;
        match CrmApi::verify_session(&crm).await {
            Ok(()) => Ok(Some(crm)),
            Err(CrmError::SessionExpired) => {
                self.slack
                    .post(
                        channel,
                        "That Salesforce session is expired or invalid — \
                         please supply a fresh session token.",
                    )
                    .await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_sync(
        &mut self,
        channel: &str,
        session_token: Option<String>,
    ) -> anyhow::Result<()> {
        let Some(token) = session_token.or_else(|| self.last_session_token.clone()) else {
            self.slack
                .post(
                    channel,
                    "I need a Salesforce session token: `sync <session token>`.",
                )
                .await?;
            return Ok(());
        };

        let Some(crm) = self.crm_for(channel, &token).await? else {
            return Ok(());
        };
        self.last_session_token = Some(token);

        let scheduling = FloatClient::new(&self.config)?;
        self.slack.post(channel, "Starting Float → Salesforce sync…").await?;

        let reconciler = Reconciler::new(&scheduling, &crm, &self.slack, channel);
        let report = reconciler.run().await?;
        info!(
            updated = report.tasks_updated,
            duplicates = report.duplicates_flagged,
            errors = report.project_errors,
            "sync finished"
        );
        Ok(())
    }

    async fn handle_report(&self, channel: &str) -> anyhow::Result<()> {
        let scheduling = FloatClient::new(&self.config)?;
        self.slack.post(channel, "Building the weekly report…").await?;
        let today = chrono::Utc::now().date_naive();
        report::run_weekly_report(&scheduling, &self.slack, channel, today).await?;
        Ok(())
    }

    async fn handle_plan(
        &mut self,
        channel: &str,
        token: &str,
        modified_since: NaiveDate,
    ) -> anyhow::Result<()> {
        let Some(crm) = self.crm_for(channel, token).await? else {
            return Ok(());
        };
        self.last_session_token = Some(token.to_string());

        let count =
            report::plan::run_plan_export(&crm, &self.slack, channel, modified_since).await?;
        self.slack
            .post(
                channel,
                &format!("Exported {count} project task(s) modified since {modified_since}."),
            )
            .await?;
        Ok(())
    }
}

/// The first recognized command in a batch — at most one is handled per
/// iteration.
fn first_command(self_id: &str, events: &[MessageEvent]) -> Option<(String, Command)> {
    events
        .iter()
        .find_map(|e| parse_command(self_id, &e.text).map(|c| (e.channel.clone(), c)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaddressed_text_is_ignored() {
        assert_eq!(parse_command("UBOT", "sync abc"), None);
        assert_eq!(parse_command("UBOT", "<@UOTHER> sync abc"), None);
    }

    #[test]
    fn sync_with_and_without_token() {
        assert_eq!(
            parse_command("UBOT", "<@UBOT> sync 00Dxx!token"),
            Some(Command::Sync {
                session_token: Some("00Dxx!token".to_string())
            })
        );
        assert_eq!(
            parse_command("UBOT", "<@UBOT> sync"),
            Some(Command::Sync {
                session_token: None
            })
        );
    }

    #[test]
    fn report_command() {
        assert_eq!(parse_command("UBOT", "<@UBOT> report"), Some(Command::Report));
        assert_eq!(parse_command("UBOT", "  <@UBOT>   report  "), Some(Command::Report));
    }

    #[test]
    fn plan_requires_token_and_date() {
        assert_eq!(
            parse_command("UBOT", "<@UBOT> plan 00Dxx!token 2026-08-01"),
            Some(Command::Plan {
                session_token: "00Dxx!token".to_string(),
                modified_since: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            })
        );
        assert_eq!(parse_command("UBOT", "<@UBOT> plan 00Dxx!token"), Some(Command::Help));
        assert_eq!(
            parse_command("UBOT", "<@UBOT> plan 00Dxx!token not-a-date"),
            Some(Command::Help)
        );
    }

    #[test]
    fn anything_else_is_help() {
        assert_eq!(parse_command("UBOT", "<@UBOT> hello there"), Some(Command::Help));
        assert_eq!(parse_command("UBOT", "<@UBOT>"), Some(Command::Help));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::default();
        let d1 = policy.next_delay(policy.initial_delay);
        assert_eq!(d1, std::time::Duration::from_secs(2));
        let mut d = policy.initial_delay;
        for _ in 0..10 {
            d = policy.next_delay(d);
        }
        assert_eq!(d, policy.max_delay);
    }

    #[test]
    fn first_command_takes_one_per_batch() {
        let events = vec![
            MessageEvent {
                channel: "C1".into(),
                user: "U1".into(),
                text: "just chatting".into(),
            },
            MessageEvent {
                channel: "C2".into(),
                user: "U2".into(),
                text: "<@UBOT> report".into(),
            },
            MessageEvent {
                channel: "C3".into(),
                user: "U3".into(),
                text: "<@UBOT> sync tok".into(),
            },
        ];
        assert_eq!(
            first_command("UBOT", &events),
            Some(("C2".to_string(), Command::Report))
        );
    }
}
