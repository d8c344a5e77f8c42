// SPDX-License-Identifier: MIT
//! Slack integration: outbound Web API calls and the inbound RTM
//! event stream.

pub mod api;
pub mod stream;

pub use api::SlackClient;
pub use stream::{EventStream, MessageEvent};

/// Errors from Slack operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Slack API error: {0}")]
    Api(String),
    #[error("WebSocket error: {0}")]
    Socket(String),
    #[error("Event stream closed by server")]
    Disconnected,
}

/// Outbound messaging, as the reconciler and report builder see it.
///
/// Implemented by [`SlackClient`]; integration tests substitute a
/// recording fake so per-item reports can be asserted on.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Post a text message to a channel.
    async fn post(&self, channel: &str, text: &str) -> Result<(), ChatError>;

    /// Upload a file (the CSV artifacts) to a channel.
    async fn upload(&self, channel: &str, filename: &str, contents: &str)
        -> Result<(), ChatError>;
}
