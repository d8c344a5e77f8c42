// SPDX-License-Identifier: MIT
//! Slack Web API client: post messages and upload files.
//!
//! Every response carries Slack's `{"ok": bool, "error": ...}` envelope;
//! a transport-level success with `ok: false` is still an error.

use serde_json::json;
use tracing::debug;

use super::{ChatError, Notifier};

/// Bot-token client for the Slack Web API.
pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// POST a JSON body to a Web API method and unwrap the `ok` envelope.
    pub(crate) async fn call(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ChatError> {
        let url = format!("{}/{method}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(body)
            .send()
            .await?;
        let payload: serde_json::Value = resp.json().await?;
        check_ok(method, payload)
    }
}

/// Unwrap Slack's `{"ok": bool}` envelope.
pub(crate) fn check_ok(
    method: &str,
    payload: serde_json::Value,
) -> Result<serde_json::Value, ChatError> {
    if payload["ok"].as_bool() == Some(true) {
        Ok(payload)
    } else {
        let error = payload["error"].as_str().unwrap_or("unknown_error");
        Err(ChatError::Api(format!("{method}: {error}")))
    }
}

#[async_trait::async_trait]
impl Notifier for SlackClient {
    async fn post(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        debug!(channel, "posting message");
        self.call(
            "chat.postMessage",
            &json!({ "channel": channel, "text": text }),
        )
        .await?;
        Ok(())
    }

    async fn upload(
        &self,
        channel: &str,
        filename: &str,
        contents: &str,
    ) -> Result<(), ChatError> {
        debug!(channel, filename, bytes = contents.len(), "uploading file");
        let form = reqwest::multipart::Form::new()
            .text("channels", channel.to_string())
            .text("filename", filename.to_string())
            .part(
                "file",
                reqwest::multipart::Part::text(contents.to_string())
                    .file_name(filename.to_string()),
            );

        let url = format!("{}/files.upload", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let payload: serde_json::Value = resp.json().await?;
        check_ok("files.upload", payload)?;
        Ok(())
    }
}
