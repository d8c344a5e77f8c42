// SPDX-License-Identifier: MIT
//! Inbound Slack RTM event stream.
//!
//! Handshake: `rtm.connect` (Web API) returns the WebSocket URL plus the
//! bot's own user id; the socket then delivers JSON events. Only plain
//! `message` events are surfaced — edits, bot echoes, and everything
//! else on the firehose are dropped here so the dispatcher only ever
//! sees user text.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace};

use super::api::SlackClient;
use super::ChatError;

/// A user message observed on the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel: String,
    pub user: String,
    pub text: String,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    channel: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
}

/// Decode one raw stream frame into a message event, if it is one.
pub fn parse_event(raw: &str) -> Option<MessageEvent> {
    let event: RawEvent = serde_json::from_str(raw).ok()?;
    if event.kind != "message" || event.subtype.is_some() || event.bot_id.is_some() {
        return None;
    }
    if event.channel.is_empty() || event.user.is_empty() || event.text.is_empty() {
        return None;
    }
    Some(MessageEvent {
        channel: event.channel,
        user: event.user,
        text: event.text,
    })
}

/// A connected RTM session.
///
/// Generic over the socket so the read loop can be exercised over an
/// in-memory pipe; the live path always uses the TLS TCP default.
pub struct EventStream<S = MaybeTlsStream<TcpStream>> {
    ws: WebSocketStream<S>,
    /// The bot's own user id, used for direct-mention parsing.
    pub self_id: String,
}

impl EventStream {
    /// Perform the handshake and open the socket.
    pub async fn connect(client: &SlackClient) -> Result<Self, ChatError> {
        let payload = client.call("rtm.connect", &json!({})).await?;
        let url = payload["url"]
            .as_str()
            .ok_or_else(|| ChatError::Api("rtm.connect: missing socket url".to_string()))?
            .to_string();
        let self_id = payload["self"]["id"].as_str().unwrap_or_default().to_string();

        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| ChatError::Socket(e.to_string()))?;
        info!(self_id = %self_id, "event stream connected");
        Ok(Self { ws, self_id })
    }
}

impl<S> EventStream<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    /// Read whatever message events arrive within `window`.
    ///
    /// Returns an empty batch when the window elapses quietly; returns an
    /// error only when the socket itself fails or closes, which the
    /// dispatcher treats as a transition back to Disconnected.
    pub async fn read_batch(
        &mut self,
        window: std::time::Duration,
    ) -> Result<Vec<MessageEvent>, ChatError> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let frame = match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_) => break, // window elapsed
                Ok(None) => return Err(ChatError::Disconnected),
                Ok(Some(Err(e))) => return Err(ChatError::Socket(e.to_string())),
                Ok(Some(Ok(frame))) => frame,
            };

            match frame {
                Message::Text(raw) => {
                    trace!(%raw, "stream frame");
                    if let Some(event) = parse_event(&raw) {
                        debug!(channel = %event.channel, user = %event.user, "message event");
                        events.push(event);
                    }
                }
                Message::Ping(payload) => {
                    self.ws
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| ChatError::Socket(e.to_string()))?;
                }
                Message::Close(_) => return Err(ChatError::Disconnected),
                _ => {}
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_is_parsed() {
        let raw = r#"{"type":"message","channel":"C1","user":"U1","text":"<@UBOT> sync"}"#;
        assert_eq!(
            parse_event(raw),
            Some(MessageEvent {
                channel: "C1".into(),
                user: "U1".into(),
                text: "<@UBOT> sync".into(),
            })
        );
    }

    #[test]
    fn non_message_events_are_dropped() {
        assert!(parse_event(r#"{"type":"hello"}"#).is_none());
        assert!(parse_event(r#"{"type":"user_typing","channel":"C1","user":"U1"}"#).is_none());
    }

    #[test]
    fn edits_and_bot_echoes_are_dropped() {
        let edited =
            r#"{"type":"message","subtype":"message_changed","channel":"C1","user":"U1","text":"x"}"#;
        assert!(parse_event(edited).is_none());

        let bot = r#"{"type":"message","bot_id":"B1","channel":"C1","user":"U1","text":"x"}"#;
        assert!(parse_event(bot).is_none());
    }

    #[test]
    fn garbage_frames_are_dropped() {
        assert!(parse_event("not json").is_none());
        assert!(parse_event(r#"{"type":"message"}"#).is_none());
    }

    #[tokio::test]
    async fn read_batch_holds_the_window_open() {
        use tokio_tungstenite::tungstenite::protocol::Role;

        let (local, remote) = tokio::io::duplex(4096);
        let ws = WebSocketStream::from_raw_socket(local, Role::Client, None).await;
        let mut stream = EventStream {
            ws,
            self_id: "UBOT".to_string(),
        };

        // Keep the peer alive for the whole read so dropping it doesn't
        // reset the socket before the window elapses.
        let mut peer = WebSocketStream::from_raw_socket(remote, Role::Server, None).await;
        peer.send(Message::Text(
            r#"{"type":"message","channel":"C1","user":"U1","text":"<@UBOT> report"}"#
                .to_string(),
        ))
        .await
        .unwrap();

        // The window is the loop's pacing: even with an early event the
        // call occupies the whole interval before returning the batch.
        let window = std::time::Duration::from_millis(150);
        let start = std::time::Instant::now();
        let events = stream.read_batch(window).await.unwrap();
        assert!(start.elapsed() >= window);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "<@UBOT> report");
    }
}
