//! Slack Socket Mode: receives events over a WebSocket instead of HTTP.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, error, info, warn};

use super::client::SlackClient;
use crate::chat::{ChatError, Ingestor, MentionEvent, WorkspaceRegistry};

const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Reconnect delay that grows on consecutive failures and resets after a
/// connection ends cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReconnectBackoff {
    delay: Duration,
}

impl ReconnectBackoff {
    fn new() -> Self {
        Self {
            delay: BASE_RECONNECT_DELAY,
        }
    }

    fn reset(&mut self) -> Duration {
        self.delay = BASE_RECONNECT_DELAY;
        self.delay
    }

    /// Returns the pause before the next attempt and doubles the one after.
    fn failed(&mut self) -> Duration {
        let pause = self.delay;
        self.delay = (self.delay * 2).min(MAX_RECONNECT_DELAY);
        pause
    }
}

/// A decoded Socket Mode frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Hello,
    /// The server is about to drop the connection; open a new one.
    Disconnect { reason: String },
    /// An `app_mention` event. Must be acknowledged by `envelope_id`.
    Mention {
        envelope_id: String,
        event: MentionEvent,
    },
    /// Any other envelope; acknowledged if it carries an id, otherwise
    /// ignored.
    Other { envelope_id: Option<String> },
}

impl Envelope {
    pub fn envelope_id(&self) -> Option<&str> {
        match self {
            Envelope::Mention { envelope_id, .. } => Some(envelope_id),
            Envelope::Other { envelope_id } => envelope_id.as_deref(),
            Envelope::Hello | Envelope::Disconnect { .. } => None,
        }
    }
}

/// Parses one Socket Mode text frame.
pub fn parse_envelope(text: &str) -> Result<Envelope, ChatError> {
    let value: Value = serde_json::from_str(text).map_err(|e| ChatError::UnexpectedResponse {
        method: "socket_mode",
        reason: e.to_string(),
    })?;

    let str_at = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let envelope_id = str_at(&value, "envelope_id");

    match value.get("type").and_then(Value::as_str) {
        Some("hello") => Ok(Envelope::Hello),
        Some("disconnect") => Ok(Envelope::Disconnect {
            reason: str_at(&value, "reason").unwrap_or_default(),
        }),
        Some("events_api") => {
            let payload = value.get("payload").unwrap_or(&Value::Null);
            let event = payload.get("event").unwrap_or(&Value::Null);

            let is_mention = event.get("type").and_then(Value::as_str) == Some("app_mention");
            let mention = is_mention
                .then(|| {
                    Some(MentionEvent {
                        text: str_at(event, "text").unwrap_or_default(),
                        channel: str_at(event, "channel")?,
                        user: str_at(event, "user")?,
                        ts: str_at(event, "ts")?,
                        thread_ts: str_at(event, "thread_ts"),
                        team: str_at(payload, "team_id").or_else(|| str_at(event, "team")),
                    })
                })
                .flatten();

            match (mention, envelope_id) {
                (Some(event), Some(envelope_id)) => Ok(Envelope::Mention { envelope_id, event }),
                (_, envelope_id) => Ok(Envelope::Other { envelope_id }),
            }
        }
        _ => Ok(Envelope::Other { envelope_id }),
    }
}

/// Keeps a Socket Mode connection open and feeds mentions to the ingestor.
pub struct SocketModeListener {
    app_client: SlackClient,
    registry: Arc<WorkspaceRegistry>,
    ingestor: Ingestor,
}

impl SocketModeListener {
    pub fn new(
        app_client: SlackClient,
        registry: Arc<WorkspaceRegistry>,
        ingestor: Ingestor,
    ) -> Self {
        Self {
            app_client,
            registry,
            ingestor,
        }
    }

    /// Runs until `shutdown` turns true, reconnecting with exponential
    /// backoff whenever the connection drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = ReconnectBackoff::new();

        while !*shutdown.borrow() {
            let pause = match self.run_connection(&mut shutdown).await {
                Ok(()) => backoff.reset(),
                Err(e) => {
                    let pause = backoff.failed();
                    warn!(
                        error = %e,
                        delay_secs = pause.as_secs(),
                        "Socket Mode connection failed"
                    );
                    pause
                }
            };

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(pause) => {},
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                },
            }
        }

        info!("Socket Mode listener stopped");
    }

    /// Serves one connection. `Ok` means the server asked us to reconnect
    /// or shutdown was requested.
    async fn run_connection(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ChatError> {
        let url = self.app_client.open_connection().await?;
        let (mut stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ChatError::WebSocket(e.to_string()))?;
        info!("Socket Mode connected");

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => {
                            warn!("Socket Mode stream closed");
                            return Err(ChatError::WebSocket("connection closed".to_string()));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(ChatError::WebSocket(e.to_string())),
                    };

                    let envelope = match parse_envelope(text.as_str()) {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            warn!(error = %e, "Ignoring malformed Socket Mode frame");
                            continue;
                        }
                    };

                    if let Some(id) = envelope.envelope_id() {
                        let ack = json!({ "envelope_id": id }).to_string();
                        stream
                            .send(Message::Text(ack.into()))
                            .await
                            .map_err(|e| ChatError::WebSocket(e.to_string()))?;
                    }

                    match envelope {
                        Envelope::Hello => debug!("Socket Mode hello"),
                        Envelope::Disconnect { reason } => {
                            info!(reason = %reason, "Socket Mode asked to reconnect");
                            let _ = stream.close(None).await;
                            return Ok(());
                        }
                        Envelope::Mention { event, .. } => self.dispatch(event),
                        Envelope::Other { .. } => {}
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = stream.close(None).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the mention on its own task so the socket keeps reading.
    fn dispatch(&self, event: MentionEvent) {
        let Some(workspace) = self.registry.get(event.team.as_deref()).cloned() else {
            warn!(team = event.team.as_deref().unwrap_or(""), "Mention from unknown workspace");
            return;
        };
        let ingestor = self.ingestor.clone();
        tokio::spawn(async move {
            if let Err(e) = ingestor.handle_mention(&workspace, event).await {
                error!(team_id = %workspace.team_id, error = %e, "Failed to handle mention");
            }
        });
    }
}
