//! Chat integration: mention intake, result notification and the Slack
//! transport underneath both.

pub mod ingest;
pub mod messages;
pub mod notifier;
pub mod slack;
pub mod url_extractor;
pub mod workspace;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::jobs::JobStoreError;
use crate::secrets::SecretError;

pub use ingest::Ingestor;
pub use notifier::SlackNotifier;
pub use url_extractor::{extract_and_validate_url, extract_url, extract_url_from_thread};
pub use workspace::{WorkspaceContext, WorkspaceRegistry};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Slack API {method} returned error: {error}")]
    Api { method: &'static str, error: String },

    #[error("Unexpected response from {method}: {reason}")]
    UnexpectedResponse { method: &'static str, reason: String },

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Unknown workspace '{0}'")]
    UnknownWorkspace(String),

    #[error("No valid chat workspace is configured")]
    NoWorkspaces,

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job store error: {0}")]
    Store(#[from] JobStoreError),
}

/// An `app_mention` as delivered by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionEvent {
    pub text: String,
    pub channel: String,
    pub user: String,
    /// Timestamp of the mention itself.
    pub ts: String,
    /// Parent timestamp when the mention was posted inside a thread.
    pub thread_ts: Option<String>,
    pub team: Option<String>,
}

impl MentionEvent {
    /// The thread replies belong to.
    pub fn thread(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// The subset of the chat Web API the bot needs.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Posts `text` into a thread and returns the new message's timestamp.
    async fn post_message(&self, channel: &str, thread_ts: &str, text: &str)
        -> Result<String, ChatError>;

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ChatError>;

    /// Text of the message that started the thread, if it still exists.
    async fn thread_parent_text(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Option<String>, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_defaults_to_message() {
        let mut event = MentionEvent {
            text: "hi".to_string(),
            channel: "C1".to_string(),
            user: "U1".to_string(),
            ts: "1700000001.000200".to_string(),
            thread_ts: None,
            team: None,
        };
        assert_eq!(event.thread(), "1700000001.000200");

        event.thread_ts = Some("1700000000.000100".to_string());
        assert_eq!(event.thread(), "1700000000.000100");
    }
}
