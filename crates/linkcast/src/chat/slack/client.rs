//! Slack Web API calls used by the bot.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::chat::{ChatApi, ChatError};

/// Identity of the token owner, as reported by `auth.test`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthInfo {
    pub team_id: String,
    #[serde(rename = "team")]
    pub team_name: String,
    #[serde(rename = "user_id")]
    pub bot_user_id: Option<String>,
    pub bot_id: Option<String>,
}

/// Web API client bound to one token.
#[derive(Clone)]
pub struct SlackClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl SlackClient {
    pub fn new(base_url: &str, token: SecretString) -> Result<Self, ChatError> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    async fn post(&self, method: &'static str, body: Value) -> Result<Value, ChatError> {
        debug!(method, "Slack API call");
        let response = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await?;
        check_ok(method, response.json().await?)
    }

    async fn get(&self, method: &'static str, query: &[(&str, &str)]) -> Result<Value, ChatError> {
        debug!(method, "Slack API call");
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, method))
            .bearer_auth(self.token.expose_secret())
            .query(query)
            .send()
            .await?;
        check_ok(method, response.json().await?)
    }

    pub async fn auth_test(&self) -> Result<AuthInfo, ChatError> {
        let body = self.post("auth.test", json!({})).await?;
        serde_json::from_value(body).map_err(|e| ChatError::UnexpectedResponse {
            method: "auth.test",
            reason: e.to_string(),
        })
    }

    /// Requests a Socket Mode WebSocket URL. Needs an app-level token.
    pub async fn open_connection(&self) -> Result<String, ChatError> {
        let body = self.post("apps.connections.open", json!({})).await?;
        string_field(&body, "apps.connections.open", "url")
    }
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        let body = self
            .post(
                "chat.postMessage",
                json!({ "channel": channel, "thread_ts": thread_ts, "text": text }),
            )
            .await?;
        string_field(&body, "chat.postMessage", "ts")
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ChatError> {
        self.post("chat.delete", json!({ "channel": channel, "ts": ts }))
            .await?;
        Ok(())
    }

    async fn thread_parent_text(
        &self,
        channel: &str,
        thread_ts: &str,
    ) -> Result<Option<String>, ChatError> {
        let body = self
            .get(
                "conversations.replies",
                &[("channel", channel), ("ts", thread_ts), ("limit", "1")],
            )
            .await?;
        Ok(body
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .and_then(|parent| parent.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

/// Slack reports failures as HTTP 200 with `"ok": false`.
fn check_ok(method: &'static str, body: Value) -> Result<Value, ChatError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(body);
    }
    let error = body
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    Err(ChatError::Api { method, error })
}

fn string_field(body: &Value, method: &'static str, field: &str) -> Result<String, ChatError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::UnexpectedResponse {
            method,
            reason: format!("missing '{}'", field),
        })
}
