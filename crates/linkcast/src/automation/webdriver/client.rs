//! Minimal W3C WebDriver client over HTTP.

use std::time::Duration;

use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::automation::markers::Locator;

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Error, Debug)]
pub enum WebDriverError {
    #[error("WebDriver transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebDriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("Unexpected WebDriver response: {0}")]
    UnexpectedResponse(String),

    #[error("No WebDriver session")]
    NoSession,
}

impl WebDriverError {
    /// The element went away between lookup and use.
    pub fn is_stale(&self) -> bool {
        matches!(self, WebDriverError::Protocol { error, .. } if error == "stale element reference")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef(pub String);

#[derive(Deserialize)]
struct Envelope {
    value: Value,
}

/// Thin wrapper around a driver endpoint (e.g. chromedriver) holding at
/// most one session id.
pub struct WebDriverClient {
    http: Client,
    endpoint: String,
    session_id: Option<String>,
}

impl WebDriverClient {
    pub fn new(endpoint: &str) -> Result<Self, WebDriverError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            session_id: None,
        })
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}{}", self.endpoint, path);
        debug!(%method, path, "WebDriver command");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope = response.json().await?;

        if status.is_success() {
            return Ok(envelope.value);
        }
        Err(protocol_error(&envelope.value, status.as_u16()))
    }

    fn session_path(&self, suffix: &str) -> Result<String, WebDriverError> {
        let id = self.session_id.as_deref().ok_or(WebDriverError::NoSession)?;
        Ok(format!("/session/{}{}", id, suffix))
    }

    pub async fn new_session(&mut self, capabilities: Value) -> Result<(), WebDriverError> {
        let value = self
            .command(
                Method::POST,
                "/session",
                Some(json!({ "capabilities": capabilities })),
            )
            .await?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))?;
        self.session_id = Some(id.to_string());
        Ok(())
    }

    /// Ends the current session. A no-op when none is open.
    pub async fn delete_session(&mut self) -> Result<(), WebDriverError> {
        let Some(path) = self.session_path("").ok() else {
            return Ok(());
        };
        // Forget the id first so a failed delete is never retried against
        // a half-dead browser.
        self.session_id = None;
        self.command(Method::DELETE, &path, None).await?;
        Ok(())
    }

    pub async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        let path = self.session_path("/url")?;
        self.command(Method::POST, &path, Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String, WebDriverError> {
        let path = self.session_path("/url")?;
        let value = self.command(Method::GET, &path, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))
    }

    pub async fn find_elements(
        &self,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, WebDriverError> {
        let path = self.session_path("/elements")?;
        let value = self
            .command(Method::POST, &path, Some(locator_body(locator)))
            .await?;
        parse_elements(&value)
    }

    pub async fn find_elements_from(
        &self,
        parent: &ElementRef,
        locator: &Locator,
    ) -> Result<Vec<ElementRef>, WebDriverError> {
        let path = self.session_path(&format!("/element/{}/elements", parent.0))?;
        let value = self
            .command(Method::POST, &path, Some(locator_body(locator)))
            .await?;
        parse_elements(&value)
    }

    pub async fn click(&self, element: &ElementRef) -> Result<(), WebDriverError> {
        let path = self.session_path(&format!("/element/{}/click", element.0))?;
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    pub async fn clear(&self, element: &ElementRef) -> Result<(), WebDriverError> {
        let path = self.session_path(&format!("/element/{}/clear", element.0))?;
        self.command(Method::POST, &path, Some(json!({}))).await?;
        Ok(())
    }

    pub async fn send_keys(&self, element: &ElementRef, text: &str) -> Result<(), WebDriverError> {
        let path = self.session_path(&format!("/element/{}/value", element.0))?;
        self.command(Method::POST, &path, Some(json!({ "text": text })))
            .await?;
        Ok(())
    }
}

fn locator_body(locator: &Locator) -> Value {
    json!({ "using": locator.using, "value": locator.value })
}

fn parse_elements(value: &Value) -> Result<Vec<ElementRef>, WebDriverError> {
    let items = value
        .as_array()
        .ok_or_else(|| WebDriverError::UnexpectedResponse(value.to_string()))?;
    items
        .iter()
        .map(|item| {
            item.get(ELEMENT_KEY)
                .and_then(Value::as_str)
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| WebDriverError::UnexpectedResponse(item.to_string()))
        })
        .collect()
}

fn protocol_error(value: &Value, status: u16) -> WebDriverError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("http {}", status));
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    WebDriverError::Protocol { error, message }
}
