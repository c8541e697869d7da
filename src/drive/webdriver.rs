//! Just enough of the W3C WebDriver protocol to drive one Chrome session.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4a5b4ed46c7f";
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("javascript error: {0}")]
    Javascript(String),

    #[error("{error}: {message}")]
    Command { error: String, message: String },

    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl WebDriverError {
    /// The session or driver is gone; nothing further will succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            WebDriverError::Transport(_) | WebDriverError::Malformed(_) => true,
            WebDriverError::Command { error, message } => {
                matches!(
                    error.as_str(),
                    "invalid session id" | "session not created" | "no such window" | "disconnected"
                ) || message.starts_with("disconnected")
            }
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

fn decode(body: Value) -> Result<Value, WebDriverError> {
    let envelope: Envelope = serde_json::from_value(body)
        .map_err(|e| WebDriverError::Malformed(e.to_string()))?;

    if let Ok(wire) = serde_json::from_value::<WireError>(envelope.value.clone()) {
        return Err(match wire.error.as_str() {
            "no such element" => WebDriverError::NoSuchElement(wire.message),
            "javascript error" => WebDriverError::Javascript(wire.message),
            _ => WebDriverError::Command {
                error: wire.error,
                message: wire.message,
            },
        });
    }
    Ok(envelope.value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementId(String);

pub enum Wait {
    Ready(ElementId),
    /// Found, but never displayed and enabled before the deadline.
    NotReady,
    Absent,
}

pub struct WebDriver {
    http: reqwest::Client,
    base: String,
    session_id: String,
}

impl WebDriver {
    pub async fn start(base_url: &str, chrome_args: &[String]) -> Result<Self, WebDriverError> {
        // chromedriver is local; skip proxy settings from the environment
        let http = reqwest::Client::builder().no_proxy().build()?;
        let base = base_url.trim_end_matches('/').to_string();

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": chrome_args },
                }
            }
        });

        let body: Value = http
            .post(format!("{}/session", base))
            .json(&capabilities)
            .send()
            .await?
            .json()
            .await?;
        let value = decode(body)?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Malformed(format!("no sessionId in {}", value)))?
            .to_string();

        debug!("Started WebDriver session {}", session_id);
        Ok(Self { http, base, session_id })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base, self.session_id, path)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, WebDriverError> {
        let body: Value = self.http.post(self.url(path)).json(&body).send().await?.json().await?;
        decode(body)
    }

    async fn get(&self, path: &str) -> Result<Value, WebDriverError> {
        let body: Value = self.http.get(self.url(path)).send().await?.json().await?;
        decode(body)
    }

    pub async fn maximize(&self) -> Result<(), WebDriverError> {
        self.post("/window/maximize", json!({})).await.map(|_| ())
    }

    pub async fn goto(&self, url: &str) -> Result<(), WebDriverError> {
        debug!("Navigating to {}", url);
        self.post("/url", json!({ "url": url })).await.map(|_| ())
    }

    pub async fn find_xpath(&self, xpath: &str) -> Result<ElementId, WebDriverError> {
        let value = self
            .post("/element", json!({ "using": "xpath", "value": xpath }))
            .await?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|id| ElementId(id.to_string()))
            .ok_or_else(|| WebDriverError::Malformed(format!("no element reference in {}", value)))
    }

    async fn flag(&self, element: &ElementId, property: &str) -> Result<bool, WebDriverError> {
        let value = self.get(&format!("/element/{}/{}", element.0, property)).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn click(&self, element: &ElementId) -> Result<(), WebDriverError> {
        self.post(&format!("/element/{}/click", element.0), json!({}))
            .await
            .map(|_| ())
    }

    /// Runs `script` in the page; a returned promise is awaited by the driver.
    pub async fn execute(&self, script: &str) -> Result<Value, WebDriverError> {
        self.post("/execute/sync", json!({ "script": script, "args": [] })).await
    }

    /// Polls for `xpath` until it is displayed and enabled, or `timeout` passes.
    pub async fn wait_clickable(&self, xpath: &str, timeout: Duration) -> Result<Wait, WebDriverError> {
        let deadline = Instant::now() + timeout;
        let mut seen = false;

        loop {
            match self.find_xpath(xpath).await {
                Ok(element) => {
                    seen = true;
                    if self.flag(&element, "displayed").await? && self.flag(&element, "enabled").await? {
                        return Ok(Wait::Ready(element));
                    }
                }
                Err(WebDriverError::NoSuchElement(_)) => {}
                Err(e) => return Err(e),
            }

            if Instant::now() >= deadline {
                return Ok(if seen { Wait::NotReady } else { Wait::Absent });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn quit(self) -> Result<(), WebDriverError> {
        let body: Value = self
            .http
            .delete(format!("{}/session/{}", self.base, self.session_id))
            .send()
            .await?
            .json()
            .await?;
        decode(body)?;
        debug!("Closed WebDriver session {}", self.session_id);
        Ok(())
    }
}

/// Quotes `text` as an XPath 1.0 string literal.
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    let parts: Vec<String> = text
        .split('"')
        .map(|part| format!("\"{}\"", part))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}
