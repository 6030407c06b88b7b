//! W3C WebDriver client for headless Chrome.
//!
//! Talks plain HTTP/JSON to a driver endpoint such as `chromedriver
//! --port=9515`. Only the handful of commands the scroll controller needs are
//! implemented:
//!
//! | Command | Method | Path |
//! |---------|--------|------|
//! | New Session | `POST` | `/session` |
//! | Navigate To | `POST` | `/session/{id}/url` |
//! | Execute Script | `POST` | `/session/{id}/execute/sync` |
//! | Get Page Source | `GET` | `/session/{id}/source` |
//! | Delete Session | `DELETE` | `/session/{id}` |

use super::{RenderSession, Renderer};
use crate::error::RenderError;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";
const SCROLL_HEIGHT: &str = "return document.body.scrollHeight;";

/// Headless Chrome arguments suited to containers: no sandbox, no /dev/shm,
/// no GPU, no images, no extensions.
const CHROME_ARGS: &[&str] = &[
    "--headless=new",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--blink-settings=imagesEnabled=false",
    "--disable-extensions",
];

/// A WebDriver endpoint that hands out Chrome sessions.
#[derive(Debug, Clone)]
pub struct WebDriver {
    client: Client,
    endpoint: String,
    user_agent: String,
}

impl WebDriver {
    pub fn new(endpoint: &str, user_agent: &str) -> Result<Self, RenderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        })
    }

    fn capabilities(&self) -> Value {
        let mut args: Vec<String> = CHROME_ARGS.iter().map(|a| a.to_string()).collect();
        args.push(format!("--user-agent={}", self.user_agent));
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        })
    }
}

impl Renderer for WebDriver {
    type Session = WebDriverSession;

    #[instrument(level = "info", skip_all, fields(endpoint = %self.endpoint))]
    async fn open(&self) -> Result<WebDriverSession, RenderError> {
        let url = format!("{}/session", self.endpoint);
        let value = send(&self.client, Method::POST, &url, Some(self.capabilities())).await?;
        let id = session_id(&value)?;
        info!(session = %id, "WebDriver session started");
        Ok(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, id),
            id,
        })
    }
}

/// An open WebDriver session.
#[derive(Debug)]
pub struct WebDriverSession {
    client: Client,
    base: String,
    id: String,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RenderError> {
        let url = format!("{}/{}", self.base, path);
        send(&self.client, method, &url, body).await
    }

    async fn execute(&self, script: &str) -> Result<Value, RenderError> {
        self.command(
            Method::POST,
            "execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }
}

impl RenderSession for WebDriverSession {
    #[instrument(level = "info", skip(self), fields(session = %self.id))]
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.command(Method::POST, "url", Some(json!({ "url": url }))).await?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
        self.execute(SCROLL_TO_BOTTOM).await?;
        Ok(())
    }

    async fn scroll_height(&mut self) -> Result<u64, RenderError> {
        let value = self.execute(SCROLL_HEIGHT).await?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|h| *h >= 0.0).map(|h| h as u64))
            .ok_or_else(|| RenderError::Script(format!("scrollHeight is not a number: {value}")))
    }

    async fn page_source(&mut self) -> Result<String, RenderError> {
        match self.command(Method::GET, "source", None).await? {
            Value::String(source) => Ok(source),
            other => Err(RenderError::Malformed(format!("page source is not a string: {other}"))),
        }
    }

    #[instrument(level = "info", skip(self), fields(session = %self.id))]
    async fn close(self) -> Result<(), RenderError> {
        let result = send(&self.client, Method::DELETE, &self.base, None).await;
        match &result {
            Ok(_) => debug!("WebDriver session closed"),
            Err(e) => warn!(error = %e, "WebDriver session did not close cleanly"),
        }
        result.map(|_| ())
    }
}

async fn send(client: &Client, method: Method, url: &str, body: Option<Value>) -> Result<Value, RenderError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let mut payload: Value = response.json().await?;
    if !status.is_success() {
        return Err(protocol_error(status, &payload));
    }
    Ok(payload.get_mut("value").map(Value::take).unwrap_or(Value::Null))
}

fn protocol_error(status: StatusCode, payload: &Value) -> RenderError {
    let value = payload.get("value").unwrap_or(payload);
    let field = |name: &str| {
        value
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    };
    RenderError::Protocol {
        status: status.as_u16(),
        error: field("error"),
        message: field("message"),
    }
}

fn session_id(value: &Value) -> Result<String, RenderError> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| RenderError::Malformed(format!("no sessionId in new-session response: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_carry_headless_args_and_user_agent() {
        let driver = WebDriver::new("http://localhost:9515/", "TestAgent/1.0").unwrap();
        assert_eq!(driver.endpoint, "http://localhost:9515");

        let caps = driver.capabilities();
        let args = caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
            .as_array()
            .unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--blink-settings=imagesEnabled=false"));
        assert!(args.iter().any(|a| a == "--user-agent=TestAgent/1.0"));
        assert_eq!(caps["capabilities"]["alwaysMatch"]["browserName"], "chrome");
    }

    #[test]
    fn test_session_id_from_new_session_value() {
        let value = json!({ "sessionId": "abc123", "capabilities": {} });
        assert_eq!(session_id(&value).unwrap(), "abc123");
        assert!(matches!(session_id(&json!({})), Err(RenderError::Malformed(_))));
    }

    #[test]
    fn test_protocol_error_reads_w3c_error_body() {
        let payload = json!({
            "value": {
                "error": "session not created",
                "message": "Chrome failed to start",
                "stacktrace": ""
            }
        });
        match protocol_error(StatusCode::INTERNAL_SERVER_ERROR, &payload) {
            RenderError::Protocol { status, error, message } => {
                assert_eq!(status, 500);
                assert_eq!(error, "session not created");
                assert_eq!(message, "Chrome failed to start");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_protocol_error_tolerates_odd_bodies() {
        match protocol_error(StatusCode::NOT_FOUND, &json!("nope")) {
            RenderError::Protocol { status, error, .. } => {
                assert_eq!(status, 404);
                assert_eq!(error, "unknown");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
