use crate::constants::network::USER_AGENT;
use crate::errors::ToolError;
use crate::services::logger::Logger;
use crate::services::settings::Settings;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Single-attempt JSON client for the backend API.
///
/// Every failure comes back as a [`ToolError`] of kind `Backend` (non-2xx
/// status) or `Transport` (network, timeout, body encoding).
#[derive(Clone)]
pub struct RequestProxy {
    logger: Logger,
    client: Client,
    base_url: String,
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl RequestProxy {
    pub fn new(logger: Logger, settings: &Settings) -> Result<Self, ToolError> {
        let client = build_client()?;
        Ok(Self {
            logger: logger.child("api"),
            client,
            base_url: settings.api_url.clone(),
            timeout: settings.request_timeout,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        headers: Option<&HashMap<String, String>>,
    ) -> Result<Value, ToolError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ToolError::transport("API client is closed"));
        }
        let url = join_url(&self.base_url, endpoint);
        let header_map = merge_headers(body.is_some(), headers)?;

        let mut req = self
            .client
            .request(method.clone(), &url)
            .headers(header_map)
            .timeout(self.timeout);
        if let Some(body) = body {
            let encoded = serde_json::to_vec(body).map_err(|err| {
                ToolError::transport(format!("Failed to encode request body: {}", err))
            })?;
            req = req.body(encoded);
        }

        let started = Instant::now();
        let response = req
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, self.timeout))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| map_reqwest_error(err, self.timeout))?;

        self.logger.debug(
            "backend response",
            Some(&serde_json::json!({
                "method": method.as_str(),
                "endpoint": endpoint,
                "status": status.as_u16(),
                "duration_ms": started.elapsed().as_millis() as u64,
            })),
        );

        if !status.is_success() {
            let parsed: Option<Value> = serde_json::from_str(&text).ok();
            let message = parsed
                .as_ref()
                .and_then(extract_error_message)
                .unwrap_or_else(|| format!("Backend request failed ({})", status.as_u16()));
            return Err(ToolError::backend(status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| {
            ToolError::transport(format!("Backend returned invalid JSON: {}", err))
                .with_status(status.as_u16())
        })
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

pub(crate) fn build_client() -> Result<Client, ToolError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| ToolError::transport(format!("Failed to build HTTP client: {}", err)))
}

pub(crate) fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> ToolError {
    if err.is_timeout() {
        return ToolError::transport(format!(
            "Backend request timed out after {}ms",
            timeout.as_millis()
        ));
    }
    ToolError::transport(format!("Backend request failed: {}", err))
}

pub(crate) fn join_url(base_url: &str, endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        format!("{}{}", base_url, endpoint)
    } else {
        format!("{}/{}", base_url, endpoint)
    }
}

/// Pull the human-readable message out of a backend error body, verbatim.
pub(crate) fn extract_error_message(value: &Value) -> Option<String> {
    for key in ["detail", "message", "error"] {
        match value.get(key) {
            Some(Value::String(text)) if !text.trim().is_empty() => return Some(text.clone()),
            Some(Value::Object(inner)) => {
                if let Some(Value::String(text)) = inner.get("message") {
                    return Some(text.clone());
                }
            }
            _ => {}
        }
    }
    None
}

fn merge_headers(
    has_body: bool,
    request_headers: Option<&HashMap<String, String>>,
) -> Result<HeaderMap, ToolError> {
    let mut map = HeaderMap::new();
    map.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if has_body {
        map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    if let Some(headers) = request_headers {
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ToolError::transport(format!("Invalid header name: {}", key)))?;
            let val = HeaderValue::from_str(value)
                .map_err(|_| ToolError::transport(format!("Invalid header value for {}", key)))?;
            map.insert(name, val);
        }
    }
    Ok(map)
}
