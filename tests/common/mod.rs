#![allow(dead_code)]

use async_trait::async_trait;
use infolab_mcp::app::App;
use infolab_mcp::errors::ToolError;
use infolab_mcp::mcp::notifier::Notifier;
use infolab_mcp::services::settings::{Credential, Settings};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const API_KEY: &str = "test-api-key";

/// Settings pointed at a mock backend. `ttl_secs` of 0 forces a validate
/// round-trip before every call.
pub fn settings_for(url: &str, ttl_secs: u64) -> Settings {
    Settings::new(url, Credential::new(API_KEY))
        .expect("settings")
        .with_token_ttl(Duration::from_secs(ttl_secs))
        .with_request_timeout(Duration::from_millis(2_000))
}

pub fn app_for(url: &str, ttl_secs: u64) -> App {
    App::initialize(settings_for(url, ttl_secs)).expect("app")
}

/// Token exchange mock, not yet created so callers can add `.expect(n)`.
pub fn mock_token(server: &mut mockito::ServerGuard, token: &str) -> mockito::Mock {
    server
        .mock("POST", "/mcp/auth/token")
        .match_body(mockito::Matcher::Json(
            serde_json::json!({ "api_key": API_KEY }),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(serde_json::json!({ "access_token": token, "expires_in": 3600 }).to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Info(String),
    Error(String),
    Progress(u32, u32),
}

/// Captures every notification. With `fail` set, records then errors.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events").clone()
    }

    pub fn progress(&self) -> Vec<(u32, u32)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Progress(current, total) => Some((current, total)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) -> Result<(), ToolError> {
        self.events.lock().expect("events").push(event);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ToolError::transport("client went away"));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn info(&self, message: &str) -> Result<(), ToolError> {
        self.record(Event::Info(message.to_string()))
    }

    async fn error(&self, message: &str) -> Result<(), ToolError> {
        self.record(Event::Error(message.to_string()))
    }

    async fn report_progress(&self, current: u32, total: u32) -> Result<(), ToolError> {
        self.record(Event::Progress(current, total))
    }
}
