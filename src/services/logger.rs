use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" | "trace" => LogLevel::Debug,
            _ => LogLevel::Info,
        }
    }

    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries the protocol.
///
/// `RUST_LOG` wins over `level` when set. Calling this twice is harmless.
pub fn init_tracing(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Context-scoped logger handle. Every event carries the `context` chain
/// (`infolab:auth`, `infolab:tool:get_persona`, ...) and optional JSON meta.
#[derive(Debug, Clone)]
pub struct Logger {
    context: Arc<str>,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self {
            context: Arc::from(context),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        if suffix.is_empty() {
            return self.clone();
        }
        Self {
            context: Arc::from(format!("{}:{}", self.context, suffix)),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn error(&self, message: &str, meta: Option<&Value>) {
        tracing::error!(context = %self.context, meta = %render_meta(meta), "{}", message);
    }

    pub fn warn(&self, message: &str, meta: Option<&Value>) {
        tracing::warn!(context = %self.context, meta = %render_meta(meta), "{}", message);
    }

    pub fn info(&self, message: &str, meta: Option<&Value>) {
        tracing::info!(context = %self.context, meta = %render_meta(meta), "{}", message);
    }

    pub fn debug(&self, message: &str, meta: Option<&Value>) {
        tracing::debug!(context = %self.context, meta = %render_meta(meta), "{}", message);
    }
}

fn render_meta(meta: Option<&Value>) -> String {
    match meta {
        Some(value) if !value.is_null() => value.to_string(),
        _ => String::new(),
    }
}
