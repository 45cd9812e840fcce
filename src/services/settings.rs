use crate::constants::{auth, env as env_keys, network, protocols::ALLOWED_HTTP};
use crate::errors::ToolError;
use crate::services::logger::LogLevel;
use std::fmt;
use std::time::Duration;
use url::Url;

/// API key used to obtain bearer tokens. Never rendered by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([redacted])")
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub credential: Credential,
    pub request_timeout: Duration,
    pub token_ttl: Duration,
    pub token_path: String,
    pub validate_path: String,
    pub log_level: LogLevel,
}

impl Settings {
    pub fn new(api_url: &str, credential: Credential) -> Result<Self, ToolError> {
        Ok(Self {
            api_url: normalize_base_url(Some(api_url))?,
            credential,
            request_timeout: Duration::from_millis(network::TIMEOUT_API_REQUEST_MS),
            token_ttl: Duration::from_secs(auth::DEFAULT_TOKEN_TTL_SECS),
            token_path: auth::DEFAULT_TOKEN_PATH.to_string(),
            validate_path: auth::DEFAULT_VALIDATE_PATH.to_string(),
            log_level: LogLevel::Info,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Reads `.env` (if any) and then the process environment.
    pub fn from_env() -> Result<Self, ToolError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ToolError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = read(env_keys::API_URL).ok_or_else(|| {
            ToolError::validation(format!("{} is required", env_keys::API_URL))
                .with_hint("Set it to the backend base URL, e.g. \"https://api.infolab.example\".")
        })?;
        let api_key = read(env_keys::API_KEY).ok_or_else(|| {
            ToolError::validation(format!("{} is required", env_keys::API_KEY))
        })?;

        let mut settings = Self::new(&api_url, Credential::new(api_key))?;

        if let Some(raw) = read(env_keys::REQUEST_TIMEOUT_MS) {
            let ms = parse_positive(&raw, env_keys::REQUEST_TIMEOUT_MS)?;
            settings.request_timeout = Duration::from_millis(ms);
        }
        if let Some(raw) = read(env_keys::TOKEN_TTL_SECS) {
            let secs = raw.parse::<u64>().map_err(|_| {
                ToolError::validation(format!(
                    "{} must be a non-negative integer",
                    env_keys::TOKEN_TTL_SECS
                ))
            })?;
            settings.token_ttl = Duration::from_secs(secs);
        }
        if let Some(path) = read(env_keys::TOKEN_PATH) {
            settings.token_path = normalize_path(&path);
        }
        if let Some(path) = read(env_keys::VALIDATE_PATH) {
            settings.validate_path = normalize_path(&path);
        }
        if let Some(level) = read(env_keys::LOG_LEVEL) {
            settings.log_level = LogLevel::parse(&level);
        }
        Ok(settings)
    }
}

fn parse_positive(raw: &str, label: &str) -> Result<u64, ToolError> {
    match raw.parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ToolError::validation(format!(
            "{} must be a positive integer",
            label
        ))),
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn normalize_base_url(raw: Option<&str>) -> Result<String, ToolError> {
    let raw = raw.unwrap_or("").trim();
    if raw.is_empty() {
        return Err(ToolError::validation("api url is required"));
    }
    let mut url = Url::parse(raw).map_err(|_| {
        ToolError::validation("Invalid api url")
            .with_hint("Expected a valid URL, e.g. \"https://api.infolab.example\".")
            .with_details(serde_json::json!({ "api_url": raw }))
    })?;
    if !ALLOWED_HTTP.contains(&url.scheme()) {
        return Err(ToolError::validation(format!(
            "Unsupported api url scheme: {}",
            url.scheme()
        )));
    }
    url.set_fragment(None);
    url.set_query(None);
    let normalized = format!("{}{}", url.origin().ascii_serialization(), url.path());
    Ok(normalized.trim_end_matches('/').to_string())
}
