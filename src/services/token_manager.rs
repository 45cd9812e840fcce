//! Bearer token lifecycle shared by every tool call.
//!
//! One token is current at a time. Refreshes are single-flight: the first
//! caller that needs a new token starts the exchange and every concurrent
//! caller awaits the same shared future, so N waiters cost one network call
//! and all observe the same outcome.
//!
//! Validity is a local TTL (`min(token_ttl, expires_in - buffer)`) backed by
//! the backend validate endpoint once the TTL has lapsed.

use crate::constants::auth::{AUTHENTICATION_FAILED, EXPIRY_BUFFER_MS};
use crate::errors::{ToolError, ToolErrorKind};
use crate::services::logger::Logger;
use crate::services::request_proxy::RequestProxy;
use crate::services::settings::{Credential, Settings};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct Token {
    value: Arc<str>,
    obtained_at: DateTime<Utc>,
    expires_in: Option<Duration>,
}

impl Token {
    pub fn new(value: impl Into<String>, expires_in: Option<Duration>) -> Self {
        Self {
            value: Arc::from(value.into()),
            obtained_at: Utc::now(),
            expires_in,
        }
    }

    pub fn secret(&self) -> &str {
        &self.value
    }

    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }

    pub fn same_as(&self, other: &Token) -> bool {
        self.value == other.value
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[redacted]")
            .field("obtained_at", &self.obtained_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Clone)]
struct CachedToken {
    token: Token,
    fresh_until: Instant,
}

type RefreshFlight = Shared<BoxFuture<'static, Result<Token, ToolError>>>;

struct Inner {
    logger: Logger,
    proxy: Arc<RequestProxy>,
    credential: Credential,
    token_path: String,
    validate_path: String,
    token_ttl: Duration,
    current: RwLock<Option<CachedToken>>,
    flight: Mutex<Option<(u64, RefreshFlight)>>,
    flight_seq: AtomicU64,
    exchanges: AtomicU64,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(logger: Logger, settings: &Settings, proxy: Arc<RequestProxy>) -> Self {
        Self {
            inner: Arc::new(Inner {
                logger: logger.child("auth"),
                proxy,
                credential: settings.credential.clone(),
                token_path: settings.token_path.clone(),
                validate_path: settings.validate_path.clone(),
                token_ttl: settings.token_ttl,
                current: RwLock::new(None),
                flight: Mutex::new(None),
                flight_seq: AtomicU64::new(0),
                exchanges: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Cached token without touching the network.
    pub fn current(&self) -> Option<Token> {
        self.read_cache().map(|cached| cached.token)
    }

    /// Number of credential exchanges issued so far.
    pub fn exchange_count(&self) -> u64 {
        self.inner.exchanges.load(Ordering::Acquire)
    }

    pub async fn get_token(&self) -> Result<Token, ToolError> {
        if let Some(token) = self.current() {
            return Ok(token);
        }
        self.join_refresh(|_| true).await
    }

    /// With an explicit token, asks the backend. Without one, checks the cached
    /// token (refreshing first if there is none), using the local TTL before
    /// falling back to the backend.
    pub async fn validate_token(&self, token: Option<&Token>) -> Result<bool, ToolError> {
        match token {
            Some(token) => self.check_remote(token).await,
            None => {
                let token = self.get_token().await?;
                self.is_valid(&token).await
            }
        }
    }

    pub async fn refresh_token(&self) -> Result<Token, ToolError> {
        self.join_refresh(|_| false).await
    }

    /// Gate used by every tool call before it talks to the backend.
    pub async fn authenticate(&self) -> Result<Token, ToolError> {
        let checked = self.get_token().await?;
        if self.is_valid(&checked).await.map_err(as_authentication)? {
            return Ok(checked);
        }
        self.inner
            .logger
            .info("Cached token rejected, refreshing", None);
        let token = self.refresh_after_rejection(&checked).await?;
        if self
            .check_remote(&token)
            .await
            .map_err(as_authentication)?
        {
            self.mark_fresh(&token);
            return Ok(token);
        }
        self.invalidate(&token);
        Err(ToolError::authentication(AUTHENTICATION_FAILED))
    }

    /// Called after the backend answered 401 for `stale`. Returns the token
    /// another call already installed, or refreshes.
    pub async fn refresh_after_rejection(&self, stale: &Token) -> Result<Token, ToolError> {
        if let Some(current) = self.current() {
            if !current.same_as(stale) {
                return Ok(current);
            }
        }
        self.invalidate(stale);
        self.join_refresh(|current| !current.same_as(stale)).await
    }

    /// Drops `token` from the cache if it is still the current one.
    pub fn invalidate(&self, token: &Token) {
        let mut guard = self
            .inner
            .current
            .write()
            .unwrap_or_else(|err| err.into_inner());
        if guard
            .as_ref()
            .map(|cached| cached.token.same_as(token))
            .unwrap_or(false)
        {
            *guard = None;
            self.inner.logger.debug("Cached token invalidated", None);
        }
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut guard = self
            .inner
            .current
            .write()
            .unwrap_or_else(|err| err.into_inner());
        *guard = None;
    }

    /// Joins the in-flight exchange or starts one. With no flight running,
    /// a cached token accepted by `reuse` is returned instead; a flight that
    /// finished after the caller's first cache read has already stored its
    /// token by the time the slot is empty.
    async fn join_refresh<F>(&self, reuse: F) -> Result<Token, ToolError>
    where
        F: Fn(&Token) -> bool + Send,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(ToolError::authentication("Token manager is closed"));
        }
        let flight = {
            let mut slot = self.inner.flight.lock().unwrap_or_else(|err| err.into_inner());
            match slot.as_ref() {
                Some((_, flight)) => flight.clone(),
                None => {
                    if let Some(current) = self.current().filter(|token| reuse(token)) {
                        return Ok(current);
                    }
                    let id = self.inner.flight_seq.fetch_add(1, Ordering::AcqRel);
                    let this = self.clone();
                    let flight = async move {
                        let result = this.exchange_credential().await;
                        if let Ok(token) = &result {
                            this.store(token.clone());
                            this.inner.logger.info(
                                "Access token obtained",
                                Some(&serde_json::json!({
                                    "obtained_at": token.obtained_at().to_rfc3339(),
                                    "expires_in_secs": token.expires_in.map(|d| d.as_secs()),
                                })),
                            );
                        }
                        this.finish_flight(id);
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some((id, flight.clone()));
                    flight
                }
            }
        };
        flight.await
    }

    async fn is_valid(&self, token: &Token) -> Result<bool, ToolError> {
        if let Some(cached) = self.read_cache() {
            if cached.token.same_as(token) && Instant::now() < cached.fresh_until {
                return Ok(true);
            }
        }
        let valid = self.check_remote(token).await?;
        if valid {
            self.mark_fresh(token);
        }
        Ok(valid)
    }

    async fn check_remote(&self, token: &Token) -> Result<bool, ToolError> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), token.authorization_header());
        match self
            .inner
            .proxy
            .request(Method::GET, &self.inner.validate_path, None, Some(&headers))
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if matches!(err.status, Some(401) | Some(403)) => {
                self.inner.logger.info(
                    "Token rejected by backend",
                    Some(&serde_json::json!({ "status": err.status })),
                );
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn exchange_credential(&self) -> Result<Token, ToolError> {
        self.inner.exchanges.fetch_add(1, Ordering::AcqRel);
        self.inner.logger.info("Requesting new access token", None);
        let body = serde_json::json!({ "api_key": self.inner.credential.expose() });
        let response = self
            .inner
            .proxy
            .request(Method::POST, &self.inner.token_path, Some(&body), None)
            .await
            .map_err(|err| {
                self.inner.logger.warn(
                    "Token exchange failed",
                    Some(&serde_json::json!({ "kind": err.kind, "status": err.status })),
                );
                ToolError::authentication(format!(
                    "Failed to authenticate with API key: {}",
                    err.message
                ))
                .with_details(serde_json::json!({ "status": err.status }))
            })?;
        parse_token_response(&response)
    }

    fn store(&self, token: Token) {
        let fresh_until = Instant::now() + self.freshness(&token);
        let mut guard = self
            .inner
            .current
            .write()
            .unwrap_or_else(|err| err.into_inner());
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        *guard = Some(CachedToken { token, fresh_until });
    }

    fn mark_fresh(&self, token: &Token) {
        let fresh_until = Instant::now() + self.freshness(token);
        let mut guard = self
            .inner
            .current
            .write()
            .unwrap_or_else(|err| err.into_inner());
        if let Some(cached) = guard.as_mut() {
            if cached.token.same_as(token) {
                cached.fresh_until = fresh_until;
            }
        }
    }

    fn freshness(&self, token: &Token) -> Duration {
        let buffer = Duration::from_millis(EXPIRY_BUFFER_MS);
        match token.expires_in {
            Some(expires_in) => self
                .inner
                .token_ttl
                .min(expires_in.saturating_sub(buffer)),
            None => self.inner.token_ttl,
        }
    }

    fn finish_flight(&self, id: u64) {
        let mut slot = self.inner.flight.lock().unwrap_or_else(|err| err.into_inner());
        if slot.as_ref().map(|(current, _)| *current == id).unwrap_or(false) {
            *slot = None;
        }
    }

    fn read_cache(&self) -> Option<CachedToken> {
        self.inner
            .current
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

fn as_authentication(err: ToolError) -> ToolError {
    if err.kind == ToolErrorKind::Authentication {
        return err;
    }
    ToolError::authentication(format!("Authentication failed: {}", err.message))
}

fn parse_token_response(response: &Value) -> Result<Token, ToolError> {
    let value = response
        .get("access_token")
        .or_else(|| response.get("token"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .unwrap_or("");
    if value.is_empty() {
        return Err(ToolError::authentication(
            "Failed to authenticate with API key: token response did not include access_token",
        ));
    }
    let expires_in = response
        .get("expires_in")
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs);
    Ok(Token::new(value, expires_in))
}
