use crate::constants::auth::AUTHENTICATION_FAILED;
use crate::errors::{ToolError, ToolErrorKind};
use crate::mcp::notifier::Notifier;
use crate::services::logger::Logger;
use crate::services::request_proxy::RequestProxy;
use crate::services::token_manager::{Token, TokenManager};
use crate::services::validation::{args_from_value, ToolArgs, Validation};
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Backend call a tool maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: Method,
    pub path: String,
}

impl Endpoint {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
        }
    }
}

/// Per-tool configuration plugged into the shared envelope. Implementations
/// only describe the tool; authentication, validation, progress and error
/// shaping are done by [`ToolExecutor`].
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of progress steps; the call reports 0..=total.
    fn progress_total(&self) -> u32;

    fn required_fields(&self) -> &'static [&'static str];

    fn endpoint(&self, args: &ToolArgs, validation: &Validation) -> Result<Endpoint, ToolError>;

    /// JSON body for the backend, or `None` for body-less requests.
    fn build_payload(
        &self,
        args: &ToolArgs,
        validation: &Validation,
    ) -> Result<Option<Value>, ToolError>;

    fn start_message(&self, args: &ToolArgs) -> String;

    fn success_message(&self) -> &'static str;

    /// Prefix for caller-facing backend failure notifications.
    fn failure_context(&self) -> &'static str;
}

/// What a call hands back to the transport: the backend payload unchanged, or
/// an `{"error": ..., "kind": ...}` object.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub value: Value,
    pub is_error: bool,
}

impl ToolOutcome {
    fn success(value: Value) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    fn failure(value: Value) -> Self {
        Self {
            value,
            is_error: true,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error {
            return None;
        }
        self.value.get("error").and_then(|v| v.as_str())
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

/// Tracks one call's progress so reports stay strictly increasing.
struct ProgressState {
    total: u32,
    last: Option<u32>,
}

impl ProgressState {
    fn new(total: u32) -> Self {
        Self { total, last: None }
    }

    async fn report(&mut self, notifier: &dyn Notifier, logger: &Logger, current: u32) {
        let current = current.min(self.total);
        if self.last.map(|last| current <= last).unwrap_or(false) {
            return;
        }
        self.last = Some(current);
        best_effort(logger, notifier.report_progress(current, self.total)).await;
    }
}

#[derive(Clone)]
pub struct ToolExecutor {
    logger: Logger,
    validation: Validation,
    token_manager: Arc<TokenManager>,
    proxy: Arc<RequestProxy>,
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(
        logger: Logger,
        validation: Validation,
        token_manager: Arc<TokenManager>,
        proxy: Arc<RequestProxy>,
        registry: ToolRegistry,
    ) -> Self {
        Self {
            logger: logger.child("tool"),
            validation,
            token_manager,
            proxy,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Runs `name` through the envelope. Only an unknown tool name is an
    /// `Err`; every failure inside the call comes back as an error result.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        notifier: &dyn Notifier,
    ) -> Result<ToolOutcome, ToolError> {
        let handler = self
            .registry
            .get(name)
            .ok_or_else(|| {
                ToolError::validation(format!("Unknown tool: {}", name)).with_details(
                    serde_json::json!({ "available": self.registry.names() }),
                )
            })?;
        Ok(self.run(handler, args_from_value(args), notifier).await)
    }

    async fn run(
        &self,
        handler: Arc<dyn ToolHandler>,
        args: ToolArgs,
        notifier: &dyn Notifier,
    ) -> ToolOutcome {
        let logger = self.logger.child(handler.name());
        let started_at = chrono::Utc::now().timestamp_millis();
        let outcome = AssertUnwindSafe(self.drive(handler.as_ref(), &args, notifier, &logger))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(payload)) => ToolOutcome::success(payload),
            Ok(Err(err)) if err.kind == ToolErrorKind::Unexpected => ToolOutcome::failure(
                self.unexpected(&logger, notifier, &args, &err.message)
                    .await,
            ),
            Ok(Err(err)) => ToolOutcome::failure(error_result(&err)),
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                ToolOutcome::failure(self.unexpected(&logger, notifier, &args, &detail).await)
            }
        };

        logger.info(
            "tool call finished",
            Some(&serde_json::json!({
                "duration_ms": chrono::Utc::now().timestamp_millis() - started_at,
                "error": result.is_error,
            })),
        );
        result
    }

    async fn drive(
        &self,
        handler: &dyn ToolHandler,
        args: &ToolArgs,
        notifier: &dyn Notifier,
        logger: &Logger,
    ) -> Result<Value, ToolError> {
        let total = handler.progress_total();
        let mut progress = ProgressState::new(total);

        best_effort(logger, notifier.info(&handler.start_message(args))).await;
        progress.report(notifier, logger, 0).await;

        let token = match self.token_manager.authenticate().await {
            Ok(token) => token,
            Err(err) => {
                logger.warn(
                    "authentication failed",
                    Some(&serde_json::json!({ "reason": err.message })),
                );
                best_effort(logger, notifier.error("Authentication failed")).await;
                return Err(into_kind(err, ToolErrorKind::Authentication));
            }
        };

        if let Err(err) = self
            .validation
            .ensure_required(args, handler.required_fields())
        {
            best_effort(logger, notifier.error(&err.message)).await;
            return Err(err);
        }

        for step in 1..total {
            progress.report(notifier, logger, step).await;
        }

        let endpoint = handler
            .endpoint(args, &self.validation)
            .map_err(|err| into_kind(err, ToolErrorKind::Unexpected))?;
        let payload = handler
            .build_payload(args, &self.validation)
            .map_err(|err| into_kind(err, ToolErrorKind::Unexpected))?;

        let response = match self
            .call_backend(&endpoint, payload.as_ref(), token, logger)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let message = format!("{}: {}", handler.failure_context(), err.message);
                best_effort(logger, notifier.error(&message)).await;
                return Err(err);
            }
        };

        progress.report(notifier, logger, total).await;
        best_effort(logger, notifier.info(handler.success_message())).await;
        Ok(response)
    }

    /// One backend attempt, plus exactly one refresh-then-retry on 401.
    async fn call_backend(
        &self,
        endpoint: &Endpoint,
        payload: Option<&Value>,
        token: Token,
        logger: &Logger,
    ) -> Result<Value, ToolError> {
        match self.send(endpoint, payload, &token).await {
            Err(err) if err.is_unauthorized() => {
                logger.info("backend rejected token, refreshing once", None);
                let fresh = self.token_manager.refresh_after_rejection(&token).await?;
                match self.send(endpoint, payload, &fresh).await {
                    Err(err) if err.is_unauthorized() => {
                        self.token_manager.invalidate(&fresh);
                        Err(ToolError::authentication(AUTHENTICATION_FAILED).with_status(401))
                    }
                    other => other.map_err(into_backend),
                }
            }
            other => other.map_err(into_backend),
        }
    }

    async fn send(
        &self,
        endpoint: &Endpoint,
        payload: Option<&Value>,
        token: &Token,
    ) -> Result<Value, ToolError> {
        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), token.authorization_header());
        self.proxy
            .request(endpoint.method.clone(), &endpoint.path, payload, Some(&headers))
            .await
    }

    async fn unexpected(
        &self,
        logger: &Logger,
        notifier: &dyn Notifier,
        args: &ToolArgs,
        detail: &str,
    ) -> Value {
        let reference = uuid::Uuid::new_v4().to_string();
        logger.error(
            "unexpected error in tool call",
            Some(&serde_json::json!({
                "ref": reference,
                "detail": detail,
                "arg_keys": args.keys().collect::<Vec<_>>(),
            })),
        );
        best_effort(logger, notifier.error("An unexpected error occurred")).await;
        serde_json::json!({
            "error": format!("An unexpected error occurred (ref: {})", reference),
            "kind": ToolErrorKind::Unexpected.as_str(),
        })
    }
}

/// Caller-visible error shape.
pub fn error_result(err: &ToolError) -> Value {
    let mut out = serde_json::json!({
        "error": err.message,
        "kind": err.kind.as_str(),
    });
    if let (Some(status), Some(obj)) = (err.status, out.as_object_mut()) {
        obj.insert("status".to_string(), Value::from(status));
    }
    out
}

fn into_kind(mut err: ToolError, kind: ToolErrorKind) -> ToolError {
    err.kind = kind;
    err
}

fn into_backend(err: ToolError) -> ToolError {
    match err.kind {
        ToolErrorKind::Transport => into_kind(err, ToolErrorKind::Backend),
        _ => err,
    }
}

async fn best_effort<F>(logger: &Logger, send: F)
where
    F: Future<Output = Result<(), ToolError>>,
{
    if let Err(err) = send.await {
        logger.debug(
            "notification dropped",
            Some(&serde_json::json!({ "reason": err.message })),
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        return text.to_string();
    }
    if let Some(text) = panic.downcast_ref::<String>() {
        return text.clone();
    }
    "panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_result_includes_status_when_known() {
        let value = error_result(&ToolError::backend(409, "Course already exists"));
        assert_eq!(value["error"], "Course already exists");
        assert_eq!(value["kind"], "backend");
        assert_eq!(value["status"], 409);

        let value = error_result(&ToolError::validation("Missing required parameters: x"));
        assert!(value.get("status").is_none());
    }

    #[test]
    fn transport_failures_surface_as_backend_kind() {
        let err = into_backend(ToolError::transport("timed out"));
        assert_eq!(err.kind, ToolErrorKind::Backend);
        assert_eq!(err.message, "timed out");
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("bad index");
        assert_eq!(panic_message(boxed.as_ref()), "bad index");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
