use crate::errors::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

/// Caller-facing notification channel for one tool call.
///
/// Implementations may fail (the caller went away); the envelope treats every
/// call as best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn info(&self, message: &str) -> Result<(), ToolError>;
    async fn error(&self, message: &str) -> Result<(), ToolError>;
    async fn report_progress(&self, current: u32, total: u32) -> Result<(), ToolError>;
}

/// Sends MCP notifications through the server's outbound queue.
pub struct McpNotifier {
    outbound: UnboundedSender<Value>,
    progress_token: Option<Value>,
    logger_name: String,
}

impl McpNotifier {
    pub fn new(
        outbound: UnboundedSender<Value>,
        progress_token: Option<Value>,
        logger_name: impl Into<String>,
    ) -> Self {
        Self {
            outbound,
            progress_token,
            logger_name: logger_name.into(),
        }
    }

    fn send(&self, method: &str, params: Value) -> Result<(), ToolError> {
        let message = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.outbound
            .send(message)
            .map_err(|_| ToolError::transport("Notification channel closed"))
    }

    fn log_message(&self, level: &str, message: &str) -> Result<(), ToolError> {
        self.send(
            "notifications/message",
            serde_json::json!({
                "level": level,
                "logger": self.logger_name,
                "data": message,
            }),
        )
    }
}

#[async_trait]
impl Notifier for McpNotifier {
    async fn info(&self, message: &str) -> Result<(), ToolError> {
        self.log_message("info", message)
    }

    async fn error(&self, message: &str) -> Result<(), ToolError> {
        self.log_message("error", message)
    }

    async fn report_progress(&self, current: u32, total: u32) -> Result<(), ToolError> {
        // Progress is only meaningful when the caller asked for it.
        let Some(token) = self.progress_token.as_ref() else {
            return Ok(());
        };
        self.send(
            "notifications/progress",
            serde_json::json!({
                "progressToken": token,
                "progress": current,
                "total": total,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn progress_is_sent_with_caller_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = McpNotifier::new(tx, Some(serde_json::json!("tok-1")), "get_persona");
        notifier.report_progress(1, 2).await.expect("send");
        let sent = rx.recv().await.expect("message");
        assert_eq!(sent["method"], "notifications/progress");
        assert_eq!(sent["params"]["progressToken"], "tok-1");
        assert_eq!(sent["params"]["progress"], 1);
        assert_eq!(sent["params"]["total"], 2);
    }

    #[tokio::test]
    async fn progress_without_token_is_skipped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = McpNotifier::new(tx, None, "get_persona");
        notifier.report_progress(0, 2).await.expect("noop");
        notifier.info("hello").await.expect("send");
        let sent = rx.recv().await.expect("message");
        assert_eq!(sent["method"], "notifications/message");
        assert_eq!(sent["params"]["level"], "info");
        assert_eq!(sent["params"]["data"], "hello");
    }

    #[tokio::test]
    async fn closed_channel_reports_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let notifier = McpNotifier::new(tx, Some(serde_json::json!(7)), "create_base");
        let err = notifier.error("boom").await.expect_err("closed");
        assert_eq!(err.kind, crate::errors::ToolErrorKind::Transport);
    }
}
