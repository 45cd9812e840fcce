use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    Authentication,
    Validation,
    Backend,
    Transport,
    Unexpected,
}

impl ToolErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorKind::Authentication => "authentication",
            ToolErrorKind::Validation => "validation",
            ToolErrorKind::Backend => "backend",
            ToolErrorKind::Transport => "transport",
            ToolErrorKind::Unexpected => "unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            status: None,
            hint: None,
            details: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Authentication, "AUTHENTICATION", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Validation, "VALIDATION", message)
    }

    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Backend, "BACKEND", message).with_status(status)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Transport, "TRANSPORT", message)
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Unexpected, "UNEXPECTED", message)
    }

    /// Backend rejected the bearer token (as opposed to the request itself).
    pub fn is_unauthorized(&self) -> bool {
        self.kind == ToolErrorKind::Backend && self.status == Some(401)
    }
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::transport(err.to_string())
    }
}
