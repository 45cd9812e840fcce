use crate::errors::McpError;
use crate::services::tool_executor::ToolOutcome;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: &McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: error.code.as_i32(),
                message: error.message.clone(),
            }),
        }
    }
}

/// `tools/call` params. `_meta.progressToken` opts the caller into progress
/// notifications.
#[derive(Debug, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default, rename = "_meta")]
    pub meta: Option<CallToolMeta>,
}

#[derive(Debug, Deserialize)]
pub struct CallToolMeta {
    #[serde(default, rename = "progressToken")]
    pub progress_token: Option<Value>,
}

impl CallToolParams {
    pub fn progress_token(&self) -> Option<Value> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.progress_token.clone())
            .filter(|token| !token.is_null())
    }
}

/// Wraps a tool outcome as MCP `tools/call` content. `structuredContent` is
/// only set for object payloads.
pub fn tool_result_content(outcome: &ToolOutcome) -> Value {
    let text = serde_json::to_string(&outcome.value).unwrap_or_else(|_| "{}".to_string());
    let mut out = serde_json::json!({
        "content": [ { "type": "text", "text": text } ],
        "isError": outcome.is_error,
    });
    if let (true, Some(obj)) = (outcome.value.is_object(), out.as_object_mut()) {
        obj.insert("structuredContent".to_string(), outcome.value.clone());
    }
    out
}
