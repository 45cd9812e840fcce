use crate::errors::ToolError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

static TOOL_CATALOG: Lazy<Result<Vec<ToolDef>, String>> = Lazy::new(|| {
    let raw = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tool_catalog.json"));
    serde_json::from_str(raw).map_err(|err| format!("tool_catalog.json is invalid: {}", err))
});

static TOOL_MAP: Lazy<HashMap<String, ToolDef>> = Lazy::new(|| {
    tool_catalog()
        .iter()
        .cloned()
        .map(|tool| (tool.name.clone(), tool))
        .collect()
});

/// Tools advertised by `tools/list`. Empty if the embedded catalog is broken;
/// `ensure_catalog` reports that at startup.
pub fn tool_catalog() -> &'static [ToolDef] {
    match TOOL_CATALOG.as_ref() {
        Ok(tools) => tools.as_slice(),
        Err(_) => &[],
    }
}

pub fn ensure_catalog() -> Result<(), ToolError> {
    TOOL_CATALOG
        .as_ref()
        .map(|_| ())
        .map_err(|err| ToolError::unexpected(err.clone()))
}

pub fn tool_by_name(name: &str) -> Option<&'static ToolDef> {
    TOOL_MAP.get(name)
}

/// Fields the schema marks as required. Must agree with the handler's list.
pub fn required_fields(tool: &ToolDef) -> Vec<String> {
    tool.input_schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
