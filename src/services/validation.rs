use crate::errors::ToolError;
use serde_json::{Map, Value};

pub type ToolArgs = Map<String, Value>;

#[derive(Clone, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    /// Every field must be a string that is non-empty after trimming.
    pub fn ensure_required(&self, args: &ToolArgs, fields: &[&str]) -> Result<(), ToolError> {
        let missing: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|field| text_arg(args, field).is_none())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(ToolError::validation(format!(
            "Missing required parameters: {} must be provided.",
            join_fields(fields)
        ))
        .with_details(serde_json::json!({ "missing": missing })))
    }

    pub fn ensure_string(&self, args: &ToolArgs, field: &str) -> Result<String, ToolError> {
        args.get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ToolError::validation(format!("{} must be a string", field)))
    }

    /// `None` for absent, null, or blank values.
    pub fn optional_string(&self, args: &ToolArgs, field: &str) -> Option<String> {
        text_arg(args, field).map(|s| s.to_string())
    }
}

fn text_arg<'a>(args: &'a ToolArgs, field: &str) -> Option<&'a str> {
    args.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}

fn join_fields(fields: &[&str]) -> String {
    match fields {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

pub fn args_from_value(value: Value) -> ToolArgs {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
