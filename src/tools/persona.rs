use crate::errors::ToolError;
use crate::services::tool_executor::{Endpoint, ToolHandler};
use crate::services::validation::{ToolArgs, Validation};
use serde_json::Value;

const GET_PERSONA_PATH: &str = "/mcp/get_persona";
const REFRESH_PERSONA_PATH: &str = "/mcp/refresh_persona";

fn title_of(args: &ToolArgs) -> &str {
    args.get("title").and_then(|v| v.as_str()).unwrap_or("")
}

/// `get_persona`: fetches a persona by title.
pub struct GetPersonaTool;

impl ToolHandler for GetPersonaTool {
    fn name(&self) -> &'static str {
        "get_persona"
    }

    fn progress_total(&self) -> u32 {
        2
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["title"]
    }

    fn endpoint(&self, args: &ToolArgs, validation: &Validation) -> Result<Endpoint, ToolError> {
        let title = validation.ensure_string(args, "title")?;
        let query = serde_urlencoded::to_string([("title", title.as_str())])
            .map_err(|err| ToolError::unexpected(format!("Failed to encode title: {}", err)))?;
        Ok(Endpoint::get(format!("{}?{}", GET_PERSONA_PATH, query)))
    }

    fn build_payload(
        &self,
        _args: &ToolArgs,
        _validation: &Validation,
    ) -> Result<Option<Value>, ToolError> {
        Ok(None)
    }

    fn start_message(&self, args: &ToolArgs) -> String {
        format!("Retrieving persona '{}'...", title_of(args))
    }

    fn success_message(&self) -> &'static str {
        "Persona retrieved successfully"
    }

    fn failure_context(&self) -> &'static str {
        "Error retrieving persona"
    }
}

/// `refresh_persona`: replaces a persona's content. `course_id` scopes the
/// update to a course persona and is left out of the body when blank.
pub struct RefreshPersonaTool;

impl ToolHandler for RefreshPersonaTool {
    fn name(&self) -> &'static str {
        "refresh_persona"
    }

    fn progress_total(&self) -> u32 {
        3
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["title", "new_content"]
    }

    fn endpoint(&self, _args: &ToolArgs, _validation: &Validation) -> Result<Endpoint, ToolError> {
        Ok(Endpoint::post(REFRESH_PERSONA_PATH))
    }

    fn build_payload(
        &self,
        args: &ToolArgs,
        validation: &Validation,
    ) -> Result<Option<Value>, ToolError> {
        let mut body = serde_json::Map::new();
        body.insert(
            "title".to_string(),
            Value::String(validation.ensure_string(args, "title")?),
        );
        body.insert(
            "new_content".to_string(),
            Value::String(validation.ensure_string(args, "new_content")?),
        );
        if let Some(course_id) = validation.optional_string(args, "course_id") {
            body.insert("course_id".to_string(), Value::String(course_id));
        }
        Ok(Some(Value::Object(body)))
    }

    fn start_message(&self, args: &ToolArgs) -> String {
        format!("Updating persona '{}'...", title_of(args))
    }

    fn success_message(&self) -> &'static str {
        "Persona updated successfully"
    }

    fn failure_context(&self) -> &'static str {
        "Error updating persona"
    }
}
