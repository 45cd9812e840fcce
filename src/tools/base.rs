use crate::errors::ToolError;
use crate::services::tool_executor::{Endpoint, ToolHandler};
use crate::services::validation::{ToolArgs, Validation};
use serde_json::Value;

const CREATE_COURSE_PATH: &str = "/mcp/create_course";

/// `create_base`: creates a base (a backend "course") for the caller.
pub struct CreateBaseTool;

impl ToolHandler for CreateBaseTool {
    fn name(&self) -> &'static str {
        "create_base"
    }

    fn progress_total(&self) -> u32 {
        3
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["base_name", "base_description"]
    }

    fn endpoint(&self, _args: &ToolArgs, _validation: &Validation) -> Result<Endpoint, ToolError> {
        Ok(Endpoint::post(CREATE_COURSE_PATH))
    }

    fn build_payload(
        &self,
        args: &ToolArgs,
        validation: &Validation,
    ) -> Result<Option<Value>, ToolError> {
        Ok(Some(serde_json::json!({
            "course_name": validation.ensure_string(args, "base_name")?,
            "course_description": validation.ensure_string(args, "base_description")?,
        })))
    }

    fn start_message(&self, args: &ToolArgs) -> String {
        let name = args.get("base_name").and_then(|v| v.as_str()).unwrap_or("");
        format!("Creating base '{}'...", name)
    }

    fn success_message(&self) -> &'static str {
        "Base created successfully"
    }

    fn failure_context(&self) -> &'static str {
        "Error creating base"
    }
}
