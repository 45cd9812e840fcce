use crate::errors::ToolError;
use crate::mcp::catalog::{ensure_catalog, required_fields, tool_by_name, tool_catalog};
use crate::services::logger::Logger;
use crate::services::request_proxy::RequestProxy;
use crate::services::settings::Settings;
use crate::services::token_manager::TokenManager;
use crate::services::tool_executor::{ToolExecutor, ToolRegistry};
use crate::services::validation::Validation;
use crate::tools::builtin_registry;
use std::sync::Arc;

/// Service graph built once per process and shared by reference with every
/// tool call.
pub struct App {
    pub logger: Logger,
    pub settings: Settings,
    pub request_proxy: Arc<RequestProxy>,
    pub token_manager: Arc<TokenManager>,
    pub tool_executor: Arc<ToolExecutor>,
}

impl App {
    fn validate_tool_wiring(registry: &ToolRegistry) -> Result<(), ToolError> {
        ensure_catalog()?;
        let mut problems = Vec::new();
        for tool in tool_catalog() {
            let Some(handler) = registry.get(&tool.name) else {
                problems.push(format!("{}: no handler", tool.name));
                continue;
            };
            let declared: Vec<String> = handler
                .required_fields()
                .iter()
                .map(|s| s.to_string())
                .collect();
            if declared != required_fields(tool) {
                problems.push(format!("{}: required fields differ from schema", tool.name));
            }
        }
        for name in registry.names() {
            if tool_by_name(&name).is_none() {
                problems.push(format!("{}: missing from tool_catalog.json", name));
            }
        }
        if problems.is_empty() {
            return Ok(());
        }
        problems.sort();
        Err(ToolError::unexpected("Tool wiring is incomplete")
            .with_hint("Every tool in tool_catalog.json needs a matching handler.")
            .with_details(serde_json::json!({ "problems": problems })))
    }

    pub fn initialize(settings: Settings) -> Result<Self, ToolError> {
        let logger = Logger::new("infolab");
        let validation = Validation::new();

        let request_proxy = Arc::new(RequestProxy::new(logger.clone(), &settings)?);
        let token_manager = Arc::new(TokenManager::new(
            logger.clone(),
            &settings,
            request_proxy.clone(),
        ));

        let registry = builtin_registry();
        Self::validate_tool_wiring(&registry)?;

        let tool_executor = Arc::new(ToolExecutor::new(
            logger.clone(),
            validation,
            token_manager.clone(),
            request_proxy.clone(),
            registry,
        ));

        Ok(Self {
            logger,
            settings,
            request_proxy,
            token_manager,
            tool_executor,
        })
    }

    /// Probes authentication once. A failure is logged, not fatal: the
    /// backend may come up after us and every call re-authenticates anyway.
    pub async fn start(&self) {
        self.logger.info(
            "Starting Infolab MCP server",
            Some(&serde_json::json!({ "api_url": self.settings.api_url })),
        );
        let probe = async {
            let token = self.token_manager.get_token().await?;
            self.token_manager.validate_token(Some(&token)).await
        };
        match probe.await {
            Ok(true) => self.logger.info("Authentication test successful", None),
            Ok(false) => self
                .logger
                .warn("Authentication test failed - token invalid", None),
            Err(err) => self.logger.error(
                "Authentication test failed",
                Some(&serde_json::json!({ "reason": err.message })),
            ),
        }
    }

    pub fn close(&self) {
        self.logger.info("Shutting down Infolab MCP server", None);
        self.token_manager.close();
        self.request_proxy.close();
    }
}
