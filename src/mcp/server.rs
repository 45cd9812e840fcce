use crate::app::App;
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::tool_catalog;
use crate::mcp::notifier::McpNotifier;
use crate::mcp::protocol::{tool_result_content, CallToolParams, JsonRpcRequest, JsonRpcResponse};
use crate::services::logger::{init_tracing, Logger};
use crate::services::settings::Settings;
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "InfoLabMCPServer";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const SERVER_INSTRUCTIONS: &str = "Welcome to the InfoLab MCP Server!\n\n\
This server provides tools to interact with the InfoLab platform:\n\n\
1. `create_base` - Create a new base (course).\n\
2. `get_persona` - Get information about a persona.\n\
3. `refresh_persona` - Update a persona's content.\n";

pub struct McpServer {
    app: Arc<App>,
    logger: Logger,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        let logger = app.logger.child("mcp");
        Self { app, logger }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {"listChanged": false}, "logging": {}},
            "serverInfo": {"name": SERVER_NAME, "version": SERVER_VERSION},
            "instructions": SERVER_INSTRUCTIONS,
        })
    }

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<_> = tool_catalog()
            .iter()
            .filter(|tool| self.app.tool_executor.registry().contains(&tool.name))
            .collect();
        serde_json::json!({ "tools": tools })
    }

    async fn handle_tools_call(
        &self,
        params: Value,
        outbound: UnboundedSender<Value>,
    ) -> Result<Value, McpError> {
        let params: CallToolParams = serde_json::from_value(params)
            .map_err(|_| McpError::invalid_params("Missing tool name"))?;
        if params.name.trim().is_empty() {
            return Err(McpError::invalid_params("Missing tool name"));
        }
        let notifier = McpNotifier::new(outbound, params.progress_token(), params.name.clone());
        let outcome = self
            .app
            .tool_executor
            .execute(&params.name, params.arguments, &notifier)
            .await
            .map_err(|err| McpError::invalid_params(err.message))?;
        Ok(tool_result_content(&outcome))
    }

    /// Routes one inbound line. `tools/call` runs on its own task so slow
    /// backend calls do not block other requests.
    fn dispatch(
        self: &Arc<Self>,
        line: &str,
        outbound: &UnboundedSender<Value>,
        calls: &mut JoinSet<()>,
    ) {
        let request: JsonRpcRequest = match serde_json::from_str::<Value>(line) {
            Err(_) => {
                respond(
                    outbound,
                    JsonRpcResponse::failure(
                        Value::Null,
                        &McpError::new(ErrorCode::ParseError, "Parse error"),
                    ),
                );
                return;
            }
            Ok(parsed) => match serde_json::from_value(parsed) {
                Ok(req) => req,
                Err(_) => {
                    respond(
                        outbound,
                        JsonRpcResponse::failure(
                            Value::Null,
                            &McpError::new(ErrorCode::InvalidRequest, "Invalid request"),
                        ),
                    );
                    return;
                }
            },
        };

        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        let Some(id) = id else {
            self.logger.debug(
                "notification received",
                Some(&serde_json::json!({ "method": method })),
            );
            return;
        };

        match method.as_str() {
            "initialize" => respond(
                outbound,
                JsonRpcResponse::success(id, self.handle_initialize()),
            ),
            "ping" => respond(
                outbound,
                JsonRpcResponse::success(id, serde_json::json!({})),
            ),
            "tools/list" => respond(
                outbound,
                JsonRpcResponse::success(id, self.handle_tools_list()),
            ),
            "tools/call" => {
                let server = Arc::clone(self);
                let outbound = outbound.clone();
                calls.spawn(async move {
                    let response = match server
                        .handle_tools_call(params, outbound.clone())
                        .await
                    {
                        Ok(result) => JsonRpcResponse::success(id, result),
                        Err(err) => JsonRpcResponse::failure(id, &err),
                    };
                    respond(&outbound, response);
                });
            }
            _ => respond(
                outbound,
                JsonRpcResponse::failure(
                    id,
                    &McpError::new(ErrorCode::MethodNotFound, "Method not found"),
                ),
            ),
        }
    }

    /// Serves newline-delimited JSON-RPC until `reader` hits EOF, then waits
    /// for in-flight calls and flushes the writer.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<(), ToolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, mut queue) = mpsc::unbounded_channel::<Value>();
        let writer_logger = self.logger.clone();
        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(message) = queue.recv().await {
                let payload = match serde_json::to_string(&message) {
                    Ok(payload) => payload,
                    Err(err) => {
                        writer_logger.error(
                            "failed to encode outbound message; skipped",
                            Some(&serde_json::json!({ "reason": err.to_string() })),
                        );
                        continue;
                    }
                };
                let written = async {
                    writer.write_all(payload.as_bytes()).await?;
                    writer.write_all(b"\n").await?;
                    writer.flush().await
                };
                if let Err(err) = written.await {
                    writer_logger.warn(
                        "transport write failed; dropping further output",
                        Some(&serde_json::json!({ "reason": err.to_string() })),
                    );
                    break;
                }
            }
        });

        let mut lines = BufReader::new(reader).lines();
        let mut calls = JoinSet::new();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.dispatch(trimmed, &outbound, &mut calls);
            while let Some(finished) = calls.try_join_next() {
                if let Err(err) = finished {
                    self.logger.error(
                        "tool task failed",
                        Some(&serde_json::json!({ "reason": err.to_string() })),
                    );
                }
            }
        }

        self.logger.info("Client disconnected", None);
        while let Some(finished) = calls.join_next().await {
            if let Err(err) = finished {
                self.logger.error(
                    "tool task failed",
                    Some(&serde_json::json!({ "reason": err.to_string() })),
                );
            }
        }
        drop(outbound);
        let _ = writer_task.await;
        Ok(())
    }
}

fn respond(outbound: &UnboundedSender<Value>, response: JsonRpcResponse) {
    if let Ok(value) = serde_json::to_value(&response) {
        let _ = outbound.send(value);
    }
}

pub async fn run_stdio() -> Result<(), ToolError> {
    let settings = Settings::from_env()?;
    init_tracing(settings.log_level);

    let app = Arc::new(App::initialize(settings)?);
    app.start().await;

    let server = Arc::new(McpServer::new(app.clone()));
    let result = server
        .serve(tokio::io::stdin(), tokio::io::stdout())
        .await;
    app.close();
    result
}
