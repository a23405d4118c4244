//! MCP (Model Context Protocol) server implementation

use async_trait::async_trait;
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ContentBlock, Implementation, InitializeResult,
    ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities, ServerCapabilitiesTools, TextContent, Tool,
    ToolInputSchema, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::mcp_server::{hyper_server, HyperServerOptions};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::envelope::ResponseEnvelope;
use crate::pipeline::Orchestrator;

pub struct NlsqlServerHandler {
    orchestrator: Arc<Orchestrator>,
}

fn string_property(description: &str) -> Map<String, Value> {
    let mut prop = Map::new();
    prop.insert("type".to_string(), Value::String("string".to_string()));
    prop.insert("description".to_string(), Value::String(description.to_string()));
    prop
}

fn tool(name: &str, description: &str, argument: Option<(&str, &str)>) -> Tool {
    let mut properties = HashMap::new();
    let mut required = Vec::new();
    if let Some((arg, arg_description)) = argument {
        properties.insert(arg.to_string(), string_property(arg_description));
        required.push(arg.to_string());
    }

    Tool {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema: ToolInputSchema::new(required, Some(properties)),
        title: None,
        annotations: None,
        meta: None,
        output_schema: None,
    }
}

fn text_result(text: String, is_error: bool) -> CallToolResult {
    CallToolResult {
        content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
        is_error: is_error.then_some(true),
        meta: None,
        structured_content: None,
    }
}

fn envelope_result(envelope: &ResponseEnvelope) -> CallToolResult {
    let text = serde_json::to_string_pretty(&envelope.to_json()).unwrap_or_default();
    text_result(text, !envelope.is_success())
}

fn required_arg(arguments: &Option<Map<String, Value>>, key: &str) -> Result<String, CallToolError> {
    arguments
        .as_ref()
        .and_then(|args| args.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CallToolError::from_message(format!("Missing required argument: {}", key)))
}

impl NlsqlServerHandler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Create server initialization details
    pub fn server_info() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "nlsql-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Natural Language to SQL Server".to_string()),
            },
            instructions: Some(
                "Natural language queries over a DuckDB database. \
                 Use 'query' for a single-shot translation, 'agent_query' for multi-step \
                 exploration, and 'catalog' to see the schema."
                    .to_string(),
            ),
            meta: None,
        }
    }

    /// Define available MCP tools
    pub fn tools() -> Vec<Tool> {
        vec![
            tool(
                "query",
                "Translate a natural language question to SQL and execute it. \
                 Returns a JSON envelope with status, message, records, columns, row_count and the SQL.",
                Some(("query", "Natural language question (e.g., 'how many stores are there?')")),
            ),
            tool(
                "agent_query",
                "Answer a natural language question with the SQL agent, which explores the \
                 database before settling on a query. Returns the same JSON envelope as 'query'.",
                Some(("query", "Natural language question")),
            ),
            tool(
                "translate",
                "Translate a natural language question to SQL without executing it.",
                Some(("query", "Natural language question")),
            ),
            tool(
                "execute",
                "Execute a SQL statement and return the JSON result envelope.",
                Some(("sql_query", "SQL text, with underscore table names (production_products)")),
            ),
            tool(
                "catalog",
                "Describe the database schema: tables, columns, keys and relationships.",
                None,
            ),
        ]
    }

    async fn handle_translate_tool(&self, question: &str) -> Result<CallToolResult, CallToolError> {
        match self.orchestrator.convert(question).await {
            Ok(sql) => {
                let text = serde_json::to_string_pretty(&json!({"status": "success", "sql_query": sql}))
                    .unwrap_or_default();
                Ok(text_result(text, false))
            }
            Err(e) => {
                error!("Failed to convert query: {}", e);
                Ok(envelope_result(&self.orchestrator.error_envelope(&e)))
            }
        }
    }

    async fn handle_catalog_tool(&self) -> Result<CallToolResult, CallToolError> {
        let schema = self.orchestrator.schema();
        let tables = self.orchestrator.list_tables().await.map_err(|e| {
            error!("Failed to list tables: {}", e);
            CallToolError::from_message(format!("Failed to list tables: {}", e))
        })?;

        let summary = format!(
            "Database Catalog: {} tables\n\nTables: {}\n\n{}",
            tables.len(),
            tables.join(", "),
            schema.to_prompt_text()
        );
        Ok(text_result(summary, false))
    }
}

#[async_trait]
impl ServerHandler for NlsqlServerHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        info!("Listing available tools");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        info!("Tool called: {}", request.params.name);
        let arguments = request.params.arguments;

        match request.params.name.as_str() {
            "query" => {
                let question = required_arg(&arguments, "query")?;
                Ok(envelope_result(&self.orchestrator.translate_and_run(&question).await))
            }
            "agent_query" => {
                let question = required_arg(&arguments, "query")?;
                Ok(envelope_result(&self.orchestrator.run_agent(&question).await))
            }
            "translate" => {
                let question = required_arg(&arguments, "query")?;
                self.handle_translate_tool(&question).await
            }
            "execute" => {
                let sql = required_arg(&arguments, "sql_query")?;
                Ok(envelope_result(&self.orchestrator.run_sql(&sql).await))
            }
            "catalog" => self.handle_catalog_tool().await,
            _ => Err(CallToolError::unknown_tool(request.params.name.clone())),
        }
    }
}

/// Serve MCP over HTTP with SSE support
pub async fn serve(host: String, port: u16, orchestrator: Arc<Orchestrator>) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting MCP server on {}:{}", host, port);

    let server = hyper_server::create_server(
        NlsqlServerHandler::server_info(),
        NlsqlServerHandler::new(orchestrator),
        HyperServerOptions {
            host,
            port,
            sse_support: true,
            ..Default::default()
        },
    );

    server.start().await?;

    Ok(())
}
