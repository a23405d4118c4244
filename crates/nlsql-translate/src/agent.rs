//! Tool-using SQL agent
//!
//! The model may list tables, describe them, check and run exploratory
//! queries before it answers. Every tool invocation is recorded, in order, in
//! the trace. The SQL behind the answer is recovered heuristically from the
//! answer and the trace (see [`crate::extract`]).

use async_trait::async_trait;
use nlsql_duck::{is_read_only, run_blocking, DuckGateway, ExecutionError, TabularResult};
use nlsql_schema::SchemaDescription;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::artifact::SqlArtifact;
use crate::extract::{recover_sql, SQL_NOT_RECOVERABLE};
use crate::llm::{ChatMessage, ChatModel, ChatRequest, LlmError, ToolCall, ToolSpec};
use crate::TranslationStrategy;

pub const ITERATION_LIMIT_ANSWER: &str = "Agent stopped due to iteration limit.";

/// Refusal reason when the recovered SQL would modify the database
pub const WRITE_REFUSAL: &str = "The SQL agent only answers with read-only queries";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("SQL agent not initialized")]
    NotInitialized,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Most tables described, and most rows shown, per tool call
    pub top_k: usize,
    pub max_iterations: usize,
    /// Sample rows shown per described table
    pub sample_rows: usize,
    pub temperature: f32,
    pub dialect: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_iterations: 15,
            sample_rows: 3,
            temperature: 0.1,
            dialect: "DuckDB".to_string(),
        }
    }
}

/// One tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    pub tool: String,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub output_text: String,
    /// Recovered SQL, or [`SQL_NOT_RECOVERABLE`]
    pub sql_query: String,
    pub trace: Vec<AgentStep>,
}

impl AgentOutcome {
    pub fn recovered_sql(&self) -> Option<&str> {
        (self.sql_query != SQL_NOT_RECOVERABLE).then_some(self.sql_query.as_str())
    }
}

fn system_prompt(settings: &AgentSettings) -> String {
    format!(
        "You are an agent designed to interact with a SQL database.\n\
         Given an input question, create a syntactically correct {dialect} query to run, \
         then look at the results of the query and return the answer.\n\
         Unless the user specifies a specific number of examples, always limit your query \
         to at most {top_k} results.\n\
         Never query for all the columns of a table, only ask for the relevant columns.\n\
         Only use the tools below. Only use the information returned by the tools to construct \
         your final answer.\n\
         Always start by calling list_tables, then describe_tables for the relevant tables \
         (at most {top_k} per call).\n\
         You MUST double check your query with check_query before running it with run_query. \
         If you get an error, rewrite the query and try again.\n\
         Table names use underscores, not dots (production_products, not production.products).\n\
         DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.\n\
         If the question does not seem related to the database, answer \"I don't know\".\n\
         When you are done, reply with the answer followed by the final SQL query in a \
         ```sql fenced code block.",
        dialect = settings.dialect,
        top_k = settings.top_k,
    )
}

fn task_prompt(question: &str, dialect: &str) -> String {
    format!(
        "Use only valid {dialect} functions for date and time calculations, such as \
         EXTRACT(YEAR FROM order_date), DATE_PART('day', shipped_date - order_date) \
         or plain date subtraction.\n\n\
         Generate and execute an efficient SQL query to answer the following question:\n\n\
         Question: {question}"
    )
}

/// Schema and data probes available to the agent
pub struct AgentTools {
    gateway: Arc<DuckGateway>,
    top_k: usize,
    sample_rows: usize,
}

impl AgentTools {
    pub fn new(gateway: Arc<DuckGateway>, settings: &AgentSettings) -> Self {
        Self {
            gateway,
            top_k: settings.top_k.max(1),
            sample_rows: settings.sample_rows,
        }
    }

    pub fn specs() -> Vec<ToolSpec> {
        let query_param = json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "A single SQL statement"}
            },
            "required": ["query"]
        });

        vec![
            ToolSpec {
                name: "list_tables".to_string(),
                description: "List the tables in the database as a comma-separated string.".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolSpec {
                name: "describe_tables".to_string(),
                description: "Columns and sample rows for a comma-separated list of tables. \
                              Call list_tables first to be sure the tables exist."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "tables": {"type": "string", "description": "Comma-separated table names"}
                    },
                    "required": ["tables"]
                }),
            },
            ToolSpec {
                name: "check_query".to_string(),
                description: "Check that a SQL query is valid without running it. \
                              Always use this before run_query."
                    .to_string(),
                parameters: query_param.clone(),
            },
            ToolSpec {
                name: "run_query".to_string(),
                description: "Run a read-only SQL query and get the result. If the query is \
                              wrong an error message is returned; rewrite it and try again."
                    .to_string(),
                parameters: query_param,
            },
        ]
    }

    /// Run one tool call. Tool failures become observations, never errors.
    pub async fn invoke(&self, call: &ToolCall) -> AgentStep {
        let args: Value = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(args) => args,
                Err(e) => {
                    return AgentStep {
                        tool: call.name.clone(),
                        input: call.arguments.clone(),
                        output: format!("Error: invalid tool arguments: {}", e),
                    }
                }
            }
        };

        let (input, output) = match call.name.as_str() {
            "list_tables" => (String::new(), self.list_tables().await),
            "describe_tables" => {
                let input = string_arg(&args, "tables");
                let output = self.describe_tables(&input).await;
                (input, output)
            }
            "check_query" => {
                let input = string_arg(&args, "query");
                let output = self.check_query(&input).await;
                (input, output)
            }
            "run_query" => {
                let input = string_arg(&args, "query");
                let output = self.run_query(&input).await;
                (input, output)
            }
            other => (
                call.arguments.clone(),
                format!("Error: unknown tool '{}'. Use one of list_tables, describe_tables, check_query, run_query.", other),
            ),
        };

        AgentStep {
            tool: call.name.clone(),
            input,
            output,
        }
    }

    async fn list_tables(&self) -> String {
        match run_blocking(&self.gateway, |g| g.list_tables()).await {
            Ok(tables) => tables.join(", "),
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn describe_tables(&self, input: &str) -> String {
        let requested: Vec<String> = input
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if requested.is_empty() {
            return "Error: no table names given".to_string();
        }

        let (described, skipped) = requested.split_at(requested.len().min(self.top_k));
        let described = described.to_vec();
        let sample_rows = self.sample_rows;

        let rendered = run_blocking(&self.gateway, move |g| {
            let mut out = String::new();
            for table in &described {
                match g.describe_table(table) {
                    Ok(columns) => {
                        let _ = writeln!(out, "Table: {}", table);
                        out.push_str("Columns:\n");
                        for col in &columns {
                            let null = if col.nullable { "" } else { " NOT NULL" };
                            let _ = writeln!(out, "  - {} ({}){}", col.name, col.data_type, null);
                        }
                        if sample_rows > 0 {
                            let sample = g.sample_rows(table, sample_rows)?;
                            let _ = writeln!(out, "/*\n{} rows from {} table:", sample.row_count, table);
                            out.push_str(&render_rows(&sample, sample_rows));
                            out.push_str("*/\n");
                        }
                    }
                    Err(e @ ExecutionError::TableNotFound(_)) => {
                        let _ = writeln!(out, "Error: {}", e);
                    }
                    Err(e) => return Err(e),
                }
                out.push('\n');
            }
            Ok(out)
        })
        .await;

        let mut out = match rendered {
            Ok(out) => out,
            Err(e) => return format!("Error: {}", e),
        };
        if !skipped.is_empty() {
            let _ = writeln!(
                out,
                "Only the first {} tables were described. Ask again for: {}",
                self.top_k,
                skipped.join(", ")
            );
        }
        out.trim_end().to_string()
    }

    async fn check_query(&self, sql: &str) -> String {
        if sql.trim().is_empty() {
            return "Error: no query given".to_string();
        }
        let explain = format!("EXPLAIN {}", sql.trim().trim_end_matches(';'));
        match run_blocking(&self.gateway, move |g| g.execute(&explain)).await {
            Ok(_) => "The query is valid.".to_string(),
            Err(e) => format!("Error: {}", e),
        }
    }

    async fn run_query(&self, sql: &str) -> String {
        if sql.trim().is_empty() {
            return "Error: no query given".to_string();
        }
        if !is_read_only(sql) {
            return "Error: only read-only queries may be run while exploring the database".to_string();
        }
        let sql = sql.to_string();
        let top_k = self.top_k;
        match run_blocking(&self.gateway, move |g| g.execute(&sql)).await {
            Ok(result) => render_rows(&result, top_k),
            Err(e) => format!("Error: {}", e),
        }
    }
}

fn string_arg(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tab-separated rows, header first, at most `limit` rows
fn render_rows(result: &TabularResult, limit: usize) -> String {
    if result.row_count == 0 {
        return "The query returned no rows.\n".to_string();
    }

    let mut out = result.columns.join("\t");
    out.push('\n');
    for record in result.records.iter().take(limit) {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|c| record.get(c).map(render_cell).unwrap_or_default())
            .collect();
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
    if result.row_count > limit {
        let _ = writeln!(out, "... {} more rows not shown", result.row_count - limit);
    }
    out
}

pub struct SqlAgent {
    model: Arc<dyn ChatModel>,
    /// Grounding connection. `None` leaves the agent uninitialized.
    gateway: Option<Arc<DuckGateway>>,
    settings: AgentSettings,
}

impl SqlAgent {
    pub fn new(model: Arc<dyn ChatModel>, gateway: Option<Arc<DuckGateway>>, settings: AgentSettings) -> Self {
        Self {
            model,
            gateway,
            settings,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.gateway.is_some()
    }

    pub async fn translate_with_agent(&self, question: &str) -> Result<AgentOutcome, AgentError> {
        let gateway = self.gateway.as_ref().ok_or(AgentError::NotInitialized)?;
        let tools = AgentTools::new(Arc::clone(gateway), &self.settings);
        let started = Instant::now();

        let mut request = ChatRequest {
            messages: vec![
                ChatMessage::System(system_prompt(&self.settings)),
                ChatMessage::User(task_prompt(question, &self.settings.dialect)),
            ],
            tools: AgentTools::specs(),
            temperature: self.settings.temperature,
            max_tokens: None,
        };

        let mut trace = Vec::new();
        let mut answer = None;

        for iteration in 0..self.settings.max_iterations {
            let reply = self.model.chat(&request).await?;

            if reply.tool_calls.is_empty() {
                answer = Some(reply.content.unwrap_or_default());
                break;
            }

            request.messages.push(ChatMessage::Assistant {
                content: reply.content.clone(),
                tool_calls: reply.tool_calls.clone(),
            });

            for call in &reply.tool_calls {
                let step = tools.invoke(call).await;
                debug!(
                    iteration,
                    tool = %step.tool,
                    input = %step.input,
                    output_len = step.output.len(),
                    "agent step"
                );
                request.messages.push(ChatMessage::Tool {
                    call_id: call.id.clone(),
                    content: step.output.clone(),
                });
                trace.push(step);
            }
        }

        let output_text = answer.unwrap_or_else(|| {
            warn!(max_iterations = self.settings.max_iterations, "agent hit iteration limit");
            ITERATION_LIMIT_ANSWER.to_string()
        });
        let sql_query = recover_sql(&output_text, &trace);

        info!(
            steps = trace.len(),
            sql_recovered = sql_query != SQL_NOT_RECOVERABLE,
            duration_ms = started.elapsed().as_millis() as u64,
            "agent finished"
        );

        Ok(AgentOutcome {
            output_text,
            sql_query,
            trace,
        })
    }
}

#[async_trait]
impl TranslationStrategy for SqlAgent {
    fn name(&self) -> &'static str {
        "agent"
    }

    /// The agent grounds itself through its tools, so the schema is unused.
    async fn translate(&self, question: &str, _schema: &SchemaDescription) -> SqlArtifact {
        match self.translate_with_agent(question).await {
            Ok(outcome) => match outcome.recovered_sql() {
                Some(sql) if !is_read_only(sql) => SqlArtifact::Refused(WRITE_REFUSAL.to_string()),
                Some(sql) => SqlArtifact::Sql(sql.to_string()),
                None => SqlArtifact::Failed(format!("{}: {}", SQL_NOT_RECOVERABLE, outcome.output_text)),
            },
            Err(e) => SqlArtifact::Failed(e.to_string()),
        }
    }
}
