//! Response envelope and result normalization
//!
//! Every pipeline entry point answers with the same shape:
//!
//! ```json
//! { "status": "success" | "error",
//!   "message": "...",
//!   "data": null | { "records": [...], "columns": [...], "row_count": 0, "sql_query": "..." },
//!   "sql_query": "..." }
//! ```
//!
//! The top-level `sql_query` appears whenever SQL exists, on success and on
//! failure. `traceback` only appears in diagnostic mode. Agent requests also
//! carry the agent's `answer` and its ordered tool `trace`.

use nlsql_duck::{is_read_only, ExecutionResult};
use nlsql_translate::AgentStep;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;

pub const SUCCESS_MESSAGE: &str = "Query executed successfully";
pub const EMPTY_RESULT_MESSAGE: &str = "Query executed successfully, but no results were returned";
pub const STATEMENT_MESSAGE: &str = "Statement executed successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultData {
    pub records: Vec<Map<String, Value>>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub sql_query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,
    pub message: String,
    pub data: Option<ResultData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<AgentStep>>,
}

impl ResponseEnvelope {
    pub fn success(message: impl Into<String>, data: Option<ResultData>, sql: &str) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            data,
            sql_query: Some(sql.to_string()),
            traceback: None,
            answer: None,
            trace: None,
        }
    }

    /// Error envelope; the traceback is attached only when `diagnostics` is on
    pub fn from_error(err: &PipelineError, diagnostics: bool) -> Self {
        Self {
            status: Status::Error,
            message: err.to_string(),
            data: None,
            sql_query: err.sql().map(str::to_string),
            traceback: diagnostics.then(|| err.traceback()),
            answer: None,
            trace: None,
        }
    }

    /// Attach the agent's final answer and tool trace
    pub fn with_agent_run(mut self, answer: String, trace: Vec<AgentStep>) -> Self {
        self.answer = Some(answer);
        self.trace = Some(trace);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({"status": "error", "message": format!("Failed to serialize response: {}", e), "data": null})
        })
    }
}

/// Turn an execution result into a success envelope or a pipeline error
///
/// - rows: success with records, columns and row count
/// - zero rows from a read: success with an empty data payload
/// - zero rows from a write: success with no data
/// - failure: [`PipelineError::Execution`] keeping the SQL
pub fn normalize(result: ExecutionResult, sql: &str) -> Result<ResponseEnvelope, PipelineError> {
    let result = result.map_err(|source| PipelineError::Execution {
        source,
        sql: sql.to_string(),
    })?;

    if result.is_empty() {
        if !is_read_only(sql) {
            return Ok(ResponseEnvelope::success(STATEMENT_MESSAGE, None, sql));
        }
        let data = ResultData {
            records: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
            sql_query: sql.to_string(),
        };
        return Ok(ResponseEnvelope::success(EMPTY_RESULT_MESSAGE, Some(data), sql));
    }

    let data = ResultData {
        row_count: result.row_count,
        records: result.records,
        columns: result.columns,
        sql_query: sql.to_string(),
    };
    Ok(ResponseEnvelope::success(SUCCESS_MESSAGE, Some(data), sql))
}
