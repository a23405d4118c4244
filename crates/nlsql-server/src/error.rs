//! Pipeline error taxonomy
//!
//! Everything that can go wrong between a question and its result. The
//! orchestrator turns each variant into an error envelope, so none of these
//! ever reach a caller as a fault.

use nlsql_duck::ExecutionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No query provided")]
    EmptyQuestion,

    /// The schema provider came back empty
    #[error("Database schema unavailable, translation not attempted")]
    GroundingUnavailable,

    /// The model declined: off-topic, unsafe, vague or unknown data
    #[error("Query refused: {0}")]
    Refused(String),

    /// Transport, quota or response failure talking to the model
    #[error("{0}")]
    CallFailure(String),

    #[error("Error executing query: {source}")]
    Execution {
        #[source]
        source: ExecutionError,
        sql: String,
    },

    #[error("SQL agent not initialized")]
    AgentNotInitialized,

    #[error("SQL not recoverable from the agent's answer: {answer}")]
    SqlNotRecoverable { answer: String },
}

impl PipelineError {
    /// SQL the failure relates to, if any was produced
    pub fn sql(&self) -> Option<&str> {
        match self {
            PipelineError::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// Debug rendering of the error followed by its source chain
    pub fn traceback(&self) -> String {
        let mut out = format!("{:?}", self);
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\nCaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}
