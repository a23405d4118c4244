//! Natural-language to SQL translation strategies
//!
//! Two interchangeable strategies sit behind [`TranslationStrategy`]:
//!
//! - [`DirectStrategy`]: one engineered prompt, one model call
//! - [`SqlAgent`]: a tool-using loop that probes the database first
//!
//! Both return a [`SqlArtifact`], so callers never branch on which one ran.

use async_trait::async_trait;
use nlsql_schema::SchemaDescription;

pub mod agent;
pub mod artifact;
pub mod direct;
pub mod extract;
pub mod llm;
pub mod prompt;

pub use agent::{AgentError, AgentOutcome, AgentSettings, AgentStep, AgentTools, SqlAgent, WRITE_REFUSAL};
pub use artifact::SqlArtifact;
pub use direct::{DirectSettings, DirectStrategy};
pub use extract::{extract_sql, recover_sql, SQL_NOT_RECOVERABLE};
pub use llm::{ChatMessage, ChatModel, ChatReply, ChatRequest, LlmError, OpenAiModel, ToolCall, ToolSpec};

#[async_trait]
pub trait TranslationStrategy: Send + Sync {
    /// Label used in logs and metrics
    fn name(&self) -> &'static str;

    /// Translate a question grounded in `schema`
    ///
    /// Never fails: call-level problems come back as [`SqlArtifact::Failed`].
    async fn translate(&self, question: &str, schema: &SchemaDescription) -> SqlArtifact;
}
