//! Orchestrator: translate, execute, normalize
//!
//! Components are built once per process and handed in; the orchestrator
//! holds no mutable state besides its metrics. Each entry point runs inside a
//! `request` span tagged with a fresh request id.

use nlsql_duck::{is_read_only, run_blocking, DuckGateway, ExecutionError, ExecutionResult, IntrospectedSchema};
use nlsql_schema::{SchemaDescription, SchemaProvider, StaticSchema};
use nlsql_translate::{
    AgentError, AgentSettings, ChatModel, DirectSettings, DirectStrategy, SqlAgent, SqlArtifact, TranslationStrategy,
    WRITE_REFUSAL,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument, Level};
use uuid::Uuid;

use crate::config::{Config, ConfigError, SchemaSource};
use crate::envelope::{normalize, ResponseEnvelope};
use crate::error::PipelineError;
use crate::log_event;
use crate::metrics::PipelineMetrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] ExecutionError),

    #[error("Failed to read init script {path}: {source}")]
    InitScript {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub struct Orchestrator {
    schema: Arc<dyn SchemaProvider>,
    gateway: Arc<DuckGateway>,
    direct: Arc<dyn TranslationStrategy>,
    agent: Arc<SqlAgent>,
    metrics: PipelineMetrics,
    diagnostics: bool,
}

fn request_span(operation: &'static str) -> tracing::Span {
    info_span!("request", request_id = %Uuid::new_v4(), operation)
}

impl Orchestrator {
    pub fn new(
        schema: Arc<dyn SchemaProvider>,
        gateway: Arc<DuckGateway>,
        direct: Arc<dyn TranslationStrategy>,
        agent: Arc<SqlAgent>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            schema,
            gateway,
            direct,
            agent,
            metrics,
            diagnostics: false,
        }
    }

    /// Attach error detail chains to error envelopes
    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Wire every component from configuration around one chat model
    ///
    /// Opens the database, runs the init script when the database has no
    /// tables yet, and builds the schema provider once.
    pub fn from_config(config: &Config, model: Arc<dyn ChatModel>) -> Result<Self, StartupError> {
        let gateway = Arc::new(DuckGateway::open(&config.database.path, config.database.pool_size)?);
        info!(path = %config.database.path, pool_size = config.database.pool_size, "database opened");

        if let Some(script_path) = &config.database.init_script {
            if gateway.list_tables()?.is_empty() {
                let script = std::fs::read_to_string(script_path).map_err(|source| StartupError::InitScript {
                    path: script_path.clone(),
                    source,
                })?;
                gateway.run_script(&script)?;
                info!(script = %script_path, "database initialized");
            }
        }

        let schema: Arc<dyn SchemaProvider> = match config.schema.source {
            SchemaSource::Static => Arc::new(StaticSchema::bike_stores()),
            SchemaSource::Introspect => {
                let provider = IntrospectedSchema::new(Arc::clone(&gateway), config.schema.name.clone());
                // Build once at startup so every request sees the same description
                let described = provider.describe_schema();
                info!(tables = described.tables.len(), "introspected schema ready");
                Arc::new(provider)
            }
        };

        let direct = DirectStrategy::new(
            Arc::clone(&model),
            DirectSettings {
                dialect: config.llm.dialect.clone(),
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
            },
        );

        let agent_gateway = config.agent.enabled.then(|| Arc::clone(&gateway));
        if agent_gateway.is_none() {
            warn!("SQL agent disabled, agent requests will be answered with an error");
        }
        let agent = SqlAgent::new(
            model,
            agent_gateway,
            AgentSettings {
                top_k: config.agent.top_k,
                max_iterations: config.agent.max_iterations,
                sample_rows: config.agent.sample_rows,
                temperature: config.llm.temperature,
                dialect: config.llm.dialect.clone(),
            },
        );

        Ok(Self::new(schema, gateway, Arc::new(direct), Arc::new(agent), PipelineMetrics::new()?)
            .with_diagnostics(config.diagnostics))
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn schema(&self) -> SchemaDescription {
        self.schema.describe_schema()
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, ExecutionError> {
        run_blocking(&self.gateway, |g| g.list_tables()).await
    }

    pub fn error_envelope(&self, err: &PipelineError) -> ResponseEnvelope {
        ResponseEnvelope::from_error(err, self.diagnostics)
    }

    /// Direct translation to executable SQL, or the reason there is none
    ///
    /// Rejects an empty question and an empty schema before any model call.
    pub async fn convert(&self, question: &str) -> Result<String, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let schema = self.schema.describe_schema();
        if schema.is_empty() {
            return Err(PipelineError::GroundingUnavailable);
        }

        let started = Instant::now();
        let artifact = self.direct.translate(question, &schema).await;
        self.metrics.record_translation(self.direct.name(), artifact.outcome());
        log_event!(
            level: Level::INFO,
            event: "translation",
            strategy: self.direct.name(),
            outcome: artifact.outcome(),
            duration_ms: started.elapsed().as_millis() as u64
        );

        match artifact {
            SqlArtifact::Sql(sql) => Ok(sql),
            SqlArtifact::Refused(reason) => Err(PipelineError::Refused(reason)),
            SqlArtifact::Failed(message) => Err(PipelineError::CallFailure(message)),
        }
    }

    /// Direct strategy entry point
    pub async fn translate(&self, question: &str) -> SqlArtifact {
        let _timer = self.metrics.start_timer("translate");
        async {
            match self.convert(question).await {
                Ok(sql) => SqlArtifact::Sql(sql),
                Err(PipelineError::Refused(reason)) => SqlArtifact::Refused(reason),
                Err(e) => SqlArtifact::Failed(e.to_string()),
            }
        }
        .instrument(request_span("translate"))
        .await
    }

    /// Run already-authored SQL
    pub async fn execute(&self, sql: &str) -> ExecutionResult {
        let owned = sql.to_string();
        let result = run_blocking(&self.gateway, move |g| g.execute(&owned)).await;
        match &result {
            Ok(rows) => {
                self.metrics.record_execution("success");
                info!(row_count = rows.row_count, "query executed");
            }
            Err(e) => {
                self.metrics.record_execution("error");
                warn!(error = %e, "query failed");
            }
        }
        result
    }

    /// Execute SQL and normalize the outcome into an envelope
    pub async fn run_sql(&self, sql: &str) -> ResponseEnvelope {
        let _timer = self.metrics.start_timer("execute");
        async {
            let sql = sql.trim();
            if sql.is_empty() {
                return self.error_envelope(&PipelineError::EmptyQuestion);
            }
            let result = self.execute(sql).await;
            self.finish(normalize(result, sql))
        }
        .instrument(request_span("execute"))
        .await
    }

    /// Full direct pipeline; the gateway is never touched unless SQL came back
    pub async fn translate_and_run(&self, question: &str) -> ResponseEnvelope {
        let _timer = self.metrics.start_timer("translate_and_run");
        async {
            let sql = match self.convert(question).await {
                Ok(sql) => sql,
                Err(e) => return self.finish(Err(e)),
            };
            let result = self.execute(&sql).await;
            self.finish(normalize(result, &sql))
        }
        .instrument(request_span("translate_and_run"))
        .await
    }

    /// Full agent pipeline
    ///
    /// The SQL recovered from the agent's run is executed through the gateway
    /// so the envelope matches the direct pipeline's, plus the agent's answer
    /// and trace. Recovered SQL that would write is refused, never executed.
    pub async fn run_agent(&self, question: &str) -> ResponseEnvelope {
        let _timer = self.metrics.start_timer("run_agent");
        async {
            let question = question.trim();
            if question.is_empty() {
                return self.finish(Err(PipelineError::EmptyQuestion));
            }

            let outcome = match self.agent.translate_with_agent(question).await {
                Ok(outcome) => outcome,
                Err(AgentError::NotInitialized) => {
                    self.metrics.record_translation(self.agent.name(), "failed");
                    return self.finish(Err(PipelineError::AgentNotInitialized));
                }
                Err(AgentError::Llm(e)) => {
                    self.metrics.record_translation(self.agent.name(), "failed");
                    return self.finish(Err(PipelineError::CallFailure(format!(
                        "Error executing query with SQL agent: {}",
                        e
                    ))));
                }
            };
            info!(steps = outcome.trace.len(), answer = %outcome.output_text, "agent answered");

            let recovered = match outcome.recovered_sql() {
                None => {
                    self.metrics.record_translation(self.agent.name(), "failed");
                    Err(PipelineError::SqlNotRecoverable {
                        answer: outcome.output_text.clone(),
                    })
                }
                Some(sql) if !is_read_only(sql) => {
                    self.metrics.record_translation(self.agent.name(), "refused");
                    warn!(sql = %sql, "agent SQL would modify the database");
                    Err(PipelineError::Refused(WRITE_REFUSAL.to_string()))
                }
                Some(sql) => {
                    self.metrics.record_translation(self.agent.name(), "sql");
                    Ok(sql.to_string())
                }
            };

            let envelope = match recovered {
                Ok(sql) => {
                    let result = self.execute(&sql).await;
                    self.finish(normalize(result, &sql))
                }
                Err(e) => self.finish(Err(e)),
            };
            envelope.with_agent_run(outcome.output_text, outcome.trace)
        }
        .instrument(request_span("run_agent"))
        .await
    }

    fn finish(&self, outcome: Result<ResponseEnvelope, PipelineError>) -> ResponseEnvelope {
        match outcome {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "request failed");
                self.error_envelope(&e)
            }
        }
    }
}
