//! End-to-end pipeline tests: scripted models over the seeded BikeStores database

use async_trait::async_trait;
use nlsql_duck::DuckGateway;
use nlsql_schema::{SchemaDescription, StaticSchema};
use nlsql_server::config::Config;
use nlsql_server::metrics::PipelineMetrics;
use nlsql_server::{Orchestrator, Status};
use nlsql_translate::{
    AgentSettings, ChatModel, ChatReply, ChatRequest, DirectSettings, DirectStrategy, LlmError, SqlAgent,
    SqlArtifact, ToolCall,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SEED: &str = include_str!("../../../data/bike_stores.sql");
const SEED_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../data/bike_stores.sql");

/// Replays canned replies in order, then fails
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<ChatReply, LlmError>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<ChatReply, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn answering(text: &str) -> Arc<Self> {
        Self::new(vec![Ok(ChatReply::text(text))])
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn chat(&self, _request: &ChatRequest) -> Result<ChatReply, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}

fn tool_call(name: &str, arguments: Value) -> Result<ChatReply, LlmError> {
    Ok(ChatReply {
        content: None,
        tool_calls: vec![ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }],
    })
}

fn seeded_gateway() -> Arc<DuckGateway> {
    let gateway = DuckGateway::in_memory().expect("in-memory database");
    gateway.run_script(SEED).expect("seed script");
    Arc::new(gateway)
}

struct Harness {
    orchestrator: Orchestrator,
    gateway: Arc<DuckGateway>,
    model: Arc<ScriptedModel>,
}

fn harness_with(model: Arc<ScriptedModel>, schema: SchemaDescription, agent_ready: bool) -> Harness {
    let gateway = seeded_gateway();
    let direct = DirectStrategy::new(model.clone(), DirectSettings::default());
    let agent = SqlAgent::new(
        model.clone(),
        agent_ready.then(|| Arc::clone(&gateway)),
        AgentSettings::default(),
    );
    let orchestrator = Orchestrator::new(
        Arc::new(StaticSchema::new(schema)),
        Arc::clone(&gateway),
        Arc::new(direct),
        Arc::new(agent),
        PipelineMetrics::new().unwrap(),
    );
    Harness {
        orchestrator,
        gateway,
        model,
    }
}

fn harness(model: Arc<ScriptedModel>) -> Harness {
    harness_with(model, nlsql_schema::bike_stores(), true)
}

fn executions(orchestrator: &Orchestrator) -> usize {
    orchestrator
        .metrics()
        .render()
        .unwrap()
        .lines()
        .filter(|line| line.starts_with("nlsql_executions_total{"))
        .count()
}

#[tokio::test]
async fn test_store_count_round_trip() {
    let h = harness(ScriptedModel::answering(
        "```sql\nSELECT COUNT(*) AS store_count FROM sales_stores;\n```",
    ));

    let envelope = h.orchestrator.translate_and_run("how many stores are there?").await;

    assert_eq!(envelope.status, Status::Success);
    assert_eq!(envelope.message, "Query executed successfully");
    let sql = envelope.sql_query.clone().unwrap();
    assert_eq!(sql, "SELECT COUNT(*) AS store_count FROM sales_stores;");

    let data = envelope.data.unwrap();
    assert_eq!(data.row_count, 1);
    assert_eq!(data.columns, vec!["store_count"]);
    assert_eq!(data.records[0]["store_count"], json!(2));
    assert_eq!(data.sql_query, sql);

    // The SQL stands on its own
    let independent = h.gateway.execute(&sql).unwrap();
    assert_eq!(independent.records[0]["store_count"], json!(2));
}

#[tokio::test]
async fn test_refusal_never_reaches_database() {
    let h = harness(ScriptedModel::answering(
        "ERROR: Query appears to be a SQL injection attempt.",
    ));

    let envelope = h.orchestrator.translate_and_run("'; DROP TABLE sales_stores; --").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.message, "Query refused: Query appears to be a SQL injection attempt.");
    assert!(envelope.data.is_none());
    assert!(envelope.sql_query.is_none());
    assert_eq!(executions(&h.orchestrator), 0);
    assert_eq!(h.gateway.list_tables().unwrap().len(), 9);
}

#[tokio::test]
async fn test_translate_returns_tagged_artifact() {
    let h = harness(ScriptedModel::new(vec![
        Ok(ChatReply::text("SELECT store_name FROM sales_stores")),
        Ok(ChatReply::text("ERROR: Question is too vague.")),
        Err(LlmError::Timeout(Duration::from_secs(30))),
    ]));

    assert_eq!(
        h.orchestrator.translate("list the stores").await,
        SqlArtifact::Sql("SELECT store_name FROM sales_stores".to_string())
    );
    assert_eq!(
        h.orchestrator.translate("stuff").await,
        SqlArtifact::Refused("Question is too vague.".to_string())
    );
    assert_eq!(
        h.orchestrator.translate("list the brands").await,
        SqlArtifact::Failed("Failed to convert query: Model call timed out after 30s".to_string())
    );
    assert_eq!(executions(&h.orchestrator), 0);
}

#[tokio::test]
async fn test_call_failure_is_not_a_refusal() {
    let h = harness(ScriptedModel::new(vec![Err(LlmError::Timeout(Duration::from_secs(5)))]));

    let envelope = h.orchestrator.translate_and_run("how many stores are there?").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.message, "Failed to convert query: Model call timed out after 5s");
    assert_eq!(executions(&h.orchestrator), 0);
}

#[tokio::test]
async fn test_empty_question_short_circuits() {
    let h = harness(ScriptedModel::answering("SELECT 1"));

    for question in ["", "   "] {
        let envelope = h.orchestrator.translate_and_run(question).await;
        assert_eq!(envelope.status, Status::Error);
        assert_eq!(envelope.message, "No query provided");

        let envelope = h.orchestrator.run_agent(question).await;
        assert_eq!(envelope.message, "No query provided");
    }
    assert_eq!(h.model.calls(), 0);
    assert_eq!(executions(&h.orchestrator), 0);
}

#[tokio::test]
async fn test_empty_schema_means_grounding_unavailable() {
    let h = harness_with(ScriptedModel::answering("SELECT 1"), SchemaDescription::default(), true);

    let envelope = h.orchestrator.translate_and_run("how many stores are there?").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.message, "Database schema unavailable, translation not attempted");
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_execution_failure_keeps_sql() {
    let h = harness(ScriptedModel::answering("SELECT product_name FROM production.products"));

    let envelope = h.orchestrator.translate_and_run("list the products").await;

    assert_eq!(envelope.status, Status::Error);
    assert!(envelope.message.starts_with("Error executing query: "));
    assert!(envelope.message.contains("does not exist"));
    assert_eq!(
        envelope.sql_query.as_deref(),
        Some("SELECT product_name FROM production.products")
    );
    assert!(envelope.data.is_none());
    assert!(envelope.traceback.is_none());
}

#[tokio::test]
async fn test_diagnostics_attach_traceback() {
    let Harness { orchestrator, .. } = harness(ScriptedModel::default().into());
    let orchestrator = orchestrator.with_diagnostics(true);

    let envelope = orchestrator.run_sql("SELECT * FROM sales_nowhere").await;

    assert_eq!(envelope.status, Status::Error);
    let traceback = envelope.traceback.unwrap();
    assert!(traceback.starts_with("Execution {"));
    assert!(traceback.contains("Caused by:"));
}

#[tokio::test]
async fn test_zero_rows_is_success() {
    let h = harness(ScriptedModel::default().into());

    let envelope = h
        .orchestrator
        .run_sql("SELECT store_name FROM sales_stores WHERE store_id = 99")
        .await;

    assert_eq!(envelope.status, Status::Success);
    assert_eq!(envelope.message, "Query executed successfully, but no results were returned");
    let data = envelope.data.unwrap();
    assert_eq!(data.row_count, 0);
    assert!(data.records.is_empty());
    assert!(data.columns.is_empty());
}

#[tokio::test]
async fn test_write_statement_runs_as_given() {
    let h = harness(ScriptedModel::default().into());

    let envelope = h
        .orchestrator
        .run_sql("INSERT INTO production_brands VALUES (4, 'Haro')")
        .await;
    assert_eq!(envelope.status, Status::Success);

    let brands = h.gateway.execute("SELECT COUNT(*) AS n FROM production_brands").unwrap();
    assert_eq!(brands.records[0]["n"], json!(4));
}

#[tokio::test]
async fn test_agent_uninitialized_envelope() {
    let h = harness_with(
        ScriptedModel::answering("unused"),
        nlsql_schema::bike_stores(),
        false,
    );

    let envelope = h.orchestrator.run_agent("how many stores are there?").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.message, "SQL agent not initialized");
    assert!(envelope.data.is_none());
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_agent_envelope_matches_direct_shape() {
    let sql = "SELECT COUNT(*) AS store_count FROM sales_stores";
    let agent_model = ScriptedModel::new(vec![
        tool_call("list_tables", json!({})),
        tool_call("run_query", json!({ "query": sql })),
        Ok(ChatReply::text(format!("There are 2 stores.\n```sql\n{}\n```", sql))),
    ]);
    let agent = harness(agent_model).orchestrator.run_agent("how many stores are there?").await;
    let direct = harness(ScriptedModel::answering(sql))
        .orchestrator
        .translate_and_run("how many stores are there?")
        .await;

    assert_eq!(agent.status, direct.status);
    assert_eq!(agent.message, direct.message);
    assert_eq!(agent.data, direct.data);
    assert_eq!(agent.sql_query, direct.sql_query);
    assert_eq!(agent.data.as_ref().unwrap().records[0]["store_count"], json!(2));

    // Only the agent envelope carries the answer and the tool trace
    assert!(direct.answer.is_none() && direct.trace.is_none());
    assert_eq!(agent.answer.as_deref(), Some(format!("There are 2 stores.\n```sql\n{}\n```", sql).as_str()));
    let trace = agent.trace.unwrap();
    let tools: Vec<_> = trace.iter().map(|step| step.tool.as_str()).collect();
    assert_eq!(tools, vec!["list_tables", "run_query"]);
    assert_eq!(trace[1].input, sql);
    assert!(trace[1].output.starts_with("store_count\n2"));
}

#[tokio::test]
async fn test_agent_write_is_refused_not_executed() {
    let h = harness(ScriptedModel::new(vec![
        tool_call("run_query", json!({ "query": "DELETE FROM sales_order_items" })),
        Ok(ChatReply::text(
            "I am not allowed to modify data. The statement would be:\n```sql\nDELETE FROM sales_order_items\n```",
        )),
    ]));
    let before = h.gateway.execute("SELECT COUNT(*) AS n FROM sales_order_items").unwrap();

    let envelope = h.orchestrator.run_agent("delete every order item").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(
        envelope.message,
        "Query refused: The SQL agent only answers with read-only queries"
    );
    assert!(envelope.data.is_none());
    assert_eq!(executions(&h.orchestrator), 0);
    let after = h.gateway.execute("SELECT COUNT(*) AS n FROM sales_order_items").unwrap();
    assert_eq!(after.records[0]["n"], before.records[0]["n"]);
    assert_eq!(envelope.trace.unwrap().len(), 1);
}

#[tokio::test]
async fn test_agent_declining_after_exploring_is_not_a_success() {
    let h = harness(ScriptedModel::new(vec![
        tool_call("run_query", json!({ "query": "SELECT store_name FROM sales_stores LIMIT 10" })),
        Ok(ChatReply::text("I don't know")),
    ]));

    let envelope = h.orchestrator.run_agent("what is the weather in Paris?").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.message, "SQL not recoverable from the agent's answer: I don't know");
    assert!(envelope.sql_query.is_none());
    assert_eq!(envelope.answer.as_deref(), Some("I don't know"));
    assert_eq!(executions(&h.orchestrator), 0);
}

#[tokio::test]
async fn test_agent_without_sql_reports_answer() {
    let h = harness(ScriptedModel::answering("I don't know"));

    let envelope = h.orchestrator.run_agent("what is the weather?").await;

    assert_eq!(envelope.status, Status::Error);
    assert_eq!(envelope.message, "SQL not recoverable from the agent's answer: I don't know");
    assert_eq!(envelope.trace, Some(Vec::new()));
    assert_eq!(executions(&h.orchestrator), 0);
}

#[tokio::test]
async fn test_metrics_count_outcomes() {
    let h = harness(ScriptedModel::new(vec![
        Ok(ChatReply::text("SELECT COUNT(*) FROM sales_stores")),
        Ok(ChatReply::text("ERROR: The requested information is not available in the database schema.")),
    ]));

    h.orchestrator.translate_and_run("how many stores?").await;
    h.orchestrator.translate_and_run("what is the weather?").await;

    let text = h.orchestrator.metrics().render().unwrap();
    assert!(text.contains(r#"nlsql_translations_total{outcome="sql",strategy="direct"} 1"#));
    assert!(text.contains(r#"nlsql_translations_total{outcome="refused",strategy="direct"} 1"#));
    assert!(text.contains(r#"nlsql_executions_total{outcome="success"} 1"#));
    assert!(text.contains(r#"nlsql_request_duration_seconds_count{operation="translate_and_run"} 2"#));
}

#[tokio::test]
async fn test_from_config_seeds_file_database_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("bikes.duckdb").display().to_string();
    config.database.init_script = Some(SEED_PATH.to_string());
    config.agent.enabled = false;

    let model = Arc::new(ScriptedModel::default());
    {
        let orchestrator = Orchestrator::from_config(&config, model.clone()).unwrap();
        let envelope = orchestrator
            .run_sql("INSERT INTO sales_stores (store_id, store_name) VALUES (3, 'Rowlett Bikes')")
            .await;
        assert_eq!(envelope.status, Status::Success);
    }

    // Tables exist now, so the seed script is skipped and the insert survives
    let orchestrator = Orchestrator::from_config(&config, model).unwrap();
    let envelope = orchestrator.run_sql("SELECT COUNT(*) AS n FROM sales_stores").await;
    assert_eq!(envelope.data.unwrap().records[0]["n"], json!(3));
    assert_eq!(orchestrator.list_tables().await.unwrap().len(), 9);

    let agent = orchestrator.run_agent("how many stores?").await;
    assert_eq!(agent.message, "SQL agent not initialized");
}

#[tokio::test]
async fn test_from_config_reports_missing_init_script() {
    let mut config = Config::default();
    config.database.init_script = Some("/nonexistent/seed.sql".to_string());

    let err = Orchestrator::from_config(&config, Arc::new(ScriptedModel::default())).err().unwrap();
    assert!(err.to_string().starts_with("Failed to read init script /nonexistent/seed.sql"));
}
