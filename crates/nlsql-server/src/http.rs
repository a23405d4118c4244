//! HTTP API
//!
//! - `POST /api/convert` natural language to SQL only
//! - `POST /api/execute` run SQL
//! - `POST /api/query` translate and run (direct)
//! - `POST /api/agent` translate and run (agent)
//! - `GET /api/tables`, `GET /api/schema`
//! - `GET /health`, `GET /metrics`

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::envelope::ResponseEnvelope;
use crate::error::PipelineError;
use crate::pipeline::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub sql_query: Option<String>,
}

type JsonResponse = (StatusCode, Json<Value>);

fn missing(message: &str) -> JsonResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "message": message})),
    )
}

/// Request body, or an empty request when the body is missing or not JSON
fn body_or_default<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable request body");
            T::default()
        }
    }
}

/// Non-blank text of an optional request field
fn provided(field: Option<String>) -> Option<String> {
    field.filter(|text| !text.trim().is_empty())
}

fn envelope_response(envelope: ResponseEnvelope) -> JsonResponse {
    (StatusCode::OK, Json(envelope.to_json()))
}

fn conversion_status(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::EmptyQuestion => StatusCode::BAD_REQUEST,
        PipelineError::Refused(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::GroundingUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/convert", post(convert))
        .route("/api/execute", post(execute))
        .route("/api/query", post(query))
        .route("/api/agent", post(agent))
        .route("/api/tables", get(tables))
        .route("/api/schema", get(schema))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(addr: &str, orchestrator: Arc<Orchestrator>) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(AppState::new(orchestrator));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("NL→SQL server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> JsonResponse {
    let Some(question) = provided(body_or_default(payload).query) else {
        return missing("No query provided");
    };

    match state.orchestrator.convert(&question).await {
        Ok(sql) => (StatusCode::OK, Json(json!({"status": "success", "sql_query": sql}))),
        Err(e) => (
            conversion_status(&e),
            Json(state.orchestrator.error_envelope(&e).to_json()),
        ),
    }
}

pub async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> JsonResponse {
    let Some(sql) = provided(body_or_default(payload).sql_query) else {
        return missing("No SQL query provided");
    };
    envelope_response(state.orchestrator.run_sql(&sql).await)
}

pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> JsonResponse {
    let Some(question) = provided(body_or_default(payload).query) else {
        return missing("No query provided");
    };
    envelope_response(state.orchestrator.translate_and_run(&question).await)
}

pub async fn agent(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> JsonResponse {
    let Some(question) = provided(body_or_default(payload).query) else {
        return missing("No query provided");
    };
    envelope_response(state.orchestrator.run_agent(&question).await)
}

pub async fn tables(State(state): State<AppState>) -> JsonResponse {
    match state.orchestrator.list_tables().await {
        Ok(tables) => (StatusCode::OK, Json(json!({"status": "success", "tables": tables}))),
        Err(e) => {
            error!("Failed to retrieve tables: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": "Failed to retrieve tables"})),
            )
        }
    }
}

pub async fn schema(State(state): State<AppState>) -> JsonResponse {
    let schema = state.orchestrator.schema();
    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "tables": schema.table_names(),
            "schema": schema.to_prompt_text(),
        })),
    )
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.orchestrator.metrics().render() {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
