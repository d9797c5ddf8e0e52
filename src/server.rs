//! HTTP API and HTTP worker.
//!
//! # Endpoints
//!
//! API server (`ragq serve api`):
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/submit_query` | Submit `{ "query_text": ... }`, returns the job |
//! | `GET`  | `/get_query?query_id=...` | Current state of a job |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Worker server (`ragq serve worker`):
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/invoke` | Accept a dispatched job, answer it in the background |
//! | `GET`  | `/health` | Health check |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "query not found: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `generation_failed` (502),
//! `dispatch_failed` (502), `internal` (500). Malformed bodies and missing
//! query parameters are `bad_request` too.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use rag_query_core::generate::GenerationFailed;
use rag_query_core::job::DispatchFailed;
use rag_query_core::models::QueryJob;
use rag_query_core::orchestrator::{JobOrchestrator, Worker};

use crate::config::Config;
use crate::query::build_services;

/// Starts the API server on `[server].bind`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = build_services(config).await?;
    let app = api_router(services.orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(bind = %config.server.bind, "API server listening");
    println!("API server listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Starts the HTTP worker on `[server].worker_bind`.
pub async fn run_worker_server(config: &Config) -> anyhow::Result<()> {
    let services = build_services(config).await?;
    let app = worker_router(services.worker);

    let listener = tokio::net::TcpListener::bind(&config.server.worker_bind).await?;
    tracing::info!(bind = %config.server.worker_bind, "worker listening");
    println!("Worker listening on http://{}", config.server.worker_bind);
    axum::serve(listener, app).await?;
    Ok(())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn api_router(orchestrator: JobOrchestrator) -> Router {
    Router::new()
        .route("/submit_query", post(handle_submit_query))
        .route("/get_query", get(handle_get_query))
        .route("/health", get(handle_health))
        .layer(cors())
        .with_state(orchestrator)
}

pub fn worker_router(worker: Worker) -> Router {
    Router::new()
        .route("/invoke", post(handle_invoke))
        .route("/health", get(handle_health))
        .layer(cors())
        .with_state(worker)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        app_error(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        app_error(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

/// Map pipeline and orchestrator failures onto the error contract.
fn classify_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);

    if err.downcast_ref::<GenerationFailed>().is_some() {
        app_error(StatusCode::BAD_GATEWAY, "generation_failed", message)
    } else if err.downcast_ref::<DispatchFailed>().is_some() {
        app_error(StatusCode::BAD_GATEWAY, "dispatch_failed", message)
    } else if message.contains("must not be empty") {
        app_error(StatusCode::BAD_REQUEST, "bad_request", message)
    } else {
        tracing::error!(error = %message, "request failed");
        app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

// ============ API ============

#[derive(Deserialize)]
struct SubmitQueryRequest {
    query_text: String,
}

async fn handle_submit_query(
    State(orchestrator): State<JobOrchestrator>,
    body: Result<Json<SubmitQueryRequest>, JsonRejection>,
) -> Result<Json<QueryJob>, AppError> {
    let Json(req) = body?;
    let job = orchestrator
        .submit(&req.query_text)
        .await
        .map_err(classify_error)?;
    Ok(Json(job))
}

#[derive(Deserialize)]
struct GetQueryParams {
    query_id: String,
}

async fn handle_get_query(
    State(orchestrator): State<JobOrchestrator>,
    params: Result<Query<GetQueryParams>, QueryRejection>,
) -> Result<Json<QueryJob>, AppError> {
    let Query(params) = params?;
    match orchestrator
        .get(&params.query_id)
        .await
        .map_err(classify_error)?
    {
        Some(job) => Ok(Json(job)),
        None => Err(app_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("query not found: {}", params.query_id),
        )),
    }
}

// ============ Worker ============

#[derive(Serialize)]
struct InvokeAccepted {
    query_id: String,
    accepted: bool,
}

/// Acknowledges the job immediately; the answer is written by a
/// background task.
async fn handle_invoke(
    State(worker): State<Worker>,
    body: Result<Json<QueryJob>, JsonRejection>,
) -> Result<(StatusCode, Json<InvokeAccepted>), AppError> {
    let Json(job) = body?;
    let query_id = job.query_id.clone();
    tokio::spawn(async move {
        match worker.handle(&job).await {
            Ok(outcome) => {
                tracing::debug!(query_id = %job.query_id, ?outcome, "invoke task finished")
            }
            // `handle` has already logged the failure.
            Err(_) => {
                tracing::debug!(query_id = %job.query_id, "invoke task failed, job left pending")
            }
        }
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(InvokeAccepted {
            query_id,
            accepted: true,
        }),
    ))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_generation_failure() {
        let err = anyhow::anyhow!("connection refused").context(GenerationFailed {
            model: "m".to_string(),
        });
        let app = classify_error(err);
        assert_eq!(app.status, StatusCode::BAD_GATEWAY);
        assert_eq!(app.code, "generation_failed");
    }

    #[test]
    fn test_classify_dispatch_failure() {
        let err = anyhow::anyhow!("worker unreachable").context(DispatchFailed {
            target: "http://w/invoke".to_string(),
        });
        let app = classify_error(err);
        assert_eq!(app.status, StatusCode::BAD_GATEWAY);
        assert_eq!(app.code, "dispatch_failed");
    }

    #[test]
    fn test_classify_empty_query_and_other() {
        let app = classify_error(anyhow::anyhow!("query_text must not be empty"));
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.code, "bad_request");

        let app = classify_error(anyhow::anyhow!("disk full"));
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(app.code, "internal");
    }
}
