//! HTTP surface: `/write`, `/read`, `/healthz`.
//!
//! Router shape (shared `AppState`, `TraceLayer` wrapping every route) is
//! styled on `api::mod::AppState`/`api::router` from the teacher, trimmed
//! down to the three endpoints this spec names — no auth, rate limiting or
//! CORS layers, since none of those are part of the remote-write/remote-read
//! contract.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, on, post, MethodFilter};
use axum::{Json, Router};
use sqlx::MySqlPool;
use tower_http::trace::TraceLayer;

use crate::error::ErrorBody;
use crate::ingest::IngestPipeline;
use crate::meta::MetaDirectory;
use crate::remote;

/// Default deadline imposed on both remote-write and remote-read handlers
/// (spec §5: "Remote-write and remote-read handlers impose a default
/// 1-minute deadline").
const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub meta_dir: Arc<MetaDirectory>,
    pub pipeline: Arc<IngestPipeline>,
}

#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/write", post(write_handler))
        .route("/read", on(MethodFilter::GET | MethodFilter::POST, read_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn write_handler(State(state): State<AppState>, body: axum::body::Bytes) -> impl IntoResponse {
    match tokio::time::timeout(HANDLER_TIMEOUT, handle_write(&state, &body)).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(resp)) => resp,
        Err(_) => error_response(StatusCode::GATEWAY_TIMEOUT, "remote-write deadline exceeded"),
    }
}

async fn handle_write(state: &AppState, body: &[u8]) -> Result<(), axum::response::Response> {
    let series = remote::decode_write_request(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;

    state
        .pipeline
        .store_batch(series)
        .await
        .map_err(IntoResponse::into_response)
}

async fn read_handler(State(state): State<AppState>, body: axum::body::Bytes) -> impl IntoResponse {
    match tokio::time::timeout(HANDLER_TIMEOUT, handle_read(&state, &body)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(resp)) => resp,
        Err(_) => error_response(StatusCode::GATEWAY_TIMEOUT, "remote-read deadline exceeded"),
    }
}

async fn handle_read(state: &AppState, body: &[u8]) -> Result<axum::response::Response, axum::response::Response> {
    let queries = remote::decode_read_request(body)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, &e.to_string()))?;

    let mut results = Vec::with_capacity(queries.len());
    for query in queries {
        let Some(query) = query else {
            // name matcher made this query unanswerable; an empty result
            // (spec §6: "emits a nil result") rather than failing the batch.
            results.push(Vec::new());
            continue;
        };
        let series = crate::query::query(
            &state.pool,
            &state.meta_dir,
            query.start_ms,
            query.end_ms,
            &query.metric_name,
            &query.matchers,
        )
        .await
        .map_err(IntoResponse::into_response)?;
        results.push(series);
    }

    let encoded = remote::encode_read_response(results)
        .map_err(|e| error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    Ok((
        StatusCode::OK,
        [
            ("Content-Type", "application/x-protobuf"),
            ("Content-Encoding", "snappy"),
        ],
        encoded,
    )
        .into_response())
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (status, Json(ErrorBody { error: message.to_owned() })).into_response()
}
