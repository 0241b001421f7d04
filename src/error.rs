//! Error taxonomy.
//!
//! One `thiserror` enum per subsystem rather than a single flat error type,
//! following the per-module convention elsewhere in this crate's ancestry
//! (`auth::error::AuthError`, `voice::error::VoiceError`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Configuration loading failure. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised by the metadata directory and identity resolver.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient SQL connection or execution error in an ingest stage.
    #[error("storage error: {0}")]
    Sql(#[from] sqlx::Error),

    /// A `store_meta` call would push a metric past `MaxLabelCount`.
    #[error("metric {metric_name} would exceed the {max} label limit")]
    LabelLimitExceeded { metric_name: String, max: usize },

    /// A worker pool's task channel was full; the caller should shed load.
    #[error("ingest busy")]
    IngestBusy,
}

/// Errors raised by the query planner.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Propagated from the metadata directory lookup that precedes the SQL
    /// query itself (spec §4.7's pre-check step).
    #[error("metadata lookup failed: {0}")]
    Meta(#[from] StoreError),
}

/// Errors raised while scraping a target. Never propagated to a caller —
/// recorded as the synthetic `up=0` series instead (see `scrape::target`).
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("scrape timed out")]
    Timeout,

    #[error("failed to parse exposition body: {0}")]
    Parse(String),
}

/// JSON error body returned to remote-write/remote-read clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Sql(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::LabelLimitExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IngestBusy => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Sql(_) | Self::Meta(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
