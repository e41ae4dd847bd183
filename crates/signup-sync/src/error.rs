//! Error types for the sync pipeline
//!
//! These errors describe a single failed call to an external collaborator.
//! The pipeline never lets one of them escape its owning unit (row, image,
//! batch); instead they are folded into an [`Outcome`](crate::outcome::Outcome)
//! or a [`Warning`](crate::outcome::Warning). Only source and configuration
//! failures reach the caller of [`BatchOrchestrator::run`](crate::orchestrator::BatchOrchestrator::run).

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level failure (DNS, TLS, timeout, connection reset)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The remote answered 2xx but the payload was not what we expected
    #[error("Unexpected {service} response: {source}")]
    UnexpectedResponse {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment error: {0}")]
    Env(#[from] signup_common::CommonError),

    /// The source produced a header row but no data rows, or nothing at all
    #[error("No input rows: {0}")]
    NoInput(String),

    /// The limiter's semaphore is never closed while a run holds it
    #[error("Concurrency limiter closed")]
    LimiterClosed,
}

impl SyncError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn api(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            service,
            status,
            body: body.into(),
        }
    }

    pub fn unexpected(service: &'static str, source: serde_json::Error) -> Self {
        Self::UnexpectedResponse { service, source }
    }
}
