//! Error types
//!
//! `StoreError` is what the blob and section stores report. `GalleryError` is
//! what the gallery service hands back to callers; every store failure is
//! folded into it before it leaves the service, so HTTP responses never carry
//! backend details.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failures reported by a blob or section store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the gallery service and mapped onto HTTP responses
#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    Auth(String),

    #[error("Failed to {operation}: {source}")]
    UpstreamStore {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

pub type GalleryResult<T> = Result<T, GalleryError>;

impl GalleryError {
    /// Fold a store failure into the service taxonomy.
    ///
    /// `NotFound` and `Conflict` are domain outcomes and keep their meaning;
    /// everything else is an infrastructure failure of `operation`.
    pub fn from_store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => GalleryError::NotFound(what),
            StoreError::Conflict(_) => GalleryError::AlreadyExists("Section already exists".to_string()),
            source => GalleryError::UpstreamStore { operation, source },
        }
    }

    /// Message that is safe to show to a client
    pub fn public_message(&self) -> String {
        match self {
            GalleryError::UpstreamStore { operation, .. } => format!("Failed to {}", operation),
            other => other.to_string(),
        }
    }
}

impl ResponseError for GalleryError {
    fn status_code(&self) -> StatusCode {
        match self {
            GalleryError::Validation(_) | GalleryError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            GalleryError::NotFound(_) => StatusCode::NOT_FOUND,
            GalleryError::Auth(_) => StatusCode::UNAUTHORIZED,
            GalleryError::UpstreamStore { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let GalleryError::UpstreamStore { operation, source } = self {
            log::error!("Upstream store failure during '{}': {}", operation, source);
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.public_message() }))
    }
}
