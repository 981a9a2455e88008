use reqwest::StatusCode;
use thiserror::Error;

pub mod listing;
pub mod object_store_client;
pub mod signing;

pub use object_store_client::{ObjectStoreClient, ObjectStoreConfig, StoredObject};

/// Object store failures, classified from status codes and transport errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found")]
    NotFound,
    #[error("credentials rejected with status {status}")]
    Unauthorized { status: u16 },
    #[error("request throttled")]
    Throttled,
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed object store response: {0}")]
    Malformed(String),
    #[error("object store is not configured for this operation")]
    NotConfigured,
}

impl ObjectStoreError {
    pub fn from_status(status: StatusCode) -> ObjectStoreError {
        match status {
            StatusCode::NOT_FOUND => ObjectStoreError::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ObjectStoreError::Unauthorized {
                status: status.as_u16(),
            },
            // S3 answers SlowDown with 503
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                ObjectStoreError::Throttled
            }
            other => ObjectStoreError::Unavailable(format!("unexpected status {other}")),
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectStoreError::NotFound => "not_found",
            ObjectStoreError::Unauthorized { .. } => "unauthorized",
            ObjectStoreError::Throttled => "throttled",
            ObjectStoreError::Unavailable(_) => "unavailable",
            ObjectStoreError::Malformed(_) => "malformed",
            ObjectStoreError::NotConfigured => "not_configured",
        }
    }
}

impl From<reqwest::Error> for ObjectStoreError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ObjectStoreError::from_status(status)
        } else if err.is_decode() || err.is_body() {
            ObjectStoreError::Malformed(err.to_string())
        } else {
            ObjectStoreError::Unavailable(err.to_string())
        }
    }
}
