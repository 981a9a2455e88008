use crate::client::ObjectStoreError;
use crate::domain::image_path::PathRejection;
use hyper::StatusCode;
use std::error;
use thiserror::Error;

/// Failure of a single tier. Callers decide whether to move to the next tier.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{path} not found")]
    NotFound { path: String },
    #[error("object store: {0}")]
    Remote(#[from] ObjectStoreError),
    #[error("could not read {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal outcome of a request that did not produce an image.
#[derive(Debug, Error)]
pub enum ErrorResponse {
    #[error("Invalid image path.")]
    InvalidPathError {
        path: String,
        #[source]
        reason: PathRejection,
    },
    #[error("Image not found.")]
    ImageNotFoundError { path: String },
    #[error("Image could not be served.")]
    UnexpectedError {
        path: String,
        #[source]
        source: Box<dyn error::Error + Send + Sync>,
    },
}

impl ErrorResponse {
    pub fn unexpected<E>(path: &str, source: E) -> ErrorResponse
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        ErrorResponse::UnexpectedError {
            path: path.to_string(),
            source: source.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorResponse::InvalidPathError { .. } => StatusCode::BAD_REQUEST,
            ErrorResponse::ImageNotFoundError { .. } => StatusCode::NOT_FOUND,
            ErrorResponse::UnexpectedError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
