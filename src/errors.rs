use crate::{handlers::xml::message_response, services::storage_service::StorageError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::error;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        message_response(self.status, &self.message)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidName { .. } => AppError::new(StatusCode::BAD_REQUEST, err.to_string()),
            StorageError::BucketAlreadyExists(_) | StorageError::BucketNotEmpty(_) => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            StorageError::BucketNotFound(_) | StorageError::ObjectNotFound { .. } => {
                AppError::not_found(err.to_string())
            }
            StorageError::Io(_) => {
                error!("storage I/O failure: {}", err);
                AppError::internal("Internal Server Error")
            }
            StorageError::Metadata { .. } => {
                error!("{}", err);
                AppError::internal("Failed to update metadata")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::metadata_store::MetadataError;
    use std::{io, path::PathBuf};

    #[test]
    fn storage_errors_map_to_statuses() {
        let cases = [
            (
                StorageError::InvalidName {
                    name: "X".into(),
                    reason: "bad".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                StorageError::BucketAlreadyExists("b".into()),
                StatusCode::CONFLICT,
            ),
            (StorageError::BucketNotEmpty("b".into()), StatusCode::CONFLICT),
            (StorageError::BucketNotFound("b".into()), StatusCode::NOT_FOUND),
            (
                StorageError::ObjectNotFound {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                StorageError::Io(io::Error::other("disk on fire")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                StorageError::Metadata {
                    operation: "creating bucket `b`".into(),
                    source: MetadataError::Io {
                        path: PathBuf::from("buckets.csv"),
                        source: io::Error::other("read-only"),
                    },
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = AppError::from(StorageError::Io(io::Error::other("/secret/path")));
        assert!(!err.message.contains("/secret/path"));
    }
}
