//! Error types shared by the sort service.
//!
//! `SortError` is what the coordinator, the node agents and the HTTP layer speak.
//! Storage backends report `StoreError`, which converts into `SortError::Storage`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::membership::types::NodeId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("bucket '{bucket}' does not exist")]
    BucketNotFound { bucket: String },

    #[error("object '{bucket}/{name}' does not exist")]
    ObjectNotFound { bucket: String, name: String },

    #[error("invalid object name '{name}'")]
    InvalidName { name: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum SortError {
    #[error("invalid sort spec: {message}")]
    InvalidSpec { message: String },

    #[error("sort job '{uuid}' not found")]
    NotFound { uuid: String },

    #[error("meta-sort barrier timed out after {timeout:?} waiting for {missing:?}")]
    NodeTimeout {
        timeout: Duration,
        missing: Vec<NodeId>,
    },

    #[error("failed to write shard '{shard}': {message}")]
    PartialWrite { shard: String, message: String },

    #[error("record transfer failed: {message}")]
    Transfer { message: String },

    #[error("sort job '{uuid}' is still running")]
    StillRunning { uuid: String },

    #[error("no alive storage targets")]
    NoTargets,

    #[error("invalid node state transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("sort job aborted")]
    Aborted,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SortError>;

impl SortError {
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    pub fn not_found(uuid: impl ToString) -> Self {
        Self::NotFound {
            uuid: uuid.to_string(),
        }
    }

    pub fn partial_write(shard: impl Into<String>, message: impl ToString) -> Self {
        Self::PartialWrite {
            shard: shard.into(),
            message: message.to_string(),
        }
    }

    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSpec { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::StillRunning { .. } => StatusCode::CONFLICT,
            Self::NoTargets => StatusCode::SERVICE_UNAVAILABLE,
            Self::NodeTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Storage(StoreError::BucketNotFound { .. })
            | Self::Storage(StoreError::ObjectNotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Storage(StoreError::InvalidName { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body returned with every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for SortError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
