//! The backend query capability consumed by the federation handler.

use std::time::SystemTime;

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::model::Value;
use crate::forward::{ForwardContext, TransportError};

/// Errors returned by a query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend answered with a non-success status and no usable error body.
    #[error("upstream returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend reported a query error in its response envelope.
    #[error("{kind}: {message}")]
    Api { kind: String, message: String },

    #[error("query deadline exceeded")]
    Timeout,
}

/// A successful query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub value: Value,
    pub warnings: Vec<String>,
}

/// Evaluates one expression at one instant.
#[async_trait]
pub trait QueryApi: Send + Sync {
    async fn query(
        &self,
        ctx: &ForwardContext,
        expr: &str,
        eval_time: SystemTime,
    ) -> Result<QueryResult, QueryError>;
}
