//! Request-level error taxonomy and its HTTP mapping.
//!
//! Scoring failures get their own 502 class because the sentiment service is
//! the most failure-prone dependency and the UI offers a retry for it.
//! Comment-provider and model-meta failures never reach this type; they are
//! logged and the pipeline continues with reduced data.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::sentiment::ScoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing text")]
    MissingText,

    #[error("Missing {0}")]
    MissingCredential(&'static str),

    #[error("Sentiment service unavailable")]
    ScoringUnavailable(#[from] ScoreError),

    #[error("{message}")]
    Internal {
        message: &'static str,
        source: anyhow::Error,
    },
}

impl ApiError {
    /// Wrap an upstream failure under a route-specific generic message.
    pub fn internal(message: &'static str, source: anyhow::Error) -> Self {
        ApiError::Internal { message, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingText | ApiError::MissingCredential(_) => StatusCode::BAD_REQUEST,
            ApiError::ScoringUnavailable(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self {
            ApiError::ScoringUnavailable(cause) => {
                tracing::error!(%cause, "sentiment scoring unavailable");
            }
            ApiError::Internal { message, source } => {
                tracing::error!(cause = ?source, "{message}");
            }
            other => {
                tracing::warn!(error = %other, "rejected request");
            }
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
