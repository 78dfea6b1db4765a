use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures from a persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt {entity} row: {reason}")]
    Corrupt { entity: &'static str, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn corrupt(entity: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            entity,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced at the HTTP boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Authentication required. Please login.")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{context}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into())
    }

    /// Wraps a store failure with the message the client gets to see.
    pub fn store(context: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| ApiError::Store { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Store { context, source } = &self {
            tracing::error!("❌ {}: {}", context, source);
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
