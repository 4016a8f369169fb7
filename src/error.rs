//! Error types for the card platform
//!
//! Every failure a component can report is an `AppError`. Each variant has a
//! stable `code()` and maps to an HTTP status through `IntoResponse`, so the
//! claim page can tell an already-claimed card from a deactivated one.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing record; the payload names what was looked up
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Slug '{0}' is already taken. Please choose another.")]
    SlugConflict(String),

    #[error("Could not generate a unique slug after {0} attempts")]
    GenerationExhausted(usize),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("This link has been deactivated")]
    LinkInactive,

    #[error("This card has already been claimed")]
    AlreadyClaimed,

    #[error("This link cannot be claimed")]
    NotClaimable,

    /// Duplicate username or email
    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Storage error: {0}")]
    Store(#[from] redb::Error),

    #[error("Corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable kind, returned alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::SlugConflict(_) => "slug_conflict",
            AppError::GenerationExhausted(_) => "generation_exhausted",
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::LinkInactive => "link_inactive",
            AppError::AlreadyClaimed => "already_claimed",
            AppError::NotClaimable => "not_claimable",
            AppError::Conflict(_) => "conflict",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::Store(_) | AppError::Serialization(_) => "store_failure",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::SlugConflict(_) | AppError::AlreadyClaimed | AppError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            AppError::GenerationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::LinkInactive => StatusCode::GONE,
            AppError::NotClaimable => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Store(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidArgument(message.into())
    }
}

// redb reports a distinct error type per operation; all of them are store failures.
macro_rules! store_failure {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for AppError {
                fn from(err: $ty) -> Self {
                    AppError::Store(err.into())
                }
            }
        )*
    };
}

store_failure!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let exposed =
            !status.is_server_error() || matches!(self, AppError::GenerationExhausted(_));
        let message = if exposed {
            self.to_string()
        } else {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        };

        (
            status,
            Json(json!({
                "error": message,
                "code": self.code(),
            })),
        )
            .into_response()
    }
}
