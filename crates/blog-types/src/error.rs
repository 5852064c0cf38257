use std::fmt::Display;

use thiserror::Error;

/// Failure taxonomy shared by the store, the service and the GraphQL layer.
///
/// `Clone` so a single batched store result can be handed to every caller
/// waiting on the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlogError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("comments are disabled for post {post_id}")]
    CommentsDisabled { post_id: String },

    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("failed to {op}: {message}")]
    Store { op: &'static str, message: String },

    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

pub type Result<T, E = BlogError> = std::result::Result<T, E>;

impl BlogError {
    pub fn post_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "post",
            id: id.into(),
        }
    }

    pub fn comment_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "comment",
            id: id.into(),
        }
    }

    /// Wrap a backend failure with the operation that hit it.
    pub fn store(op: &'static str, err: impl Display) -> Self {
        Self::Store {
            op,
            message: err.to_string(),
        }
    }

    /// Stable machine-readable code, surfaced to API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::CommentsDisabled { .. } => "COMMENTS_DISABLED",
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::Store { .. } => "STORE_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
        }
    }
}
