//! Application error
//!
//! Every failure the loyalty and reconciliation flows can produce, tagged with an
//! explicit [`ErrorKind`] so callers branch on the kind instead of the variant.

use axum::{http::StatusCode, Json};
use sea_orm::DbErr;
use thiserror::Error;

use crate::models::common::ErrorResponse;
use crate::services::chain_provider::ChainError;

/// Coarse classification used for status mapping and retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Loyalty code not found")]
    RuleNotFound { owner_id: i32, code: String },

    #[error("Loyalty code already claimed")]
    AlreadyClaimed { code: String },

    #[error("Invalid loyalty type: {0}")]
    InvalidRuleType(String),

    #[error("Check-in already made today. Try again later.")]
    AlreadyCheckedInToday,

    #[error("Streak not found for this user and owner")]
    StreakNotFound,

    #[error("{entity} not found")]
    NotFound {
        entity: &'static str,
        context: &'static str,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error in '{context}': {source}")]
    Database {
        context: &'static str,
        #[source]
        source: DbErr,
    },

    #[error("Chain error in '{context}': {source}")]
    Chain {
        context: &'static str,
        #[source]
        source: ChainError,
    },

    #[error("Metadata error in '{context}': {message}")]
    Metadata {
        context: &'static str,
        message: String,
    },
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RuleNotFound { .. } | Self::StreakNotFound | Self::NotFound { .. } => {
                ErrorKind::NotFound
            }
            Self::AlreadyClaimed { .. } | Self::AlreadyCheckedInToday => ErrorKind::Conflict,
            Self::InvalidRuleType(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Database { .. } | Self::Chain { .. } | Self::Metadata { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AlreadyCheckedInToday => StatusCode::FORBIDDEN,
            _ => match self.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict | ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Operation name attached to infrastructure and lookup failures
    pub fn context(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { context, .. }
            | Self::Database { context, .. }
            | Self::Chain { context, .. }
            | Self::Metadata { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn not_found(entity: &'static str, context: &'static str) -> Self {
        Self::NotFound { entity, context }
    }
}

/// Tag a `DbErr` with the failing operation, for use with `map_err`
pub fn db_err(context: &'static str) -> impl FnOnce(DbErr) -> AppError {
    move |source| AppError::Database { context, source }
}

/// Tag a `ChainError` with the failing operation, for use with `map_err`
pub fn chain_err(context: &'static str) -> impl FnOnce(ChainError) -> AppError {
    move |source| AppError::Chain { context, source }
}

impl From<AppError> for (StatusCode, Json<ErrorResponse>) {
    fn from(err: AppError) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(context = ?err.context(), error = %err, "Request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
    }
}
