//! Error types for the council engine

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::models::SessionPhase;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },

    #[error("Duplicate vote: agent {agent_id} already voted in round {round}")]
    DuplicateVote { agent_id: String, round: u32 },

    #[error("Cannot {operation} while session is in {phase}")]
    WrongPhase {
        operation: &'static str,
        phase: SessionPhase,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("Notify error: {0}")]
    Notify(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            AppError::InvalidTransition { .. }
            | AppError::DuplicateVote { .. }
            | AppError::WrongPhase { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::Forbidden(e) => (StatusCode::FORBIDDEN, e.clone()),
            AppError::LimitExceeded(e) => (StatusCode::TOO_MANY_REQUESTS, e.clone()),
            AppError::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::Spawn(e) | AppError::Notify(e) => {
                tracing::error!("Upstream error: {}", e);
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            AppError::Config(e) | AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.clone())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
