//! Lead Engine Server
//!
//! WhatsApp webhook, dashboard API and admin endpoints over the lead desk.

pub mod http;
pub mod metrics;
pub mod state;
pub mod whatsapp;

pub use http::create_router;
pub use metrics::{init_metrics, record_inbound, spawn_event_recorder};
pub use state::AppState;
pub use whatsapp::{WebhookPayload, WhatsAppSender};

use leadflow_core::{Error, UserInputError};
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Webhook verification failed")]
    Verification,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<Error> for ServerError {
    fn from(err: Error) -> Self {
        match err {
            Error::UserInput(UserInputError::LeadNotFound(id)) => {
                ServerError::NotFound(format!("lead {}", id))
            },
            Error::UserInput(err) => ServerError::InvalidRequest(err.to_string()),
            Error::StateConflict { key } => ServerError::Conflict(key),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::NotFound(_) => axum::http::StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Verification => axum::http::StatusCode::FORBIDDEN,
            ServerError::Conflict(_) => axum::http::StatusCode::CONFLICT,
            ServerError::Config(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
