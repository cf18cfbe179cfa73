use axum::{
    Json,
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use botdeck_types::api::ErrorResponse;

/// Every failure a request can end in. Each variant is terminal for its
/// request and is rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Missing required fields")]
    MissingFields,

    #[error("Insufficient coins")]
    InsufficientCoins,

    #[error("Invalid credentials file")]
    InvalidCredentials,

    #[error("You can claim again in {hours_remaining} hours")]
    ClaimTooSoon { hours_remaining: i64 },

    #[error("Invalid status")]
    InvalidStatus,

    #[error("Bot not found")]
    NotFound,

    #[error("Bot is not running")]
    BotNotRunning,

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidLogin,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidLogin => StatusCode::UNAUTHORIZED,
            Self::InvalidToken => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::DuplicateUsername => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingFields
            | Self::InsufficientCoins
            | Self::InvalidCredentials
            | Self::ClaimTooSoon { .. }
            | Self::InvalidStatus
            | Self::BotNotRunning => StatusCode::BAD_REQUEST,
        }
    }
}

/// A body that cannot be read as the expected JSON is missing its fields.
/// Handlers with a more specific answer map the rejection themselves.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected JSON body: {}", rejection.body_text());
        Self::MissingFields
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        debug!("Rejected multipart body: {}", rejection.body_text());
        Self::MissingFields
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
