use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::error;

use botdeck_types::api::{AuthResponse, LoginRequest, RegisterRequest, UserSummary};

use crate::error::ApiError;
use crate::ledger::Ledger;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub ledger: Arc<Ledger>,
    /// How long a queued message waits before it is marked delivered.
    pub delivery_delay: Duration,
}

/// Run a blocking ledger call off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let ledger = state.ledger.clone();
    let user = run_blocking(move || {
        ledger.register(req.username.as_deref(), req.password.as_deref())
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: user.token.clone(),
            user: UserSummary::from(&user),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|_| ApiError::InvalidLogin)?;
    let ledger = state.ledger.clone();
    let user = run_blocking(move || {
        ledger.login(req.username.as_deref(), req.password.as_deref())
    })
    .await?;

    Ok(Json(AuthResponse {
        token: user.token.clone(),
        user: UserSummary::from(&user),
    }))
}
