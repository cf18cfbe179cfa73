use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::warn;

use botdeck_types::api::UpdateStatusRequest;

use crate::auth::{AppState, run_blocking};
use crate::error::ApiError;
use crate::ledger::DeployBot;
use crate::middleware::AuthUser;

/// GET /bots — the caller's bots.
pub async fn list_bots(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.ledger.clone();
    let bots = run_blocking(move || ledger.list_bots(user.id)).await?;
    Ok(Json(bots))
}

/// POST /bots — multipart form with `name`, `webhookUrl` and the `credsFile`
/// upload. Costs the caller `DEPLOY_COST` coins.
pub async fn deploy_bot(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = payload?;
    let mut form = DeployBot::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed deploy form from {}: {}", user.username, e);
        ApiError::MissingFields
    })? {
        let name = field.name().unwrap_or_default().to_string();
        let read_failed = |e: MultipartError| {
            warn!("Failed to read form field '{}': {}", name, e);
            ApiError::MissingFields
        };

        match name.as_str() {
            "name" => form.name = Some(field.text().await.map_err(read_failed)?),
            "webhookUrl" => form.webhook_url = Some(field.text().await.map_err(read_failed)?),
            "credsFile" => form.credentials = Some(field.bytes().await.map_err(read_failed)?.to_vec()),
            _ => {}
        }
    }

    let ledger = state.ledger.clone();
    let bot = run_blocking(move || ledger.deploy_bot(user.id, form, Utc::now())).await?;

    Ok((StatusCode::CREATED, Json(bot)))
}

/// PUT /bots/{id}/status — start or stop a bot.
pub async fn set_status(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|_| ApiError::InvalidStatus)?;
    let ledger = state.ledger.clone();
    let bot = run_blocking(move || {
        ledger.set_bot_status(user.id, &bot_id, req.status.as_deref(), Utc::now())
    })
    .await?;

    Ok(Json(bot))
}
