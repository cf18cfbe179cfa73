use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;

use botdeck_types::api::ClaimResponse;

use crate::auth::{AppState, run_blocking};
use crate::error::ApiError;
use crate::middleware::AuthUser;

/// POST /claim-coins — daily reward, once per rolling 24 hours.
pub async fn claim_coins(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.ledger.clone();
    let receipt = run_blocking(move || ledger.claim_coins(user.id, Utc::now())).await?;

    Ok(Json(ClaimResponse {
        coins: receipt.coins,
        last_claim: receipt.last_claim,
    }))
}
