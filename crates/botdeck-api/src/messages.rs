use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
};
use chrono::Utc;
use tokio::runtime::Handle;

use botdeck_types::api::SendMessageRequest;

use crate::auth::{AppState, run_blocking};
use crate::delivery;
use crate::error::ApiError;
use crate::ledger::SendMessage;
use crate::middleware::AuthUser;

/// POST /send-message — queue a message on a running bot. The response
/// carries the queued record; delivery happens in the background.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let request = SendMessage {
        bot_id: req.bot_id,
        phone_number: req.phone_number,
        body: req.message,
    };

    let ledger = state.ledger.clone();
    let delay = state.delivery_delay;
    let runtime = Handle::current();

    // Insert and schedule in one blocking unit: it runs to completion even if
    // the client disconnects, so every committed message gets its delivery.
    let message = run_blocking(move || {
        let message = ledger.send_message(user.id, request, Utc::now())?;
        let _guard = runtime.enter();
        delivery::schedule(ledger, message.id, delay);
        Ok(message)
    })
    .await?;

    Ok(Json(message))
}
