use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::auth::{AppState, run_blocking};
use crate::error::ApiError;

/// The caller resolved from the bearer token, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
}

/// Resolve the `Authorization` header to a user. The header carries the raw
/// token; a `Bearer ` prefix is tolerated.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // A header that is present but not text cannot name any token.
    let token = match req.headers().get(header::AUTHORIZATION) {
        Some(value) => {
            let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;
            Some(value.strip_prefix("Bearer ").unwrap_or(value).trim().to_string())
        }
        None => None,
    };

    let ledger = state.ledger.clone();
    let user = run_blocking(move || ledger.authenticate(token.as_deref())).await?;

    req.extensions_mut().insert(AuthUser {
        id: user.id,
        username: user.username,
    });
    Ok(next.run(req).await)
}
