use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{bots, coins, messages};

/// All API routes, unprefixed. The server nests this under `/api`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/claim-coins", post(coins::claim_coins))
        .route("/bots", get(bots::list_bots).post(bots::deploy_bot))
        .route("/bots/{id}/status", put(bots::set_status))
        .route("/send-message", post(messages::send_message))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
