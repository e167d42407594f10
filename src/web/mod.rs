pub mod assessment;
pub mod auth;
pub mod history;
pub mod monitor;
pub mod session;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

/// Full API surface, one nested router per feature.
pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/assessment", assessment::router(state.clone()))
        .nest("/monitor", monitor::router(state.clone()))
        .nest("/history", history::router(state))
}
