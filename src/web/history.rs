use crate::state::SharedState;
use crate::store::HistoryRecord;
use crate::web::session::UserSession;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::json;

pub fn router(state: SharedState) -> Router {
    Router::new().route("/", get(list)).with_state(state)
}

/// Every stored row for the signed-in user, newest first.
async fn list(
    UserSession(username): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<HistoryRecord>>, (StatusCode, Json<serde_json::Value>)> {
    let rows = state.history.for_user(&username).await.map_err(|err| {
        tracing::error!("history store failure: {err}");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Result storage is unavailable." })),
        )
    })?;
    Ok(Json(rows))
}
