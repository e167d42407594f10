//! Session-monitor endpoints plus the once-a-second limit watcher.

use crate::domain::monitor::{format_clock, MonitorSession};
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

pub const SESSION_RESULT: &str = "SESSION";
pub const LIMIT_RESULT: &str = "LIMIT EXCEEDED";

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/start", post(start))
        .route("/status", get(status))
        .route("/stop", post(stop))
        .with_state(state)
}

#[derive(Deserialize)]
struct StartPayload {
    limit_hours: f64,
}

#[derive(Serialize)]
struct MonitorStatus {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    elapsed_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clock: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_seconds: Option<f64>,
    limit_exceeded: bool,
}

#[derive(Serialize)]
struct StopResponse {
    elapsed_seconds: f64,
    clock: String,
    limit_exceeded: bool,
}

async fn start(
    UserSession(username): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<StartPayload>,
) -> Result<impl axum::response::IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if !payload.limit_hours.is_finite() || payload.limit_hours <= 0.0 {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "limit_hours must be positive" })),
        ));
    }

    {
        let mut monitors = state.monitors.write().await;
        if monitors.contains_key(&username) {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({ "error": "A monitor is already running." })),
            ));
        }
        monitors.insert(username.clone(), MonitorSession::new(payload.limit_hours));
    }

    tracing::info!(user = %username, limit_hours = payload.limit_hours, "monitor started");
    tokio::spawn(watch_limit(state.clone(), username));
    Ok((StatusCode::CREATED, Json(json!({ "started": true }))))
}

async fn status(
    UserSession(username): UserSession,
    State(state): State<SharedState>,
) -> Json<MonitorStatus> {
    let monitors = state.monitors.read().await;
    match monitors.get(&username) {
        Some(session) => {
            let now = Utc::now();
            Json(MonitorStatus {
                running: true,
                elapsed_seconds: Some(session.elapsed_seconds_at(now)),
                clock: Some(format_clock(session.elapsed_at(now))),
                limit_seconds: Some(session.limit_seconds),
                limit_exceeded: session.limit_hit,
            })
        }
        None => Json(MonitorStatus {
            running: false,
            elapsed_seconds: None,
            clock: None,
            limit_seconds: None,
            limit_exceeded: false,
        }),
    }
}

async fn stop(
    UserSession(username): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<StopResponse>, (StatusCode, Json<serde_json::Value>)> {
    let session = {
        let mut monitors = state.monitors.write().await;
        monitors.remove(&username)
    };
    let Some(session) = session else {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No monitor is running." })),
        ));
    };

    let now = Utc::now();
    let clock = format_clock(session.elapsed_at(now));

    // The watcher already logged the terminal row for an exceeded session.
    if !session.limit_hit {
        state
            .history
            .append(&username, SESSION_RESULT, &clock)
            .await
            .map_err(|err| {
                tracing::error!("history store failure: {err}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Result storage is unavailable." })),
                )
            })?;
    }

    tracing::info!(user = %username, elapsed = %clock, "monitor stopped");
    Ok(Json(StopResponse {
        elapsed_seconds: session.elapsed_seconds_at(now),
        clock,
        limit_exceeded: session.limit_hit,
    }))
}

/// Detached per-user task ticking once a second; latches the limit flag and
/// writes the terminal history row exactly once, then exits.
async fn watch_limit(state: SharedState, username: String) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tick.tick().await;

        let clock = {
            let mut monitors = state.monitors.write().await;
            let Some(session) = monitors.get_mut(&username) else {
                return; // stopped
            };
            if session.limit_hit {
                return;
            }
            let now = Utc::now();
            if !session.over_limit_at(now) {
                continue;
            }
            session.limit_hit = true;
            format_clock(session.elapsed_at(now))
        };

        tracing::warn!(user = %username, elapsed = %clock, "session time limit reached, take a break");
        if let Err(err) = state.history.append(&username, LIMIT_RESULT, &clock).await {
            tracing::error!("history store failure while logging limit: {err}");
        }
        return;
    }
}
