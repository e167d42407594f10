//! Registration, login and logout against the CSV credential store.

use crate::state::SharedState;
use crate::store::StoreError;
use crate::web::session;
use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;

#[derive(Deserialize)]
pub struct CredentialsPayload {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub username: String,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .with_state(state)
}

async fn register(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let ip = addr.ip().to_string();
    if !state.register_limiter.allow(&ip).await {
        tracing::warn!("registration rate limit exceeded for {ip}");
        return Err(error_body(StatusCode::TOO_MANY_REQUESTS, "Too many attempts."));
    }

    let username = payload.username.trim();
    if username.is_empty() || username.len() > 64 {
        return Err(error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Username must be 1-64 characters.",
        ));
    }
    if payload.password.len() < 4 {
        return Err(error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Password must be at least 4 characters.",
        ));
    }

    match state.users.register(username, &payload.password).await {
        Ok(()) => {
            tracing::info!(user = username, "account registered");
            Ok((StatusCode::CREATED, Json(json!({ "registered": username }))))
        }
        Err(StoreError::DuplicateUser) => Err(error_body(
            StatusCode::CONFLICT,
            "That username is already registered.",
        )),
        Err(err) => Err(store_unavailable(err)),
    }
}

async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    let ip = addr.ip().to_string();
    if !state.login_limiter.allow(&ip).await {
        tracing::warn!("login rate limit exceeded for {ip}");
        return Err(error_body(StatusCode::TOO_MANY_REQUESTS, "Too many attempts."));
    }

    let username = payload.username.trim();
    let verified = state
        .users
        .verify_login(username, &payload.password)
        .await
        .map_err(store_unavailable)?;
    if !verified {
        return Err(error_body(StatusCode::UNAUTHORIZED, "Access denied."));
    }

    let token = session::sign_session(username, &state.session_key)
        .map_err(|_| error_body(StatusCode::INTERNAL_SERVER_ERROR, "Session signing failed."))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::SET_COOKIE,
        format!("{}={token}; HttpOnly; SameSite=Lax; Path=/", session::COOKIE_NAME)
            .parse()
            .map_err(|_| error_body(StatusCode::INTERNAL_SERVER_ERROR, "Session signing failed."))?,
    );

    tracing::info!(user = username, "login");
    Ok((
        headers,
        Json(LoginResponse {
            username: username.to_string(),
        }),
    ))
}

async fn logout() -> impl IntoResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::SET_COOKIE,
        format!(
            "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
            session::COOKIE_NAME
        )
        .parse()
        .expect("static cookie header"),
    );
    (headers, Json(json!({ "logged_out": true })))
}

fn error_body(status: StatusCode, message: &str) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({ "error": message })))
}

/// Storage failures surface as a user-visible notice; nothing was written.
fn store_unavailable(err: StoreError) -> (StatusCode, Json<serde_json::Value>) {
    tracing::error!("credential store failure: {err}");
    error_body(
        StatusCode::SERVICE_UNAVAILABLE,
        "Account storage is unavailable, try again later.",
    )
}
