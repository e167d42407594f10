use nexus_guardian::middleware::RateLimiter;
use nexus_guardian::model::ModelBundle;
use nexus_guardian::state::{self, SharedState};
use nexus_guardian::store::{HistoryStore, UserStore};
use nexus_guardian::web;
use axum::{routing::get_service, Router};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{cors::CorsLayer, services::ServeDir, services::ServeFile, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".into()));
    let model_dir = PathBuf::from(std::env::var("MODEL_DIR").unwrap_or_else(|_| "model".into()));

    let users = UserStore::open(&data_dir)?;
    let history = HistoryStore::open(&data_dir)?;
    tracing::info!("Stores opened under {}", data_dir.display());

    // The service stays up without model artifacts; the questionnaire
    // endpoint reports itself offline until a trained model is present.
    let model = match ModelBundle::load(&model_dir) {
        Ok(bundle) => {
            tracing::info!("Risk model loaded from {}", model_dir.display());
            Some(Arc::new(bundle))
        }
        Err(err) => {
            tracing::warn!("Risk model unavailable, diagnostics disabled: {err:#}");
            None
        }
    };

    let session_key = match std::env::var("SESSION_KEY") {
        Ok(b64) => general_purpose::STANDARD
            .decode(b64)
            .map_err(|e| anyhow::anyhow!("SESSION_KEY must be base64: {e}"))?,
        Err(_) => {
            tracing::warn!("SESSION_KEY missing, using a random key; sessions reset on restart");
            let mut key = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut key);
            key
        }
    };

    let shared: SharedState = Arc::new(state::AppState {
        users,
        history,
        model,
        session_key,
        wizard_sessions: Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new())),
        monitors: Arc::new(tokio::sync::RwLock::new(std::collections::HashMap::new())),
        login_limiter: RateLimiter::new(5, 60),
        register_limiter: RateLimiter::new(10, 60),
    });

    let scheduler = JobScheduler::new().await?;

    // Hourly cleanup of abandoned questionnaires and idle limiter entries.
    let shared_for_cleanup = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_cleanup.clone();
            Box::pin(async move {
                let evicted = state.evict_stale_wizards(chrono::Duration::hours(1)).await;
                if evicted > 0 {
                    tracing::info!("Cleaned up {} abandoned questionnaire sessions", evicted);
                }
                state.login_limiter.evict_idle().await;
                state.register_limiter.evict_idle().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started: session cleanup hourly");

    let static_handler = ServeDir::new("static").not_found_service(ServeFile::new("static/index.html"));

    let app = Router::new()
        .merge(web::routes(shared.clone()))
        .nest_service("/static", ServeDir::new("static"))
        .fallback_service(get_service(static_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        format!("0.0.0.0:{}", port)
    });
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
