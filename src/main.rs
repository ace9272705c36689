use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use askbox::{abuse, api, auth, broadcast, jobs, state::AppState, types::SubmitPolicy, ws};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "askbox=debug,tower_http=debug,axum=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AskBox...");

    // Initialize authentication config
    let auth_config = Arc::new(auth::AuthConfig::from_env());

    // Initialize anti-abuse config
    let abuse_config = Arc::new(abuse::AbuseConfig::from_env());

    // Initialize the companion job client
    let jobs_config = jobs::JobsConfig::from_env();
    let job_service = match jobs_config.build_service() {
        Ok(Some(service)) => {
            tracing::info!("Companion job service configured");
            Some(Arc::new(service) as Arc<dyn jobs::JobService>)
        }
        Ok(None) => {
            tracing::warn!("JOBS_BASE_URL is empty; batch jobs will not be available");
            None
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize job client: {}. Batch jobs will not be available.",
                e
            );
            None
        }
    };

    let state = Arc::new(AppState::with_jobs(SubmitPolicy::from_env(), job_service));

    // Spawn background task for periodic admin queue stats
    broadcast::spawn_stats_broadcaster(state.clone());

    // Spawn background task for rate-limiter housekeeping
    broadcast::spawn_limiter_cleanup(abuse_config.clone());

    // Protected admin routes (with HTTP Basic Auth)
    let admin_routes = Router::new()
        .route("/admin.html", get(auth::serve_admin_html))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::admin_auth_middleware,
        ));

    // WebSocket route with anti-abuse protection; admin connections also
    // need valid credentials
    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::admin_ws_auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            abuse_config.clone(),
            abuse::ws_abuse_middleware,
        ));

    let api_routes = Router::new()
        .route("/api/questions/approved", get(api::list_approved_questions))
        .route("/api/raffle/{device_id}", get(api::raffle_lookup));

    let app = Router::new()
        .merge(ws_routes)
        .merge(admin_routes)
        .merge(api_routes)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // 8165 is ascii for "QA"
    let addr = SocketAddr::from(([0, 0, 0, 0], 8165));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
