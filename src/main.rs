//! Recipe version control service
//!
//! A REST backend that keeps the history of recipe content as commits on
//! branches, with forking, copying between recipes and structural diffs.
//! Commit metadata and recipe snapshots live in two separate SQLite stores.

mod api;
mod auth;
mod config;
mod db;
mod diff;
mod errors;
mod models;
mod services;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use errors::{AppError, ErrorResponse};
use services::VersionControl;

/// Header carrying the per-request correlation id.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub vcs: Arc<VersionControl>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting recipe version control service");
    tracing::info!("Metadata database: {:?}", config.db_path);
    tracing::info!("Snapshot database: {:?}", config.snapshot_db_path);
    tracing::info!("Bind address: {}", config.bind_addr);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (RECIPE_VCS_API_PSK). Authentication is disabled!");
    }

    // Initialize both stores
    let metadata = db::init_database(&config.db_path).await?;
    let snapshots = db::init_snapshot_database(&config.snapshot_db_path).await?;
    let vcs = Arc::new(VersionControl::new(
        metadata,
        snapshots,
        config.commit_retries,
    ));

    // Clear out the leftovers of writes interrupted by a previous shutdown
    let report = vcs.reconcile(config.orphan_grace).await?;
    tracing::info!(
        removed = report.removed_snapshots.len(),
        missing = report.commits_missing_snapshot.len(),
        "Store reconciliation finished"
    );

    let state = AppState {
        vcs,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Recipes
        .route("/recipes/{recipe_id}/init", post(api::init_recipe))
        .route(
            "/recipes/{recipe_id}/branches",
            get(api::list_branches).post(api::create_branch),
        )
        // Branches
        .route("/branches/{branch_id}/commit", post(api::commit_to_branch))
        .route("/branches/{branch_id}/history", get(api::branch_history))
        .route("/branches/{branch_id}/copy", post(api::copy_branch))
        // Commits
        .route("/commits/{commit_id}", get(api::get_commit))
        .route("/commits/{commit_id}/changes", get(api::get_changes))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    let timeout = state.config.request_timeout;
    let router = Router::new().merge(api_routes).merge(health_routes);

    with_middleware(router, timeout).with_state(state)
}

/// Wrap a router in the request id, tracing, panic, timeout and CORS layers.
pub fn with_middleware<S>(router: Router<S>, timeout: Duration) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id
            )
        }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(timeout_envelope))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(cors);

    router.layer(layers)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal()),
    )
        .into_response()
}

/// Give timed-out requests the standard error body.
async fn timeout_envelope(request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        tracing::warn!("Request timed out");
        return AppError::Timeout("Request timed out".to_string()).into_response();
    }
    response
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests;
