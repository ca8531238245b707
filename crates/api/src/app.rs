//! Router assembly shared by the binary and the integration tests.

use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::from_fn,
    routing::get,
};
use tower_http::trace::TraceLayer;
use tower_sessions::MemoryStore as MemorySessionStore;
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorageBackend;
use crate::middleware::{checkout_rate_limiter, create_session_layer, request_id_middleware};
use crate::routes;
use crate::state::AppState;

/// Build the full application router.
///
/// Sessions are read from `PostgreSQL` when the state has a pool and from an
/// in-memory store otherwise.
pub fn build_router(state: AppState) -> Router {
    let config = state.config().clone();

    let mut checkout = routes::checkout_routes();
    match checkout_rate_limiter(&config.checkout) {
        Some(limiter) => checkout = checkout.layer(limiter),
        None => tracing::warn!("Checkout rate limiting disabled (zero burst or period)"),
    }

    let mut app = Router::new()
        .merge(checkout)
        .merge(routes::routes());
    if config.storage == StorageBackend::Memory {
        app = app.merge(routes::dev_routes());
    }

    let app = match state.pool() {
        Some(pool) => app.layer(create_session_layer(PostgresStore::new(pool.clone()), &config)),
        None => app.layer(create_session_layer(MemorySessionStore::default(), &config)),
    };

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(app)
        .with_state(state)
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                user_id = tracing::field::Empty,
            )
        }))
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Verifies database connectivity when backed by `PostgreSQL`.
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    let Some(pool) = state.pool() else {
        return StatusCode::OK;
    };
    match sqlx::query("SELECT 1").fetch_one(pool).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
