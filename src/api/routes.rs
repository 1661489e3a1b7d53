//! Router assembly

use axum::{
    error_handling::HandleErrorLayer,
    routing::{get, post},
    BoxError, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::warn;

use crate::api::handlers;
use crate::config::StorageProvider;
use crate::error::{AppError, Result};
use crate::middleware::{AuthLayer, RateLimitLayer, SessionResolver};
use crate::AppState;

/// Build the application router.
///
/// `/generate`, `/like` and `/me` require a session; `/generate` is also rate
/// limited per user. Listing, download and health are public.
pub fn create_router(state: Arc<AppState>) -> Result<Router> {
    let settings = state.settings.clone();
    let resolver = SessionResolver::from_config(&settings.auth)?;

    let mut generate_routes = Router::new().route("/generate", post(handlers::generate));
    if settings.rate_limit.enabled {
        generate_routes = generate_routes.route_layer(RateLimitLayer::per_minute(
            settings.rate_limit.generations_per_minute,
            settings.rate_limit.burst_size,
        ));
    }

    let protected = Router::new()
        .route("/like", post(handlers::like))
        .route("/me", get(handlers::me))
        .merge(generate_routes)
        .route_layer(AuthLayer::new(resolver));

    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/items", get(handlers::list_items))
        .route("/items/:id/download", get(handlers::download));

    let mut app = public.merge(protected).with_state(state);

    if settings.storage.provider == StorageProvider::Local {
        app = app.nest_service("/images", ServeDir::new(&settings.storage.base_path));
    }

    let timeout = Duration::from_secs(settings.server.request_timeout_secs);
    app = app
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                    handle_middleware_error(err, timeout)
                }))
                .layer(TimeoutLayer::new(timeout)),
        )
        .layer(TraceLayer::new_for_http());

    if settings.server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    Ok(app)
}

/// Render errors raised by tower middleware in the usual error body
fn handle_middleware_error(err: BoxError, timeout: Duration) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        warn!(timeout_secs = timeout.as_secs(), "Request timed out");
        AppError::Timeout(format!("Request did not finish within {}s", timeout.as_secs()))
    } else {
        AppError::Internal(format!("Unhandled middleware error: {}", err))
    }
}
