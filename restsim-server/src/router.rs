//! Router construction for the simulator server.

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the full axum router with all routes and middleware.
pub fn build_router(app: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/prompt",
            get(handlers::prompt::get_prompt).post(handlers::prompt::save_prompt),
        )
        .route("/api/simulate", post(handlers::simulate::simulate))
        .route("/api/scenario", post(handlers::scenario::scenario))
        .route("/api/reset", post(handlers::reset::reset))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(app)
}
