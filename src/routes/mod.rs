pub mod api;
pub mod health;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{AppState, config::GovernorConfig};

/// Build the sidecar router.
pub fn build_app(config: &GovernorConfig, state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    if config.observability.metrics.enabled {
        app = app.route("/metrics", get(health::metrics));
    }

    app.nest("/v1", api::get_api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
