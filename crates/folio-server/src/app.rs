use std::sync::Arc;

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::middleware::require_auth, routes, state::AppState};

/// Construct the Axum [`Router`] with all routes and middleware attached.
///
/// Tracking routes are public (the portfolio front end calls them from
/// visitors' browsers). Report routes and the realtime socket sit behind
/// [`require_auth`].
///
/// Middleware is applied in outer-to-inner order (outermost runs first on
/// request, last on response):
///
/// 1. `TraceLayer` — structured request/response logging via `tracing`.
/// 2. `CorsLayer` — any origin unless `FOLIO_CORS_ORIGINS` lists some.
pub fn build_app(state: Arc<AppState>) -> Router {
    let tracking = Router::new()
        .route("/analytics/track-visit", post(routes::track::track_visit))
        .route(
            "/analytics/track-page-view",
            post(routes::track::track_page_view),
        )
        .route(
            "/analytics/track-interaction",
            post(routes::track::track_interaction),
        );

    let dashboard = Router::new()
        .route("/analytics/overview", get(routes::reports::overview))
        .route(
            "/analytics/traffic-growth",
            get(routes::reports::traffic_growth),
        )
        .route(
            "/analytics/device-breakdown",
            get(routes::reports::device_breakdown),
        )
        .route(
            "/analytics/browser-stats",
            get(routes::reports::browser_stats),
        )
        .route(
            "/analytics/operating-systems",
            get(routes::reports::operating_systems),
        )
        .route(
            "/analytics/traffic-sources",
            get(routes::reports::traffic_sources),
        )
        .route("/analytics/top-pages", get(routes::reports::top_pages))
        .route(
            "/analytics/comprehensive",
            get(routes::reports::comprehensive),
        )
        .route(
            "/analytics/live-visitors",
            get(routes::reports::live_visitors),
        )
        .route("/analytics/ws", get(routes::realtime::analytics_ws))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_auth,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(tracking)
        .merge(dashboard)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}
