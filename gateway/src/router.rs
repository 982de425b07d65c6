use std::{future::ready, sync::Arc};

use axum::{
    http::{Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use health::HealthRegistry;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::proxy::{analysis_proxy, store_proxy, Upstream};

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub store: Arc<Upstream>,
    pub analysis: Arc<Upstream>,
    pub max_body_bytes: usize,
}

pub fn router(state: AppState, liveness: HealthRegistry, enable_metrics: bool) -> Router {
    // Browsers talk to the gateway directly
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/health_check", get(|| ready(Json(true))));

    let proxy_router = Router::new()
        .route("/files", any(store_proxy))
        .route("/files/", any(store_proxy))
        .route("/files/*path", any(store_proxy))
        .route("/analysis/*path", any(analysis_proxy))
        .with_state(state);

    let router = Router::new()
        .merge(status_router)
        .merge(proxy_router)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    if enable_metrics {
        common_metrics::setup_metrics_routes(router)
    } else {
        router
    }
}
