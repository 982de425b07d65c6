use std::{future::ready, sync::Arc};

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use health::HealthRegistry;
use tower_http::trace::TraceLayer;

use crate::{
    api::{get_file, upload_file},
    service::FileService,
};

#[derive(Clone)]
pub struct AppState {
    pub files: Arc<FileService>,
}

pub fn router(
    files: Arc<FileService>,
    liveness: HealthRegistry,
    max_upload_bytes: usize,
    enable_metrics: bool,
) -> Router {
    let state = AppState { files };

    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/health_check", get(|| ready(Json(true))));

    let files_router = Router::new()
        .route("/files", post(upload_file))
        .route("/files/", post(upload_file))
        .route("/files/:file_id", get(get_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state);

    let router = Router::new()
        .merge(status_router)
        .merge(files_router)
        .layer(TraceLayer::new_for_http());

    if enable_metrics {
        common_metrics::setup_metrics_routes(router)
    } else {
        router
    }
}
