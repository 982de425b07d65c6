use std::{future::ready, sync::Arc};

use axum::{http::StatusCode, routing::get, Json, Router};
use health::HealthRegistry;
use tower_http::trace::TraceLayer;

use crate::{
    api::{get_file_stat, get_word_cloud},
    service::AnalysisService,
};

#[derive(Clone)]
pub struct AppState {
    pub analysis: Arc<AnalysisService>,
    pub picture_content_type: &'static str,
}

pub fn router(state: AppState, liveness: HealthRegistry, enable_metrics: bool) -> Router {
    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())))
        .route("/health_check", get(|| ready(Json(true))));

    let analysis_router = Router::new()
        .route("/analysis/:file_id", get(get_file_stat))
        .route("/analysis/wordcloud/*location", get(get_word_cloud))
        .with_state(state);

    let router = Router::new()
        .merge(status_router)
        .merge(analysis_router)
        .layer(TraceLayer::new_for_http());

    if enable_metrics {
        common_metrics::setup_metrics_routes(router)
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, Response},
    };
    use common_blob_store::{KeyScheme, MockBlobStore};
    use http_body_util::BodyExt;
    use mockall::predicate::eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        clients::{text_reader::MockTextProvider, wordcloud::MockWordCloudRenderer},
        error::AnalysisError,
        test_utils::MemoryFileStatRepository,
    };

    fn app(texts: MockTextProvider, pictures: MockBlobStore) -> Router {
        let mut renderer = MockWordCloudRenderer::new();
        renderer
            .expect_render()
            .returning(|_| Ok(b"\x89PNG".to_vec()));

        let analysis = AnalysisService::new(
            Arc::new(texts),
            Arc::new(renderer),
            Arc::new(pictures),
            Arc::new(MemoryFileStatRepository::new()),
        );
        let state = AppState {
            analysis: Arc::new(analysis),
            picture_content_type: "image/png",
        };
        router(state, HealthRegistry::new("liveness"), false)
    }

    fn pictures() -> MockBlobStore {
        MockBlobStore::new(KeyScheme::new("picture", "png"))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response<Body>) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .unwrap()
            .to_bytes()
            .to_vec()
    }

    async fn json_body(response: Response<Body>) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_file_stat_then_word_cloud() {
        let mut texts = MockTextProvider::new();
        texts
            .expect_fetch_text()
            .with(eq(1))
            .times(1)
            .returning(|_| Ok("hi".to_string()));
        let app = app(texts, pictures());

        let response = app.clone().oneshot(get("/analysis/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["file_id"], json!(1));
        assert_eq!(body["word_count"], json!(1));
        assert_eq!(body["char_count"], json!(2));
        assert_eq!(body["is_unique"], json!(true));
        assert!(body.get("normalized_hash").is_none());

        let location = body["wordcloud_location"].as_str().unwrap().to_string();
        assert!(location.starts_with("picture/"));

        // Second request is served from the cache
        let response = app.clone().oneshot(get("/analysis/1")).await.unwrap();
        assert_eq!(json_body(response).await["wordcloud_location"], json!(location));

        let response = app
            .oneshot(get(&format!("/analysis/wordcloud/{location}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(response).await, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_unknown_file_is_404() {
        let mut texts = MockTextProvider::new();
        texts
            .expect_fetch_text()
            .returning(|id| Err(AnalysisError::FileNotFound(id)));
        let app = app(texts, pictures());

        let response = app.oneshot(get("/analysis/5")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await,
            json!({ "detail": "file with id=5 not found" })
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_is_502() {
        let mut texts = MockTextProvider::new();
        texts
            .expect_fetch_text()
            .returning(|_| Err(AnalysisError::Upstream("connection refused".to_string())));
        let app = app(texts, pictures());

        let response = app.oneshot(get("/analysis/5")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_invalid_file_id() {
        let mut texts = MockTextProvider::new();
        texts.expect_fetch_text().never();
        let app = app(texts, pictures());

        let response = app.clone().oneshot(get("/analysis/0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(get("/analysis/abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_word_cloud_is_404() {
        let app = app(MockTextProvider::new(), pictures());

        let response = app
            .oneshot(get("/analysis/wordcloud/picture/nope.png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_nested_word_cloud_location() {
        let store = pictures().with_object("picture/2024/a.png", b"img");
        let app = app(MockTextProvider::new(), store);

        let response = app
            .oneshot(get("/analysis/wordcloud/picture/2024/a.png"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"img");
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = app(MockTextProvider::new(), pictures());

        let response = app.oneshot(get("/health_check")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!(true));
    }
}
