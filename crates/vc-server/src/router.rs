//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/convert", post(routes::convert::convert))
        .route("/progress/{id}", get(routes::progress::progress))
        .route("/download/{id}", get(routes::download::download))
        .route("/health", get(routes::health::health));

    Router::new()
        .route("/health", get(routes::health::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(ctx.config.server.max_upload_bytes))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use vc_av::ToolRegistry;
    use vc_core::config::{Config, StorageConfig};

    use super::*;
    use crate::middleware::request_id::X_REQUEST_ID;

    fn app() -> (tempfile::TempDir, Router) {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            storage: StorageConfig {
                upload_dir: root.path().join("uploads"),
                output_dir: root.path().join("outputs"),
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = AppContext::new(config, ToolRegistry::with_paths([])).unwrap();
        (root, build_router(ctx))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_on_both_paths() {
        let (_root, app) = app();
        for path in ["/health", "/api/health"] {
            let response = app
                .clone()
                .oneshot(Request::get(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["status"], "healthy");
            assert_eq!(json["presets"].as_array().unwrap().len(), 4);
            assert_eq!(json["encoders"][0]["available"], false);
        }
    }

    #[tokio::test]
    async fn unknown_progress_is_not_an_error() {
        let (_root, app) = app();
        for id in ["not-a-uuid", "7d0e7e3c-1dfe-445f-b6bc-6a2ed984878b"] {
            let response = app
                .clone()
                .oneshot(
                    Request::get(format!("/api/progress/{id}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["status"], "unknown");
            assert_eq!(json["conversion_id"], id);
            assert_eq!(json["progress"], 0.0);
        }
    }

    #[tokio::test]
    async fn unknown_download_is_404_with_request_id() {
        let (_root, app) = app();
        let response = app
            .oneshot(
                Request::get("/api/download/nope")
                    .header(&X_REQUEST_ID, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[&X_REQUEST_ID], "req-42");
        let json = body_json(response).await;
        assert_eq!(json["code"], "not_found");
        assert_eq!(json["request_id"], "req-42");
    }
}
