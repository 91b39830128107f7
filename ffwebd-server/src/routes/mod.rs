//! Axum router construction.
//!
//! [`build`] assembles the application router: the open health route,
//! the `/api/v1` surface behind optional bearer auth, and the
//! per-request trace middleware wrapping everything.

mod health;
mod v1;

use std::sync::Arc;

use axum::{middleware, Router};

use crate::middleware::trace;
use crate::state::AppState;

/// Build the complete axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .nest("/api/v1", v1::router(state.clone()))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tokio::sync::watch;
    use tower::ServiceExt;

    use ffwebd_core::{FfmpegDriver, Manager};

    use crate::config::Config;
    use crate::state::AppState;

    /// App wired to a real control plane with `cp` as the transcoder
    /// and a zero-width pool, so submitted tasks stay queued.
    fn test_app(auth_enable: bool) -> Router {
        let mut cfg = Config::from_env();
        cfg.auth_enable = auth_enable;
        cfg.max_concurrency = 0;
        cfg.ff_bin = "cp".into();

        let driver = Arc::new(FfmpegDriver::new(cfg.driver_config()).unwrap());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let manager = Manager::start(cfg.manager_config(), driver, shutdown_rx);

        build(Arc::new(AppState {
            config: Arc::new(cfg),
            manager,
        }))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn submit_body() -> Value {
        json!({
            "command": "-i ${INPUT_MEDIA} -vcodec copy",
            "inputMedia": "/fixtures/a.mp4",
            "outputExt": "mp4"
        })
    }

    #[tokio::test]
    async fn health_is_reachable_without_auth() {
        let app = test_app(true);
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn v1_requires_bearer_token_when_auth_is_enabled() {
        let app = test_app(true);

        let (status, body) = send(&app, get("/api/v1/tasks")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authorization header required");

        let (status, _) = send(
            &app,
            Request::builder()
                .uri("/api/v1/tasks")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Scheme match is case-insensitive; default key is 123456.
        let (status, _) = send(
            &app,
            Request::builder()
                .uri("/api/v1/tasks")
                .header(header::AUTHORIZATION, "bearer 123456")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn create_task_rejects_shell_metacharacters() {
        let app = test_app(false);
        let mut body = submit_body();
        body["command"] = json!("-i ${INPUT_MEDIA}; ls");

        let (status, body) = send(&app, post_json("/api/v1/tasks", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("disallowed character"));
    }

    #[tokio::test]
    async fn create_task_requires_the_input_placeholder() {
        let app = test_app(false);
        let mut body = submit_body();
        body["command"] = json!("-i somefile.mp4 -c:v libx264");

        let (status, body) = send(&app, post_json("/api/v1/tasks", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("input placeholder"));
    }

    #[tokio::test]
    async fn create_task_rejects_non_alphanumeric_extension() {
        let app = test_app(false);
        let mut body = submit_body();
        body["outputExt"] = json!("../mp4");

        let (status, _) = send(&app, post_json("/api/v1/tasks", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn accepted_task_can_be_fetched_and_canceled() {
        let app = test_app(false);

        let (status, body) = send(&app, post_json("/api/v1/tasks", submit_body())).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let task_id = body["taskId"].as_str().unwrap().to_owned();
        assert!(!task_id.is_empty());

        let (status, body) = send(&app, get(&format!("/api/v1/tasks/{task_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "queued");
        assert!(body.get("downloadUrl").is_none());

        let (status, _) = send(
            &app,
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/v1/tasks/{task_id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, get(&format!("/api/v1/tasks/{task_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "canceled");
        assert_eq!(body["error"], "Canceled by user while in queue");

        // Cancel is illegal once terminal.
        let (status, _) = send(
            &app,
            Request::builder()
                .method("PATCH")
                .uri(format!("/api/v1/tasks/{task_id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_task_is_404() {
        let app = test_app(false);
        let (status, _) = send(&app, get("/api/v1/tasks/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_artifact_is_404() {
        let app = test_app(false);
        let (status, _) = send(&app, get("/api/v1/files/no_such_artifact.mp4")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sync_call_is_a_stub() {
        let app = test_app(false);
        let (status, body) = send(&app, post_json("/api/v1/call", submit_body())).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        assert!(body["error"].as_str().unwrap().contains("tasks"));
    }
}
