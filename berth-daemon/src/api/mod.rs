//! HTTP API for the BERTH daemon.
//!
//! Routes under `/api/v1` map the stack and deployment services onto JSON
//! endpoints; domain errors map onto 404/409/400 and everything else onto an
//! opaque 500.

use axum::routing::{get, post};
use axum::Router;
use berth_core::{DeploymentService, StackService};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod deployments;
pub mod error;
pub mod stacks;

/// Shared handler state.
pub struct AppState {
    pub stacks: Arc<StackService>,
    pub deployments: Arc<DeploymentService>,
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    let v1 = Router::new()
        .route("/stacks", get(stacks::list).post(stacks::create))
        .route("/stacks/:id", get(stacks::get).patch(stacks::update).delete(stacks::delete))
        .route("/stacks/:id/deploy", post(deployments::deploy))
        .route("/stacks/:id/history", get(deployments::history))
        .route("/stacks/:id/rollback", post(deployments::rollback))
        .with_state(state);

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1", v1)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use berth_core::git::{GitConfig, GitService};
    use berth_core::Store;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    fn test_app(tmp: &TempDir) -> Router {
        let store = Store::in_memory().unwrap();
        let git = Arc::new(GitService::new(GitConfig {
            retry_attempts: 0,
            ..GitConfig::default()
        }));
        let stacks =
            Arc::new(StackService::new(&store, git, tmp.path().join("repositories")));
        let deployments = Arc::new(DeploymentService::new(&store, stacks.clone()));
        router(AppState { stacks, deployments })
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_get_and_list_stacks() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/stacks",
                json!({"name": "web", "variables": {"TAG": "v1"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["name"], "web");
        assert_eq!(created["status"], "active");
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/stacks/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/api/v1/stacks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_stack_name_is_conflict() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/stacks", json!({"name": "web"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(json_request("POST", "/api/v1/stacks", json!({"name": "web"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_unknown_stack_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/stacks/{}", uuid::Uuid::now_v7()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rename_is_bad_request() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/stacks", json!({"name": "web"})))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/v1/stacks/{}", id),
                json!({"name": "frontend"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["code"], "NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_deploy_history_rollback_flow() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/stacks", json!({"name": "web"})))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        // first deployment has no rollback target
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/stacks/{}/deploy", id),
                json!({"variables": {"TAG": "v2"}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await;
        assert_eq!(first["status"], "success");
        assert!(first["previous"].is_null());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/stacks/{}/deploy", id),
                json!({}),
            ))
            .await
            .unwrap();
        let second = body_json(response).await;
        assert_eq!(second["previous"], first["id"]);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/stacks/{}/history", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let history = body_json(response).await;
        assert_eq!(history.as_array().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/stacks/{}/rollback", id),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rollback = body_json(response).await;
        assert_eq!(rollback["rolled_back"]["id"], second["id"]);
        assert_eq!(rollback["rolled_back"]["status"], "rolled_back");
        assert_eq!(rollback["restored"]["id"], first["id"]);
        assert_eq!(rollback["restored"]["status"], "success");

        // nothing left to roll back to
        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/stacks/{}/rollback", id),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_stack() {
        let tmp = TempDir::new().unwrap();
        let app = test_app(&tmp);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/stacks", json!({"name": "web"})))
            .await
            .unwrap();
        let id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/stacks/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/stacks/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
