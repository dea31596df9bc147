//! Router construction: the JSON API in §6, public routes plus an
//! admin group behind basic auth.

use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::require_admin;
use crate::handlers::{self, admin};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/list_jobs", get(admin::list_jobs))
        .route("/api/admin/list_workers", get(admin::list_workers))
        .route("/api/admin/list_miners", get(admin::list_miners))
        .route("/api/admin/list_friendbots", get(admin::list_friendbots))
        .route_layer(axum_mw::from_fn_with_state(state.clone(), require_admin));

    let public_routes = Router::new()
        .route("/api/submit_job_chain", post(handlers::submit_job_chain))
        .route("/api/request_job", get(handlers::request_job))
        .route("/api/update_job/{key}", get(handlers::update_job))
        .route("/api/update_job/{key}/{subkey}", get(handlers::update_job_sub))
        .route("/api/release_job/{key}", get(handlers::release_job))
        .route("/api/release_job/{key}/{subkey}", get(handlers::release_job_sub))
        .route("/api/cancel_job/{key}", get(handlers::cancel_job))
        .route("/api/reset_job/{key}", get(handlers::reset_job))
        .route("/api/complete_job/{key}", post(handlers::complete_job))
        .route("/api/complete_job/{key}/{subkey}", post(handlers::complete_job_sub))
        .route("/api/fail_job/{key}", post(handlers::fail_job))
        .route("/api/fail_job/{key}/{subkey}", post(handlers::fail_job_sub))
        .route("/api/check_job_statuses/{csv_keys}", get(handlers::check_job_statuses))
        .route("/api/check_network_stats", get(handlers::check_network_stats))
        .route("/download_movable/{id0}", get(handlers::download_movable));

    public_routes.merge(admin_routes).layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use coordinator_engine::Coordinator;
    use coordinator_model::config::{AdminCredentials, ArtifactRoots, Config, MirrorConfig};
    use coordinator_model::validators::ClientTypePolicy;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut client_types = std::collections::BTreeMap::new();
        client_types.insert(
            "friendbot".to_string(),
            ClientTypePolicy {
                min_version: "1.0.0".to_string(),
                allowed: [coordinator_model::job::JobKind::FcLfcs].into_iter().collect(),
            },
        );
        Config {
            artifact_roots: ArtifactRoots { fc_lfcs: dir.join("fc"), mii_lfcs: dir.join("mii"), msed: dir.join("msed") },
            mirror: MirrorConfig { base: None, endpoint: None },
            bind_addr: "127.0.0.1:0".to_string(),
            admin: AdminCredentials { user: "admin".into(), pass: "hunter2".into() },
            client_types,
            job_timeout: chrono::Duration::seconds(300),
            worker_timeout: chrono::Duration::seconds(600),
            sweep_interval: chrono::Duration::seconds(60),
            fail_releases_subjob: true,
        }
    }

    fn test_app(dir: &std::path::Path) -> Router {
        let coordinator = Arc::new(Coordinator::new(test_config(dir)));
        build_router(AppState { coordinator })
    }

    fn with_peer(mut req: Request<Body>) -> Request<Body> {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        req
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn request_job_with_no_work_returns_null_data() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let req = with_peer(
            Request::builder()
                .uri("/api/request_job?name=bot-a&type=friendbot&version=friendbot-1.0.0")
                .body(Body::empty())
                .unwrap(),
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"], Value::Null);
    }

    #[tokio::test]
    async fn submit_then_request_job_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());

        let submit = Request::builder()
            .method("POST")
            .uri("/api/submit_job_chain")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({
                    "jobs": [{"type": "fc-lfcs", "friend_code": "128849018881"}]
                })
                .to_string(),
            ))
            .unwrap();
        let resp = app.clone().oneshot(submit).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"], serde_json::json!(["128849018881"]));

        let req = with_peer(
            Request::builder()
                .uri("/api/request_job?name=bot-a&type=friendbot&version=friendbot-1.0.0")
                .body(Body::empty())
                .unwrap(),
        );
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["type"], "fc-lfcs");
        assert_eq!(body["data"]["friend_code"], "128849018881");
    }

    #[tokio::test]
    async fn duplicate_submission_returns_409() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let payload = || {
            Body::from(
                serde_json::json!({ "jobs": [{"type": "fc-lfcs", "friend_code": "128849018881"}] }).to_string(),
            )
        };
        let first = Request::builder()
            .method("POST")
            .uri("/api/submit_job_chain")
            .header("content-type", "application/json")
            .body(payload())
            .unwrap();
        assert_eq!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::OK);

        let dup = Request::builder()
            .method("POST")
            .uri("/api/submit_job_chain")
            .header("content-type", "application/json")
            .body(payload())
            .unwrap();
        let resp = app.oneshot(dup).await.unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn admin_route_requires_basic_auth() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let req = Request::builder().uri("/api/admin/list_jobs").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_route_accepts_correct_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let creds = BASE64.encode("admin:hunter2");
        let req = Request::builder()
            .uri("/api/admin/list_jobs")
            .header("authorization", format!("Basic {creds}"))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_job_lookup_returns_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path());
        let req = Request::builder().uri("/api/release_job/does-not-exist").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
