//! Standalone regression tests.
//!
//! Drives the full router with an in-memory store and cluster: admin
//! seeding, the pod lifecycle over HTTP, and the response envelope.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use gamebox_api::{ApiState, build_router};
use gamebox_cluster::{InMemoryGateway, ObjectKind, Operation};
use gamebox_orchestrator::{Orchestrator, Stores};
use gamebox_state::StateStore;

const ADMIN: &str = "admin-secret";

fn test_router() -> (Router, Arc<InMemoryGateway>) {
    let store = StateStore::open_in_memory().unwrap();
    let gateway = Arc::new(InMemoryGateway::new());
    let orchestrator = Orchestrator::new(Stores::from_state(store), gateway.clone());
    let state = ApiState::new(Arc::new(orchestrator), Some(ADMIN.to_string()));
    (build_router(state), gateway)
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn admin(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {ADMIN}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn pod(method: &str, uid: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(format!("/api/{uid}?token={token}"))
        .body(Body::empty())
        .unwrap()
}

/// Create account `tok-1` and an nginx template; returns (domain, uid).
async fn seed(router: &Router) -> (String, String) {
    let (status, account) = send(router, admin("POST", "/admin/accounts", Some(json!({"token": "tok-1"})))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["error"], 0);
    let domain = account["data"]["domain"].as_str().unwrap().to_string();

    let draft = json!({
        "name": "nginx:1.27",
        "namespace": "ns1",
        "domain": "example.com",
        "port": 8080,
    });
    let (status, template) = send(router, admin("POST", "/admin/templates", Some(draft))).await;
    assert_eq!(status, StatusCode::OK);
    let uid = template["data"]["uid"].as_str().unwrap().to_string();

    (domain, uid)
}

#[tokio::test]
async fn standalone_healthz() {
    let (router, _) = test_router();
    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"error": 0, "data": "ok"}));
}

#[tokio::test]
async fn standalone_pod_lifecycle() {
    let (router, gateway) = test_router();
    let (domain, uid) = seed(&router).await;

    let (status, body) = send(&router, pod("POST", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], 0);
    assert_eq!(body["data"]["name"], format!("gamebox-ns1-{domain}"));
    assert_eq!(body["data"]["address"], format!("{domain}.example.com"));
    let created_at = body["data"]["created_at"].as_u64().unwrap();
    assert_eq!(body["data"]["expires_at"].as_u64().unwrap(), created_at + 3600);
    assert_eq!(gateway.len().await, 3);

    let (status, body) = send(&router, pod("GET", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["address"], format!("{domain}.example.com"));

    let (status, body) = send(&router, pod("POST", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"error": 40300, "msg": "Pod has been created"}));

    let (status, body) = send(&router, pod("DELETE", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cluster_failures"], json!([]));
    assert!(gateway.is_empty().await);

    let (status, body) = send(&router, pod("GET", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], 40400);

    let (status, _) = send(&router, pod("DELETE", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn standalone_resolvers_reject_unknown_callers() {
    let (router, _) = test_router();
    let (_, uid) = seed(&router).await;

    let (status, body) = send(&router, pod("GET", &uid, "nobody")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": 40400, "msg": "token is invalid"}));

    let (status, body) = send(&router, pod("GET", "no-such-uid", "tok-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": 40400, "msg": "environment not found"}));
}

#[tokio::test]
async fn standalone_cluster_failure_is_internal_error() {
    let (router, gateway) = test_router();
    let (_, uid) = seed(&router).await;
    gateway.fail_on(Operation::Create, ObjectKind::Service).await;

    let (status, body) = send(&router, pod("POST", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], 50000);

    // The workload is left behind and nothing was recorded.
    assert_eq!(gateway.len().await, 1);
    let (status, _) = send(&router, pod("GET", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn standalone_admin_requires_bearer_token() {
    let (router, _) = test_router();

    let req = Request::builder().uri("/admin/accounts").body(Body::empty()).unwrap();
    let (status, body) = send(&router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], 40100);

    let req = Request::builder()
        .uri("/admin/accounts")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn standalone_admin_disabled_without_token() {
    let store = StateStore::open_in_memory().unwrap();
    let orchestrator = Orchestrator::new(Stores::from_state(store), Arc::new(InMemoryGateway::new()));
    let router = build_router(ApiState::new(Arc::new(orchestrator), None));

    let (status, _) = send(&router, admin("GET", "/admin/accounts", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn standalone_admin_accounts() {
    let (router, _) = test_router();

    let (status, body) = send(
        &router,
        admin("POST", "/admin/accounts/batch", Some(json!({"tokens": ["a", "b", "c"]}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    // A batch with one taken token creates nothing.
    let (status, body) = send(
        &router,
        admin("POST", "/admin/accounts/batch", Some(json!({"tokens": ["d", "a"]}))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], 40300);

    let (_, body) = send(&router, admin("GET", "/admin/accounts", None)).await;
    let accounts = body["data"].as_array().unwrap();
    assert_eq!(accounts.len(), 3);
    let id = accounts[0]["id"].as_u64().unwrap();

    let (status, _) = send(&router, admin("DELETE", &format!("/admin/accounts/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&router, admin("DELETE", &format!("/admin/accounts/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&router, admin("DELETE", "/admin/accounts/abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], 40000);
}

#[tokio::test]
async fn standalone_admin_templates() {
    let (router, _) = test_router();
    let (_, uid) = seed(&router).await;

    let (_, body) = send(&router, admin("GET", "/admin/templates", None)).await;
    let templates = body["data"].as_array().unwrap();
    assert_eq!(templates.len(), 1);
    let id = templates[0]["id"].as_u64().unwrap();

    let update = json!({
        "name": "nginx:1.28",
        "namespace": "ns1",
        "domain": "example.org",
        "port": 8081,
        "resources": {"limits_memory": "256Mi"},
    });
    let (status, body) = send(&router, admin("PUT", &format!("/admin/templates/{id}"), Some(update))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["uid"], uid.as_str());
    assert_eq!(body["data"]["domain"], "example.org");

    let (status, body) = send(
        &router,
        admin("POST", "/admin/templates", Some(json!({"name": "broken"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], 40000);

    let (status, _) = send(&router, admin("DELETE", &format!("/admin/templates/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&router, pod("GET", &uid, "tok-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["msg"], "environment not found");
}

#[tokio::test]
async fn standalone_admin_allocations() {
    let (router, gateway) = test_router();
    let (domain, uid) = seed(&router).await;
    send(&router, pod("POST", &uid, "tok-1")).await;

    let (status, body) = send(&router, admin("GET", "/admin/allocations", None)).await;
    assert_eq!(status, StatusCode::OK);
    let views = body["data"].as_array().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["account"]["domain"], domain.as_str());
    assert_eq!(views[0]["template"]["uid"], uid.as_str());
    let id = views[0]["allocation"]["id"].as_u64().unwrap();

    let (status, _) = send(&router, admin("DELETE", &format!("/admin/allocations/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(gateway.is_empty().await);

    let (_, body) = send(&router, admin("GET", "/admin/allocations", None)).await;
    assert_eq!(body["data"], json!([]));
}
