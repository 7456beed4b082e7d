//! Rate limiting through the full router.

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use support::{ScriptedExecutor, gateway, row};

const CONFIG: &str = r#"
endpoints:
  - path: /y
    methods: [GET]
    handler:
      type: sql
      query: SELECT 1 AS ok
      rate_limit:
        enabled: true
        rate: 2
        per: 1m
"#;

fn request_from(client: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri("/y")
        .header("X-Forwarded-For", client)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn third_request_in_the_window_is_rejected() {
    let executor = Arc::new(ScriptedExecutor::new());
    let app = gateway(CONFIG, executor.clone());

    let first = app
        .clone()
        .oneshot(request_from("10.0.0.1"))
        .await
        .expect("first");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["X-RateLimit-Limit"], "2");
    assert_eq!(first.headers()["X-RateLimit-Remaining"], "1");

    let second = app
        .clone()
        .oneshot(request_from("10.0.0.1"))
        .await
        .expect("second");
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["X-RateLimit-Remaining"], "0");

    let third = app
        .clone()
        .oneshot(request_from("10.0.0.1"))
        .await
        .expect("third");
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.headers()["Retry-After"], "1");

    // The rejected request never reached the handler.
    assert_eq!(executor.fetch_count(), 2);
}

#[tokio::test]
async fn budgets_are_keyed_by_client_address() {
    let executor = Arc::new(ScriptedExecutor::new());
    let app = gateway(CONFIG, executor.clone());

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request_from("10.0.0.1"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let other = app
        .clone()
        .oneshot(request_from("10.0.0.2"))
        .await
        .expect("other client");
    assert_eq!(other.status(), StatusCode::OK);
    assert_eq!(other.headers()["X-RateLimit-Remaining"], "1");

    let saturated = app
        .oneshot(request_from("10.0.0.1"))
        .await
        .expect("saturated client");
    assert_eq!(saturated.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn rate_limited_endpoints_still_serve_pipeline_results() {
    let executor = Arc::new(
        ScriptedExecutor::new().respond("SELECT 1 AS ok", vec![row(&[("ok", "1")])]),
    );
    let app = gateway(CONFIG, executor);

    let response = app
        .oneshot(request_from("10.0.0.9"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        support::body_json(response).await,
        serde_json::json!({"ok": "1"})
    );
}
