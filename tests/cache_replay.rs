//! Cache behaviour through the full router: MISS capture, HIT replay,
//! and the non-idempotent bypass.

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;

use support::{ScriptedExecutor, body_string, gateway, get, row};

const CONFIG: &str = r#"
endpoints:
  - path: /x
    methods: [GET]
    handler:
      type: sql
      query: SELECT 'hi' AS g
      cache:
        enabled: true
        ttl_seconds: 60
"#;

fn executor() -> Arc<ScriptedExecutor> {
    Arc::new(
        ScriptedExecutor::new()
            .respond("SELECT 'hi' AS g", vec![row(&[("g", "hi")])])
            .respond("SELECT 'hi' AS g", vec![row(&[("g", "changed")])]),
    )
}

#[tokio::test]
async fn second_request_replays_the_cached_response() {
    let executor = executor();
    let app = gateway(CONFIG, executor.clone());

    let first = app.clone().oneshot(get("/x")).await.expect("first");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["X-Cache"], "MISS");
    let first_body = body_string(first).await;
    assert_eq!(first_body, r#"{"g":"hi"}"#);
    assert_eq!(executor.fetch_count(), 1);

    let second = app.oneshot(get("/x")).await.expect("second");
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["X-Cache"], "HIT");
    // Served bytes equal the stored ones even though the database
    // would now answer differently.
    assert_eq!(body_string(second).await, first_body);
    assert_eq!(executor.fetch_count(), 1);
}

#[tokio::test]
async fn cached_responses_keep_their_content_type() {
    let executor = executor();
    let app = gateway(CONFIG, executor);

    let _ = app.clone().oneshot(get("/x")).await.expect("first");
    let second = app.oneshot(get("/x")).await.expect("second");
    assert_eq!(second.headers()["Content-Type"], "application/json");
}

#[tokio::test]
async fn distinct_uris_cache_separately() {
    let config = r#"
endpoints:
  - path: /items/{id}
    methods: [GET]
    handler:
      type: sql
      query: SELECT :id AS id
      cache:
        enabled: true
        ttl_seconds: 60
"#;

    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond("SELECT :id AS id", vec![row(&[("id", "1")])])
            .respond("SELECT :id AS id", vec![row(&[("id", "2")])]),
    );
    let app = gateway(config, executor.clone());

    let first = app.clone().oneshot(get("/items/1")).await.expect("first");
    assert_eq!(body_string(first).await, r#"{"id":"1"}"#);

    let second = app.clone().oneshot(get("/items/2")).await.expect("second");
    assert_eq!(second.headers()["X-Cache"], "MISS");
    assert_eq!(body_string(second).await, r#"{"id":"2"}"#);

    let replay = app.oneshot(get("/items/1")).await.expect("replay");
    assert_eq!(replay.headers()["X-Cache"], "HIT");
    assert_eq!(body_string(replay).await, r#"{"id":"1"}"#);
    assert_eq!(executor.fetch_count(), 2);
}

#[tokio::test]
async fn writes_are_neither_read_nor_stored() {
    let config = r#"
endpoints:
  - path: /x
    handler:
      type: sql
      query: SELECT 'hi' AS g
      cache:
        enabled: true
        ttl_seconds: 60
"#;

    let executor = Arc::new(ScriptedExecutor::new());
    let app = gateway(config, executor.clone());

    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/x")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("X-Cache"));
    }

    assert_eq!(executor.fetch_count(), 2);

    // A later GET still starts from a cold cache.
    let response = app.oneshot(get("/x")).await.expect("get");
    assert_eq!(response.headers()["X-Cache"], "MISS");
}
