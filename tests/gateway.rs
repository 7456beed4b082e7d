//! End-to-end pipeline behaviour through the full router.

mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use tower::ServiceExt;
use varco::domain::Value;

use support::{ScriptedExecutor, body_json, gateway, get, row};

#[tokio::test]
async fn conditional_step_follows_the_feature_flag() {
    let config = |beta: bool| {
        format!(
            r#"
server:
  features:
    beta: {beta}
endpoints:
  - path: /report
    methods: [GET]
    handler:
      type: sql
      queries:
        - query: SELECT 1 AS n
          as: base
        - query: SELECT 2 AS m
          as: extra
          if: features.beta
"#
        )
    };

    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond("SELECT 1 AS n", vec![row(&[("n", "1")])])
            .respond("SELECT 2 AS m", vec![row(&[("m", "2")])]),
    );
    let app = gateway(&config(true), executor);
    let response = app.oneshot(get("/report")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"base": {"n": "1"}, "extra": {"m": "2"}})
    );

    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond("SELECT 1 AS n", vec![row(&[("n", "1")])])
            .respond("SELECT 2 AS m", vec![row(&[("m", "2")])]),
    );
    let app = gateway(&config(false), executor.clone());
    let response = app.oneshot(get("/report")).await.expect("response");
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"base": {"n": "1"}})
    );
    assert_eq!(executor.fetch_count(), 1);
}

#[tokio::test]
async fn loop_expansion_decorates_each_element() {
    let config = r#"
endpoints:
  - path: /orders
    methods: [GET]
    handler:
      type: sql
      queries:
        - query: SELECT id FROM items
          as: items
        - query: SELECT :it.id AS oid
          as: items[i].order
          for: (i, it) in items
"#;

    let executor = Arc::new(
        ScriptedExecutor::new()
            .respond(
                "SELECT id FROM items",
                vec![row(&[("id", "1")]), row(&[("id", "2")])],
            )
            .respond("SELECT :it.id AS oid", vec![row(&[("oid", "1")])])
            .respond("SELECT :it.id AS oid", vec![row(&[("oid", "2")])]),
    );

    let app = gateway(config, executor);
    let response = app.oneshot(get("/orders")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({
            "items": [
                {"id": "1", "order": {"oid": "1"}},
                {"id": "2", "order": {"oid": "2"}},
            ]
        })
    );
}

#[tokio::test]
async fn body_parameters_override_path_parameters() {
    let config = r#"
endpoints:
  - path: /users/{id}
    methods: [PUT]
    handler:
      type: sql
      query: SELECT :id AS id
"#;

    let executor = Arc::new(
        ScriptedExecutor::new().respond("SELECT :id AS id", vec![row(&[("id", "999")])]),
    );
    let app = gateway(config, executor.clone());

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/users/1")
        .body(Body::from(r#"{"id":"999"}"#))
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].params.get("id"),
        Some(&Value::String("999".to_string()))
    );
}

#[tokio::test]
async fn single_step_result_is_the_root_response() {
    let config = r#"
endpoints:
  - path: /greeting
    methods: [GET]
    handler:
      type: sql
      query: SELECT 'hi' AS g
"#;

    let executor = Arc::new(
        ScriptedExecutor::new().respond(
            "SELECT 'hi' AS g",
            vec![row(&[("g", "hi")]), row(&[("g", "ho")])],
        ),
    );
    let app = gateway(config, executor);
    let response = app.oneshot(get("/greeting")).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["Content-Type"],
        "application/json"
    );
    assert_eq!(
        body_json(response).await,
        serde_json::json!([{"g": "hi"}, {"g": "ho"}])
    );
}

#[tokio::test]
async fn pipeline_failures_return_a_generic_500() {
    let config = r#"
endpoints:
  - path: /broken
    methods: [GET]
    handler:
      type: sql
      queries:
        - query: SELECT 1
          if: "count >"
"#;

    let app = gateway(config, Arc::new(ScriptedExecutor::new()));
    let response = app.oneshot(get("/broken")).await.expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        support::body_string(response).await,
        "Error executing query pipeline\n"
    );
}

#[tokio::test]
async fn static_parameters_reach_the_statement() {
    let config = r#"
endpoints:
  - path: /tenants
    methods: [GET]
    handler:
      type: sql
      query: SELECT :tenant AS t
      parameters:
        tenant: main
"#;

    let executor = Arc::new(ScriptedExecutor::new());
    let app = gateway(config, executor.clone());
    app.oneshot(get("/tenants")).await.expect("response");

    let calls = executor.calls();
    assert_eq!(
        calls[0].params.get("tenant"),
        Some(&Value::String("main".to_string()))
    );
}
