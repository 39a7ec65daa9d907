//! Server integration tests.
//!
//! These tests verify the server starts correctly and handles requests.

mod common;

use anyhow::Result;

#[tokio::test]
async fn test_server_starts_and_responds_to_health() -> Result<()> {
    let server = common::TestServer::start().await?;

    let healthy = server.health().await?;
    assert!(healthy, "Server should be healthy");

    Ok(())
}

#[tokio::test]
async fn test_server_health_reports_engine_state() -> Result<()> {
    let server = common::TestServer::start().await?;

    server
        .post("/api/v1/session")
        .json(&serde_json::json!({"step": 1}))
        .send()
        .await?;

    let resp = server.get("/health").send().await?;
    assert!(resp.status().is_success());

    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["status"], "ok");
    assert!(body.get("version").is_some());
    assert_eq!(body["backend"], "memory");
    assert_eq!(body["live_sessions"], 1);
    assert_eq!(body["rate_limiting"], false);

    Ok(())
}

#[tokio::test]
async fn test_openapi_document_served() -> Result<()> {
    let server = common::TestServer::start().await?;

    let resp = server.get("/api/v1/openapi.json").send().await?;
    assert!(resp.status().is_success());

    let doc: serde_json::Value = resp.json().await?;
    assert!(doc["paths"].get("/api/v1/session").is_some());

    Ok(())
}

#[tokio::test]
async fn test_unknown_route_is_404() -> Result<()> {
    let server = common::TestServer::start().await?;

    let resp = server.get("/api/v1/nope").send().await?;
    assert_eq!(resp.status().as_u16(), 404);

    Ok(())
}

#[tokio::test]
async fn test_query_inspection() -> Result<()> {
    let server = common::TestServer::start().await?;

    let resp = server
        .post("/api/v1/query/inspect")
        .json(&serde_json::json!({"sql": "SELECT * FROM users WHERE id = ?"}))
        .send()
        .await?;
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["success"], true);

    let resp = server
        .post("/api/v1/query/inspect")
        .json(&serde_json::json!({"sql": "name = '' ; DELETE FROM users"}))
        .send()
        .await?;
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["details"], "DANGER_QUERY");

    let resp = server
        .post("/api/v1/query/inspect")
        .json(&serde_json::json!({
            "sql": "name = '' ; DELETE FROM users",
            "disable_protection": true
        }))
        .send()
        .await?;
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["success"], true);

    Ok(())
}

#[tokio::test]
async fn test_query_inspection_rejects_malformed_body() -> Result<()> {
    let server = common::TestServer::start().await?;

    let resp = server
        .post("/api/v1/query/inspect")
        .json(&serde_json::json!({"sql": 42}))
        .send()
        .await?;
    assert!(resp.status().is_client_error());

    Ok(())
}
