//! Session lifecycle over HTTP.

mod common;

use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};

use common::{TestOptions, TestServer};

#[tokio::test]
async fn test_create_fetch_delete() -> Result<()> {
    let server = TestServer::start().await?;

    let resp = server
        .post("/api/v1/session")
        .json(&json!({"user": 1}))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 201);
    let created: Value = resp.json().await?;
    assert_eq!(created["success"], true);
    assert_eq!(
        created["identity_hash"],
        servet_session::identity_hash("127.0.0.1").as_str()
    );

    let resp = server.get("/api/v1/session").send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let fetched: Value = resp.json().await?;
    assert_eq!(fetched["data"], json!({"user": 1}));

    let resp = server.delete("/api/v1/session").send().await?;
    assert_eq!(resp.status().as_u16(), 200);

    let resp = server.get("/api/v1/session").send().await?;
    assert_eq!(resp.status().as_u16(), 404);
    let missing: Value = resp.json().await?;
    assert_eq!(missing["error"], servet_session::SESSION_NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_only_one_conflict() -> Result<()> {
    let server = TestServer::start().await?;

    let first = server.post("/api/v1/session").json(&json!({"u": 1})).send().await?;
    assert_eq!(first.status().as_u16(), 201);

    let second = server.post("/api/v1/session").json(&json!({"u": 2})).send().await?;
    assert_eq!(second.status().as_u16(), 409);
    let body: Value = second.json().await?;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], servet_session::DUPLICATE_SESSION);

    let fetched: Value = server.get("/api/v1/session").send().await?.json().await?;
    assert_eq!(fetched["data"], json!({"u": 1}));

    Ok(())
}

#[tokio::test]
async fn test_delete_is_idempotent() -> Result<()> {
    let server = TestServer::start().await?;

    for _ in 0..2 {
        let resp = server.delete("/api/v1/session").send().await?;
        assert_eq!(resp.status().as_u16(), 200);
        let body: Value = resp.json().await?;
        assert_eq!(body["success"], true);
    }

    Ok(())
}

#[tokio::test]
async fn test_session_expires_over_sqlite() -> Result<()> {
    let server = TestServer::start_with(TestOptions {
        ttl: 1,
        sqlite: true,
        ..Default::default()
    })
    .await?;

    let resp = server.post("/api/v1/session").json(&json!("short")).send().await?;
    assert_eq!(resp.status().as_u16(), 201);

    tokio::time::sleep(Duration::from_millis(1300)).await;

    let resp = server.get("/api/v1/session").send().await?;
    assert_eq!(resp.status().as_u16(), 404);

    // The slot is free again under only_one.
    let resp = server.post("/api/v1/session").json(&json!("again")).send().await?;
    assert_eq!(resp.status().as_u16(), 201);

    Ok(())
}
