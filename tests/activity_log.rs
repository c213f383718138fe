use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use storebase::create_app;

async fn setup() -> Result<(tempfile::TempDir, SqlitePool, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_activity.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await?;
    Ok((dir, pool, app))
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, value))
}

/// The listener drains the bus asynchronously; poll until the expected
/// number of rows lands or the deadline passes.
async fn wait_for_rows(pool: &SqlitePool, expected: i64) -> Result<()> {
    for _ in 0..50 {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM activity_log")
            .fetch_one(pool)
            .await?;
        if count >= expected {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("activity log never reached {} rows", expected)
}

#[tokio::test]
async fn mutations_are_audited_with_a_hash_chain() -> Result<()> {
    let (_dir, pool, app) = setup().await?;

    let (status, body) = request(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Owner", "email": "owner@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let token = body.get("token").and_then(|t| t.as_str()).context("missing token")?.to_string();

    let (_, body) = request(&app, "POST", "/projects", Some(&token), Some(json!({ "title": "Audited Project" }))).await?;
    let project_id = body.pointer("/project/id").and_then(|v| v.as_str()).context("missing id")?.to_string();

    let (_, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/stores", project_id),
        Some(&token),
        Some(json!({ "title": "Audited Store", "description": null })),
    )
    .await?;
    assert_eq!(body.get("success").and_then(|s| s.as_str()), Some("storeAddedSuccessfully"));

    // register + project.created + store.created
    wait_for_rows(&pool, 3).await?;

    let rows: Vec<(String, Option<String>, String)> = sqlx::query_as(
        "SELECT event_name, prev_hash, hash FROM activity_log ORDER BY created_at, occurred_at",
    )
    .fetch_all(&pool)
    .await?;

    let names: Vec<&str> = rows.iter().map(|(name, _, _)| name.as_str()).collect();
    assert!(names.contains(&"project.created"), "names: {:?}", names);
    assert!(names.contains(&"store.created"), "names: {:?}", names);

    // The chain links each row to its predecessor.
    assert!(rows[0].1.is_none(), "first row has no predecessor");
    for pair in rows.windows(2) {
        assert_eq!(
            pair[1].1.as_deref(),
            Some(pair[0].2.as_str()),
            "prev_hash must equal the previous row's hash"
        );
    }

    Ok(())
}
