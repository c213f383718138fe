use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use storebase::create_app;

async fn setup() -> Result<(tempfile::TempDir, SqlitePool, Router)> {
    let dir = tempdir().context("failed to create tempdir")?;
    let db_path = dir.path().join("test_cascade.db");
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

async fn count(pool: &SqlitePool, sql: &str, project_id: Uuid) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).bind(project_id).fetch_one(pool).await?)
}

#[tokio::test]
async fn deleting_a_project_cascades_to_all_dependents() -> Result<()> {
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

    let (_, body) = request(&app, "POST", "/projects", Some(&token), Some(json!({ "title": "Doomed Project" }))).await?;
    let project_id = body.pointer("/project/id").and_then(|v| v.as_str()).context("missing id")?.to_string();
    let project_uuid = Uuid::parse_str(&project_id)?;

    // Populate every dependent table.
    let (_, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/stores", project_id),
        Some(&token),
        Some(json!({ "title": "Branch", "description": "short lived" })),
    )
    .await?;
    assert_eq!(body.get("success").and_then(|s| s.as_str()), Some("storeAddedSuccessfully"));

    // Touch store settings so the settings table has a row too.
    let store_id: Uuid = sqlx::query_scalar("SELECT id FROM stores WHERE project_id = ?")
        .bind(project_uuid)
        .fetch_one(&pool)
        .await?;
    let (status, _) = request(
        &app,
        "GET",
        &format!("/projects/{}/stores/{}/settings", project_id, store_id),
        Some(&token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/categories", project_id),
        Some(&token),
        Some(json!({ "title": "Gadgets", "type": "product" })),
    )
    .await?;
    assert_eq!(body.get("success").and_then(|s| s.as_str()), Some("categoryAddedSuccessfully"));

    let (_, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/users", project_id),
        Some(&token),
        Some(json!({ "phoneNumber": "09123456789", "fullName": "Sara", "otpCode": "1234", "otpExpiresIn": 120 })),
    )
    .await?;
    assert_eq!(body.get("success").and_then(|s| s.as_str()), Some("userAddedSuccessfully"));

    assert_eq!(count(&pool, "SELECT COUNT(1) FROM user_projects WHERE project_id = ?", project_uuid).await?, 1);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM stores WHERE project_id = ?", project_uuid).await?, 1);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM categories WHERE project_id = ?", project_uuid).await?, 1);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM project_users WHERE project_id = ?", project_uuid).await?, 1);

    // Delete the project.
    let (status, body) = request(&app, "DELETE", &format!("/projects/{}", project_id), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("success").and_then(|s| s.as_str()), Some("projectDeletedSuccessfully"));

    // Everything it owned is gone.
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM projects WHERE id = ?", project_uuid).await?, 0);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM user_projects WHERE project_id = ?", project_uuid).await?, 0);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM stores WHERE project_id = ?", project_uuid).await?, 0);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM categories WHERE project_id = ?", project_uuid).await?, 0);
    assert_eq!(count(&pool, "SELECT COUNT(1) FROM project_users WHERE project_id = ?", project_uuid).await?, 0);
    let settings: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM store_settings WHERE store_id = ?")
        .bind(store_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(settings, 0);

    // Subsequent reads see a missing project.
    let (status, _) = request(&app, "GET", &format!("/projects/{}", project_id), Some(&token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
