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
    let db_path = dir.path().join("test_sharing.db");
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

async fn register(app: &Router, name: &str, email: &str) -> Result<(String, String)> {
    let (status, body) = request(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    Ok((
        body.get("token").and_then(|t| t.as_str()).context("missing token")?.to_string(),
        body.pointer("/account/id")
            .and_then(|v| v.as_str())
            .context("missing id")?
            .to_string(),
    ))
}

async fn create_project(app: &Router, token: &str, title: &str) -> Result<String> {
    let (status, body) = request(app, "POST", "/projects", Some(token), Some(json!({ "title": title }))).await?;
    assert_eq!(status, StatusCode::OK, "project create failed: {}", body);
    Ok(body.pointer("/project/id").and_then(|v| v.as_str()).context("missing project id")?.to_string())
}

/// Sorted (user_id, permissions-json) pairs for a project, read straight
/// from the membership table.
async fn membership_rows(pool: &SqlitePool, project_id: &str) -> Result<Vec<(String, String)>> {
    let rows: Vec<(uuid::Uuid, String)> = sqlx::query_as(
        "SELECT user_id, permissions FROM user_projects WHERE project_id = ? ORDER BY user_id",
    )
    .bind(uuid::Uuid::parse_str(project_id)?)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id, perms)| (id.to_string(), perms)).collect())
}

#[tokio::test]
async fn share_is_full_replace_and_idempotent() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let (owner_token, owner_id) = register(&app, "Owner", "owner@example.com").await?;
    let (_, alice_id) = register(&app, "Alice", "alice@example.com").await?;
    let (bob_token, bob_id) = register(&app, "Bob", "bob@example.com").await?;
    let project_id = create_project(&app, &owner_token, "Shared Project").await?;

    // Creator starts with an implicit FULLACCESS row.
    let initial = membership_rows(&pool, &project_id).await?;
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].0, owner_id);

    let payload = json!({ "items": [
        { "userId": owner_id, "permissions": ["FULLACCESS"] },
        { "userId": alice_id, "permissions": ["VIEW", "ADD"] },
        { "userId": bob_id, "permissions": ["VIEW"] },
    ]});

    let (status, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(payload.clone()),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("success").and_then(|s| s.as_str()), Some("projectSharedSuccessfully"));

    let after_first = membership_rows(&pool, &project_id).await?;
    assert_eq!(after_first.len(), 3);

    // Same payload again: same final membership set.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(payload),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let after_second = membership_rows(&pool, &project_id).await?;
    assert_eq!(after_first, after_second, "full replace must be idempotent");

    // Omitting Bob revokes him implicitly.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(json!({ "items": [
            { "userId": owner_id, "permissions": ["FULLACCESS"] },
            { "userId": alice_id, "permissions": ["VIEW", "ADD"] },
        ]})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let after_revoke = membership_rows(&pool, &project_id).await?;
    assert_eq!(after_revoke.len(), 2);
    assert!(after_revoke.iter().all(|(id, _)| id != &bob_id));

    // Bob is now a stranger to the project.
    let (status, _) = request(
        &app,
        "GET",
        &format!("/projects/{}/stores", project_id),
        Some(&bob_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn share_requires_fullaccess_or_admin() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;
    let (owner_token, _) = register(&app, "Owner", "owner@example.com").await?;
    let (viewer_token, viewer_id) = register(&app, "Viewer", "viewer@example.com").await?;
    let (_, mark_id) = register(&app, "Mark", "mark@example.com").await?;
    let project_id = create_project(&app, &owner_token, "Tight Project").await?;

    let (status, _) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(json!({ "items": [{ "userId": viewer_id, "permissions": ["VIEW", "ADD", "EDIT", "DELETE"] }]})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    // Every single permission short of FULLACCESS still cannot share.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&viewer_token),
        Some(json!({ "items": [{ "userId": mark_id, "permissions": ["FULLACCESS"] }]})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("error").and_then(|e| e.as_str()), Some("unauthorized"));

    Ok(())
}

#[tokio::test]
async fn share_payload_validation() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;
    let (owner_token, owner_id) = register(&app, "Owner", "owner@example.com").await?;
    let project_id = create_project(&app, &owner_token, "Validated Project").await?;

    let (status, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(json!({ "items": [] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("error").and_then(|e| e.as_str()), Some("atLeastOneUser"));

    let (status, body) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(json!({ "items": [{ "userId": owner_id, "permissions": [] }] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("error").and_then(|e| e.as_str()), Some("permissionRequired"));

    // An unknown permission name is a 400 from body validation.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(json!({ "items": [{ "userId": owner_id, "permissions": ["OWN_EVERYTHING"] }] })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn api_key_endpoint_is_gated_like_sharing() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;
    let (owner_token, _) = register(&app, "Owner", "owner@example.com").await?;
    let (viewer_token, viewer_id) = register(&app, "Viewer", "viewer@example.com").await?;
    let project_id = create_project(&app, &owner_token, "Keyed Project").await?;

    let (status, body) = request(
        &app,
        "GET",
        &format!("/projects/{}/api-key", project_id),
        Some(&owner_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let key = body.get("apiKey").and_then(|k| k.as_str()).context("missing apiKey")?;
    assert_eq!(key.len(), 16);

    let (status, _) = request(
        &app,
        "POST",
        &format!("/projects/{}/share", project_id),
        Some(&owner_token),
        Some(json!({ "items": [{ "userId": viewer_id, "permissions": ["VIEW"] }]})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = request(
        &app,
        "GET",
        &format!("/projects/{}/api-key", project_id),
        Some(&viewer_token),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}
