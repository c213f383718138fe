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
    let db_path = dir.path().join("test_api_users.db");
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
    bearer: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value, String)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", bearer));
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
    let raw = String::from_utf8_lossy(&bytes).to_string();
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Ok((status, value, raw))
}

async fn project_with_key(app: &Router, email: &str, title: &str) -> Result<(String, String)> {
    let (status, body, _) = request(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Owner", "email": email, "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let token = body.get("token").and_then(|t| t.as_str()).context("missing token")?.to_string();

    let (status, body, _) = request(app, "POST", "/projects", Some(&token), Some(json!({ "title": title }))).await?;
    assert_eq!(status, StatusCode::OK);
    let project_id = body.pointer("/project/id").and_then(|v| v.as_str()).context("missing id")?.to_string();

    let (status, body, _) = request(app, "GET", &format!("/projects/{}/api-key", project_id), Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    let api_key = body.get("apiKey").and_then(|k| k.as_str()).context("missing apiKey")?.to_string();

    Ok((project_id, api_key))
}

fn valid_user(phone: &str) -> Value {
    json!({ "phoneNumber": phone, "fullName": "Sara Ahmadi", "otpCode": "4821", "otpExpiresIn": 300 })
}

#[tokio::test]
async fn wrong_key_is_401_and_creates_no_row() -> Result<()> {
    let (_dir, pool, app) = setup().await?;
    let (project_id, _key) = project_with_key(&app, "owner@example.com", "Userbase").await?;

    let (status, _, _) = request(
        &app,
        "POST",
        &format!("/api/{}/users", project_id),
        Some("wrong-key"),
        Some(valid_user("09123456789")),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM project_users WHERE project_id = ?")
        .bind(uuid::Uuid::parse_str(&project_id)?)
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);

    Ok(())
}

#[tokio::test]
async fn validation_rules_are_enforced() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;
    let (project_id, key) = project_with_key(&app, "owner@example.com", "Validated Users").await?;
    let uri = format!("/api/{}/users", project_id);

    // 10 digits
    let (status, _, _) = request(&app, "POST", &uri, Some(&key), Some(valid_user("0912345678"))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // wrong prefix
    let (status, _, _) = request(&app, "POST", &uri, Some(&key), Some(valid_user("19123456789"))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // OTP too short
    let (status, _, _) = request(
        &app,
        "POST",
        &uri,
        Some(&key),
        Some(json!({ "phoneNumber": "09123456789", "fullName": null, "otpCode": "123", "otpExpiresIn": 300 })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // TTL out of bounds, both ends
    for ttl in [59, 901] {
        let (status, _, _) = request(
            &app,
            "POST",
            &uri,
            Some(&key),
            Some(json!({ "phoneNumber": "09123456789", "fullName": null, "otpCode": "1234", "otpExpiresIn": ttl })),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "ttl {} must be rejected", ttl);
    }

    Ok(())
}

#[tokio::test]
async fn create_roundtrip_conflict_and_pagination() -> Result<()> {
    let (_dir, _pool, app) = setup().await?;
    let (project_id, key) = project_with_key(&app, "owner@example.com", "Customers").await?;
    let uri = format!("/api/{}/users", project_id);

    let (status, created, _) = request(&app, "POST", &uri, Some(&key), Some(valid_user("09123456789"))).await?;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = created.get("id").and_then(|v| v.as_str()).context("missing user id")?.to_string();
    assert_eq!(created.get("phoneNumber").and_then(|v| v.as_str()), Some("09123456789"));
    assert_eq!(created.get("fullName").and_then(|v| v.as_str()), Some("Sara Ahmadi"));
    assert!(created.get("otpExpiresAt").is_some());

    // Round-trip by id.
    let (status, fetched, _) = request(&app, "GET", &format!("{}/{}", uri, user_id), Some(&key), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched.get("phoneNumber").and_then(|v| v.as_str()), Some("09123456789"));
    assert_eq!(fetched.get("otpCode").and_then(|v| v.as_str()), Some("4821"));

    // Duplicate phone in the same project: 409.
    let (status, _, _) = request(&app, "POST", &uri, Some(&key), Some(valid_user("09123456789"))).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // Another user, then updating them onto the taken phone conflicts too.
    let (status, second, _) = request(&app, "POST", &uri, Some(&key), Some(valid_user("09987654321"))).await?;
    assert_eq!(status, StatusCode::CREATED);
    let second_id = second.get("id").and_then(|v| v.as_str()).context("missing id")?;

    let (status, _, _) = request(
        &app,
        "PUT",
        &format!("{}/{}", uri, second_id),
        Some(&key),
        Some(json!({ "phoneNumber": "09123456789" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // Partial update keeps the other fields.
    let (status, updated, _) = request(
        &app,
        "PUT",
        &format!("{}/{}", uri, second_id),
        Some(&key),
        Some(json!({ "fullName": "Renamed" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated.get("fullName").and_then(|v| v.as_str()), Some("Renamed"));
    assert_eq!(updated.get("phoneNumber").and_then(|v| v.as_str()), Some("09987654321"));

    // Pagination envelope uses the totalUsers key.
    let (status, listed, _) = request(&app, "GET", &format!("{}?limit=1", uri), Some(&key), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.pointer("/pagination/totalUsers").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(listed.pointer("/pagination/totalPages").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(listed.get("data").and_then(|d| d.as_array()).map(|a| a.len()), Some(1));
    // The listing never exposes OTP material.
    assert!(listed.pointer("/data/0/otpCode").is_none());

    // Delete, then 404.
    let (status, _, raw) = request(&app, "DELETE", &format!("{}/{}", uri, second_id), Some(&key), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raw, "User deleted");

    let (status, _, _) = request(&app, "GET", &format!("{}/{}", uri, second_id), Some(&key), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
