use axum::http::HeaderMap;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// Bearer API-key check for the public REST surface.
///
/// The key is project-scoped and all-or-nothing: a match grants the whole
/// surface for that project, anything else (missing header, unknown
/// project, wrong key) is a 401. Unknown projects are deliberately not
/// distinguished from bad keys here.
pub async fn require_api_key(pool: &SqlitePool, project_id: Uuid, headers: &HeaderMap) -> AppResult<()> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::unauthorized("Unauthorized"))?;

    let api_key: Option<String> = sqlx::query_scalar("SELECT api_key FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;

    match api_key {
        Some(key) if key == presented => Ok(()),
        _ => Err(AppError::unauthorized("Unauthorized")),
    }
}
