use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::require_api_key;
use crate::errors::{AppError, AppResult};
use crate::extract::ValidatedJson;
use crate::models::pagination::{Page, PageQuery};
use crate::models::project_user::{
    DbProjectUser, ProjectUser, ProjectUserCreateRequest, ProjectUserSummary, ProjectUserUpdateRequest,
};
use crate::routes::project_users::phone_taken;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/api/{project_id}/users",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        crate::models::pagination::PageQuery
    ),
    responses(
        (status = 200, description = "Paginated project users"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let page = Page::from_query(&query);

    let users = sqlx::query_as::<_, ProjectUserSummary>(
        "SELECT id, phone_number, full_name, created_at FROM project_users WHERE project_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(project_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM project_users WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(json!({
        "data": users,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "totalPages": page.total_pages(total),
            "totalUsers": total,
        }
    })))
}

#[utoipa::path(
    post,
    path = "/api/{project_id}/users",
    tag = "Public API",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUserCreateRequest,
    responses(
        (status = 201, description = "Project user created", body = ProjectUser),
        (status = 400, description = "Invalid phone number, OTP, or TTL"),
        (status = 409, description = "User with this phone number already exists")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<ProjectUserCreateRequest>,
) -> AppResult<(StatusCode, Json<ProjectUser>)> {
    require_api_key(&state.pool, project_id, &headers).await?;

    payload.validate()?;

    if phone_taken(&state.pool, project_id, &payload.phone_number, None).await? {
        return Err(AppError::conflict("User with this phone number already exists"));
    }

    let now = utc_now();
    let user = ProjectUser {
        id: Uuid::new_v4(),
        project_id,
        phone_number: payload.phone_number.clone(),
        full_name: payload.full_name.clone(),
        otp_code: payload.otp_code.clone(),
        otp_expires_at: payload.otp_expiry(now),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO project_users (id, project_id, phone_number, full_name, otp_code, otp_expires_at, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(user.project_id)
    .bind(&user.phone_number)
    .bind(&user.full_name)
    .bind(&user.otp_code)
    .bind(user.otp_expires_at)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/api/{project_id}/users/{user_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Project user id")
    ),
    responses(
        (status = 200, description = "Project user detail", body = ProjectUser),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> AppResult<Json<ProjectUser>> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let user = fetch_user(&state.pool, project_id, user_id).await?;
    Ok(Json(user.try_into()?))
}

#[utoipa::path(
    put,
    path = "/api/{project_id}/users/{user_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Project user id")
    ),
    request_body = ProjectUserUpdateRequest,
    responses(
        (status = 200, description = "Project user updated", body = ProjectUser),
        (status = 404, description = "User not found"),
        (status = 409, description = "Phone number already in use")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<ProjectUserUpdateRequest>,
) -> AppResult<Json<ProjectUser>> {
    require_api_key(&state.pool, project_id, &headers).await?;

    payload.validate()?;

    let existing = fetch_user(&state.pool, project_id, user_id).await?;

    let phone_number = payload.phone_number.clone().unwrap_or_else(|| existing.phone_number.clone());
    if phone_number != existing.phone_number
        && phone_taken(&state.pool, project_id, &phone_number, Some(user_id)).await?
    {
        return Err(AppError::conflict("User with this phone number already exists"));
    }

    let now = utc_now();
    let full_name = payload.full_name.clone().or_else(|| existing.full_name.clone());
    let otp_code = payload.otp_code.clone().unwrap_or_else(|| existing.otp_code.clone());
    let otp_expires_at = payload
        .otp_expires_in
        .map(|seconds| now + chrono::Duration::seconds(seconds))
        .unwrap_or(existing.otp_expires_at);

    sqlx::query(
        "UPDATE project_users SET phone_number = ?, full_name = ?, otp_code = ?, otp_expires_at = ?, updated_at = ? WHERE id = ? AND project_id = ?",
    )
    .bind(&phone_number)
    .bind(&full_name)
    .bind(&otp_code)
    .bind(otp_expires_at)
    .bind(now)
    .bind(user_id)
    .bind(project_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(ProjectUser {
        id: existing.id,
        project_id: existing.project_id,
        phone_number,
        full_name,
        otp_code,
        otp_expires_at,
        created_at: existing.created_at,
        updated_at: now,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/{project_id}/users/{user_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Project user id")
    ),
    responses(
        (status = 200, description = "User deleted"),
        (status = 404, description = "User not found")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> AppResult<(StatusCode, &'static str)> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let _ = fetch_user(&state.pool, project_id, user_id).await?;

    sqlx::query("DELETE FROM project_users WHERE id = ? AND project_id = ?")
        .bind(user_id)
        .bind(project_id)
        .execute(&state.pool)
        .await?;

    Ok((StatusCode::OK, "User deleted"))
}

async fn fetch_user(pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> AppResult<DbProjectUser> {
    sqlx::query_as::<_, DbProjectUser>(
        "SELECT id, project_id, phone_number, full_name, otp_code, otp_expires_at, created_at, updated_at FROM project_users WHERE id = ? AND project_id = ?",
    )
    .bind(user_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))
}
