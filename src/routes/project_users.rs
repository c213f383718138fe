use axum::extract::{Path, State};
use axum::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Identity};
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::models::action::ActionResponse;
use crate::models::project_user::{
    DbProjectUser, ProjectUser, ProjectUserCreateRequest, ProjectUserUpdateRequest,
};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{project_id}/users",
    tag = "ProjectUsers",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "End users of the project", body = [ProjectUser]))
)]
pub async fn list_project_users(
    State(state): State<AppState>,
    identity: Identity,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<ProjectUser>>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let users = sqlx::query_as::<_, DbProjectUser>(
        "SELECT id, project_id, phone_number, full_name, otp_code, otp_expires_at, created_at, updated_at FROM project_users WHERE project_id = ? ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;

    let users: Vec<ProjectUser> = users
        .into_iter()
        .map(ProjectUser::try_from)
        .collect::<Result<_, _>>()?;
    Ok(Json(users))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/users/{user_id}",
    tag = "ProjectUsers",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Project user id")
    ),
    responses(
        (status = 200, description = "Project user detail", body = ProjectUser),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_project_user(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ProjectUser>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let user = fetch_project_user(&state.pool, project_id, user_id).await?;
    Ok(Json(user.try_into()?))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/users",
    tag = "ProjectUsers",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUserCreateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn create_project_user(
    State(state): State<AppState>,
    identity: Identity,
    Path(project_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ProjectUserCreateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_add() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    if let Err(err) = payload.validate() {
        return Ok(Json(ActionResponse::from_error(err)));
    }

    if phone_taken(&state.pool, project_id, &payload.phone_number, None).await? {
        return Ok(Json(ActionResponse::error("error.user_exists")));
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

    let result = sqlx::query(
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
    .await;

    match result {
        Ok(_) => {
            log_activity(&state.event_bus, "created", Some(identity.id), &user);
            Ok(Json(ActionResponse::success("userAddedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}/users/{user_id}",
    tag = "ProjectUsers",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Project user id")
    ),
    request_body = ProjectUserUpdateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn update_project_user(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<ProjectUserUpdateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_edit() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    if let Err(err) = payload.validate() {
        return Ok(Json(ActionResponse::from_error(err)));
    }

    let existing = match fetch_project_user(&state.pool, project_id, user_id).await {
        Ok(user) => user,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    let phone_number = payload.phone_number.clone().unwrap_or_else(|| existing.phone_number.clone());
    if phone_number != existing.phone_number
        && phone_taken(&state.pool, project_id, &phone_number, Some(user_id)).await?
    {
        return Ok(Json(ActionResponse::error("error.user_exists")));
    }

    let now = utc_now();
    let full_name = payload.full_name.clone().or_else(|| existing.full_name.clone());
    let otp_code = payload.otp_code.clone().unwrap_or_else(|| existing.otp_code.clone());
    let otp_expires_at = payload
        .otp_expires_in
        .map(|seconds| now + chrono::Duration::seconds(seconds))
        .unwrap_or(existing.otp_expires_at);

    let result = sqlx::query(
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
    .await;

    match result {
        Ok(_) => {
            let updated = ProjectUser {
                id: existing.id,
                project_id: existing.project_id,
                phone_number,
                full_name,
                otp_code,
                otp_expires_at,
                created_at: existing.created_at,
                updated_at: now,
            };
            log_activity(&state.event_bus, "updated", Some(identity.id), &updated);
            Ok(Json(ActionResponse::success("userUpdatedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/users/{user_id}",
    tag = "ProjectUsers",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "Project user id")
    ),
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn delete_project_user(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_delete() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let user = match fetch_project_user(&state.pool, project_id, user_id)
        .await
        .and_then(ProjectUser::try_from)
    {
        Ok(user) => user,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    let result = sqlx::query("DELETE FROM project_users WHERE id = ? AND project_id = ?")
        .bind(user_id)
        .bind(project_id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(_) => {
            log_activity(&state.event_bus, "deleted", Some(identity.id), &user);
            Ok(Json(ActionResponse::success("userDeletedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

async fn fetch_project_user(pool: &SqlitePool, project_id: Uuid, user_id: Uuid) -> AppResult<DbProjectUser> {
    sqlx::query_as::<_, DbProjectUser>(
        "SELECT id, project_id, phone_number, full_name, otp_code, otp_expires_at, created_at, updated_at FROM project_users WHERE id = ? AND project_id = ?",
    )
    .bind(user_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))
}

pub(crate) async fn phone_taken(
    pool: &SqlitePool,
    project_id: Uuid,
    phone_number: &str,
    exclude: Option<Uuid>,
) -> AppResult<bool> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar("SELECT COUNT(1) FROM project_users WHERE project_id = ? AND phone_number = ? AND id != ?")
                .bind(project_id)
                .bind(phone_number)
                .bind(id)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM project_users WHERE project_id = ? AND phone_number = ?")
                .bind(project_id)
                .bind(phone_number)
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count > 0)
}
