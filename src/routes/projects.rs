use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{self, Identity, Permission};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::extract::ValidatedJson;
use crate::models::action::ActionResponse;
use crate::models::membership::{DbMembership, Membership, ShareItem};
use crate::models::project::{
    validate_title, ApiKeyResponse, DbProject, Project, ProjectCreateRequest, ProjectUpdateRequest,
    ProjectWithMembers, ShareRequest,
};
use crate::utils::{generate_api_key, utc_now};

/// Create/update responses carry the project so the console can navigate
/// to it without a follow-up fetch.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectActionResponse {
    #[serde(flatten)]
    pub envelope: ActionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<Project>,
}

impl ProjectActionResponse {
    fn error(envelope: ActionResponse) -> Self {
        Self {
            envelope,
            project: None,
        }
    }
}

#[derive(Debug, FromRow)]
struct DbProjectListRow {
    id: Uuid,
    title: String,
    owner_id: Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    member_permissions: Option<String>,
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    responses((status = 200, description = "Projects visible to the caller", body = [Project]))
)]
pub async fn list_projects(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Vec<Project>>> {
    if identity.is_global_admin() {
        let projects = sqlx::query_as::<_, DbProject>(
            "SELECT id, title, owner_id, api_key, created_at, updated_at FROM projects ORDER BY created_at DESC",
        )
        .fetch_all(&state.pool)
        .await?;

        let projects: Vec<Project> = projects
            .into_iter()
            .map(Project::try_from)
            .collect::<Result<_, _>>()?;
        return Ok(Json(projects));
    }

    // Owned projects always show; shared ones only with FULLACCESS or VIEW.
    let rows = sqlx::query_as::<_, DbProjectListRow>(
        "SELECT p.id, p.title, p.owner_id, p.created_at, p.updated_at, up.permissions AS member_permissions \
         FROM projects p \
         LEFT JOIN user_projects up ON up.project_id = p.id AND up.user_id = ? \
         WHERE p.owner_id = ? OR up.user_id IS NOT NULL \
         ORDER BY p.created_at DESC",
    )
    .bind(identity.id)
    .bind(identity.id)
    .fetch_all(&state.pool)
    .await?;

    let mut projects = Vec::with_capacity(rows.len());
    for row in rows {
        let is_owner = row.owner_id == identity.id;
        let visible = if is_owner {
            true
        } else {
            match row.member_permissions.as_deref() {
                Some(raw) => {
                    let perms: Vec<Permission> = serde_json::from_str(raw)
                        .map_err(|err| AppError::internal(format!("malformed permission set: {err}")))?;
                    perms.contains(&Permission::FullAccess) || perms.contains(&Permission::View)
                }
                None => false,
            }
        };
        if visible {
            projects.push(Project {
                id: row.id,
                title: row.title,
                owner_id: row.owner_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
    }

    Ok(Json(projects))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project with membership rows", body = ProjectWithMembers),
        (status = 404, description = "Project not found")
    )
)]
pub async fn get_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProjectWithMembers>> {
    // Gate only: owner, admin or any membership row may read the project.
    let _access = authz::evaluate(&state.pool, id, &identity).await?;

    let project = fetch_project(&state.pool, id).await?;
    let project: Project = project.try_into()?;
    let user_projects = fetch_memberships(&state.pool, id).await?;

    Ok(Json(ProjectWithMembers { project, user_projects }))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses((status = 200, description = "Action envelope, with the project on success", body = ProjectActionResponse))
)]
pub async fn create_project(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(payload): ValidatedJson<ProjectCreateRequest>,
) -> AppResult<Json<ProjectActionResponse>> {
    let title = match validate_title(&payload.title) {
        Ok(title) => title.to_string(),
        Err(err) => return Ok(Json(ProjectActionResponse::error(ActionResponse::from_error(err)))),
    };

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM projects WHERE title = ?")
        .bind(&title)
        .fetch_one(&state.pool)
        .await?;
    if existing > 0 {
        return Ok(Json(ProjectActionResponse::error(ActionResponse::error(
            "error.project_exists",
        ))));
    }

    let now = utc_now();
    let project_id = Uuid::new_v4();
    let api_key = generate_api_key();

    // The creator always ends up with a FULLACCESS membership, whether or
    // not the payload lists them.
    let mut grants: Vec<ShareItem> = payload
        .user_projects
        .into_iter()
        .filter(|item| item.user_id != identity.id)
        .collect();
    grants.push(ShareItem {
        user_id: identity.id,
        permissions: vec![Permission::FullAccess],
    });

    let result: Result<(), AppError> = async {
        let mut tx = state.pool.begin().await?;

        sqlx::query(
            "INSERT INTO projects (id, title, owner_id, api_key, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(&title)
        .bind(identity.id)
        .bind(&api_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for item in &grants {
            let permissions = item.permissions_json()?;
            sqlx::query(
                "INSERT OR REPLACE INTO user_projects (user_id, project_id, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(item.user_id)
            .bind(project_id)
            .bind(&permissions)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
    .await;

    if let Err(err) = result {
        return Ok(Json(ProjectActionResponse::error(ActionResponse::from_error(err))));
    }

    let project = Project {
        id: project_id,
        title,
        owner_id: identity.id,
        created_at: now,
        updated_at: now,
    };

    log_activity_with_context(&state.event_bus, "created", Some(identity.id), &project, None, None);

    Ok(Json(ProjectActionResponse {
        envelope: ActionResponse::success("projectAddedSuccessfully"),
        project: Some(project),
    }))
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ProjectUpdateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn update_project(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ProjectUpdateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_edit() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let title = match validate_title(&payload.title) {
        Ok(title) => title.to_string(),
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    let result = sqlx::query("UPDATE projects SET title = ?, updated_at = ? WHERE id = ?")
        .bind(&title)
        .bind(utc_now())
        .bind(id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(_) => {
            if let Ok(db_project) = fetch_project(&state.pool, id).await {
                if let Ok(project) = Project::try_from(db_project) {
                    log_activity_with_context(&state.event_bus, "updated", Some(identity.id), &project, None, None);
                }
            }
            Ok(Json(ActionResponse::success("projectUpdatedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_delete() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let project = match fetch_project(&state.pool, id).await.and_then(Project::try_from) {
        Ok(project) => project,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    // Memberships and every owned resource go in the same transaction as
    // the project row, so a crash cannot leave orphans behind.
    let result: Result<(), sqlx::Error> = async {
        let mut tx = state.pool.begin().await?;
        sqlx::query("DELETE FROM user_projects WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM store_settings WHERE store_id IN (SELECT id FROM stores WHERE project_id = ?)")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM stores WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM categories WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM project_users WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }
    .await;

    match result {
        Ok(()) => {
            log_activity_with_context(
                &state.event_bus,
                "deleted",
                Some(identity.id),
                &project,
                None,
                Some(RequestContext::from_headers(&headers)),
            );
            Ok(Json(ActionResponse::success("projectDeletedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/share",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = ShareRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn share_project(
    State(state): State<AppState>,
    identity: Identity,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ShareRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_share() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    if payload.items.is_empty() {
        return Ok(Json(ActionResponse::error("atLeastOneUser")));
    }
    if payload.items.iter().any(|item| item.permissions.is_empty()) {
        return Ok(Json(ActionResponse::error("permissionRequired")));
    }

    // Full replace, not a merge: the submitted set becomes the entire
    // membership table for this project, so omitting a user revokes them.
    let now = utc_now();
    let result: Result<(), AppError> = async {
        let mut tx = state.pool.begin().await?;
        sqlx::query("DELETE FROM user_projects WHERE project_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for item in &payload.items {
            let permissions = item.permissions_json()?;
            sqlx::query(
                "INSERT OR REPLACE INTO user_projects (user_id, project_id, permissions, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(item.user_id)
            .bind(id)
            .bind(&permissions)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            if let Ok(project) = fetch_project(&state.pool, id).await.and_then(Project::try_from) {
                log_activity_with_context(
                    &state.event_bus,
                    "shared",
                    Some(identity.id),
                    &project,
                    None,
                    Some(RequestContext::from_headers(&headers)),
                );
            }
            Ok(Json(ActionResponse::success("projectSharedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err))),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/api-key",
    tag = "Projects",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "The project's API key", body = ApiKeyResponse),
        (status = 403, description = "Caller may not read the key")
    )
)]
pub async fn get_api_key(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiKeyResponse>> {
    let access = authz::evaluate(&state.pool, id, &identity).await?;
    // Reading the key is equivalent to sharing the whole surface.
    if !access.can_share() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let project = fetch_project(&state.pool, id).await?;
    Ok(Json(ApiKeyResponse {
        api_key: project.api_key,
    }))
}

async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<DbProject> {
    sqlx::query_as::<_, DbProject>(
        "SELECT id, title, owner_id, api_key, created_at, updated_at FROM projects WHERE id = ?",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Project not found"))
}

async fn fetch_memberships(pool: &SqlitePool, project_id: Uuid) -> AppResult<Vec<Membership>> {
    let rows = sqlx::query_as::<_, DbMembership>(
        "SELECT user_id, project_id, permissions, created_at, updated_at FROM user_projects WHERE project_id = ?",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Membership::try_from).collect()
}
