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
use crate::models::category::{Category, CategoryCreateRequest, CategoryUpdateRequest, DbCategory};
use crate::utils::{slugify, utc_now};

#[utoipa::path(
    get,
    path = "/projects/{project_id}/categories",
    tag = "Categories",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Categories of the project", body = [Category]))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    identity: Identity,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Category>>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let categories = sqlx::query_as::<_, DbCategory>(
        "SELECT id, project_id, title, slug, kind, parent_id, created_at, updated_at FROM categories WHERE project_id = ? ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;

    let categories: Vec<Category> = categories
        .into_iter()
        .map(Category::try_from)
        .collect::<Result<_, _>>()?;
    Ok(Json(categories))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/categories/{category_id}",
    tag = "Categories",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("category_id" = Uuid, Path, description = "Category id")
    ),
    responses(
        (status = 200, description = "Category detail", body = Category),
        (status = 404, description = "Category not found")
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, category_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Category>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let category = fetch_category(&state.pool, project_id, category_id).await?;
    Ok(Json(category.try_into()?))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/categories",
    tag = "Categories",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = CategoryCreateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn create_category(
    State(state): State<AppState>,
    identity: Identity,
    Path(project_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<CategoryCreateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_add() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Ok(Json(ActionResponse::error("titleRequired")));
    }

    // A parent reference must point inside the same project.
    if let Some(parent_id) = payload.parent_id {
        if fetch_category(&state.pool, project_id, parent_id).await.is_err() {
            return Ok(Json(ActionResponse::error("categoryParentNotFound")));
        }
    }

    let now = utc_now();
    let category = Category {
        id: Uuid::new_v4(),
        project_id,
        slug: slugify(&title),
        title,
        kind: payload.kind,
        parent_id: payload.parent_id,
        created_at: now,
        updated_at: now,
    };

    let result = sqlx::query(
        "INSERT INTO categories (id, project_id, title, slug, kind, parent_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(category.id)
    .bind(category.project_id)
    .bind(&category.title)
    .bind(&category.slug)
    .bind(&category.kind)
    .bind(category.parent_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await;

    match result {
        Ok(_) => {
            log_activity(&state.event_bus, "created", Some(identity.id), &category);
            Ok(Json(ActionResponse::success("categoryAddedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}/categories/{category_id}",
    tag = "Categories",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("category_id" = Uuid, Path, description = "Category id")
    ),
    request_body = CategoryUpdateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn update_category(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, category_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<CategoryUpdateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_edit() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let existing = match fetch_category(&state.pool, project_id, category_id).await {
        Ok(category) => category,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Ok(Json(ActionResponse::error("titleRequired")));
    }

    if let Some(parent_id) = payload.parent_id {
        if parent_id == category_id {
            return Ok(Json(ActionResponse::error("categoryParentNotFound")));
        }
        if fetch_category(&state.pool, project_id, parent_id).await.is_err() {
            return Ok(Json(ActionResponse::error("categoryParentNotFound")));
        }
    }

    let now = utc_now();
    let slug = slugify(&title);
    let result = sqlx::query(
        "UPDATE categories SET title = ?, slug = ?, kind = ?, parent_id = ?, updated_at = ? WHERE id = ? AND project_id = ?",
    )
    .bind(&title)
    .bind(&slug)
    .bind(&payload.kind)
    .bind(payload.parent_id)
    .bind(now)
    .bind(category_id)
    .bind(project_id)
    .execute(&state.pool)
    .await;

    match result {
        Ok(_) => {
            let updated = Category {
                id: existing.id,
                project_id: existing.project_id,
                title,
                slug,
                kind: payload.kind,
                parent_id: payload.parent_id,
                created_at: existing.created_at,
                updated_at: now,
            };
            log_activity(&state.event_bus, "updated", Some(identity.id), &updated);
            Ok(Json(ActionResponse::success("categoryUpdatedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/categories/{category_id}",
    tag = "Categories",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("category_id" = Uuid, Path, description = "Category id")
    ),
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn delete_category(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, category_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_delete() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let category = match fetch_category(&state.pool, project_id, category_id)
        .await
        .and_then(Category::try_from)
    {
        Ok(category) => category,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    // Children are detached, not deleted, so a subtree survives losing its
    // root.
    let result: Result<(), sqlx::Error> = async {
        let mut tx = state.pool.begin().await?;
        sqlx::query("UPDATE categories SET parent_id = NULL WHERE parent_id = ? AND project_id = ?")
            .bind(category_id)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM categories WHERE id = ? AND project_id = ?")
            .bind(category_id)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }
    .await;

    match result {
        Ok(()) => {
            log_activity(&state.event_bus, "deleted", Some(identity.id), &category);
            Ok(Json(ActionResponse::success("categoryDeletedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

async fn fetch_category(pool: &SqlitePool, project_id: Uuid, category_id: Uuid) -> AppResult<DbCategory> {
    sqlx::query_as::<_, DbCategory>(
        "SELECT id, project_id, title, slug, kind, parent_id, created_at, updated_at FROM categories WHERE id = ? AND project_id = ?",
    )
    .bind(category_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Category not found"))
}
