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
use crate::models::store::{
    DbStore, Store, StoreCreateRequest, StoreSettingsUpdateRequest, StoreSettingsView, StoreUpdateRequest,
};
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/projects/{project_id}/stores",
    tag = "Stores",
    params(("project_id" = Uuid, Path, description = "Project id")),
    responses((status = 200, description = "Stores of the project", body = [Store]))
)]
pub async fn list_stores(
    State(state): State<AppState>,
    identity: Identity,
    Path(project_id): Path<Uuid>,
) -> AppResult<Json<Vec<Store>>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let stores = sqlx::query_as::<_, DbStore>(
        "SELECT id, project_id, title, description, created_at, updated_at FROM stores WHERE project_id = ? ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;

    let stores: Vec<Store> = stores.into_iter().map(Store::try_from).collect::<Result<_, _>>()?;
    Ok(Json(stores))
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/stores/{store_id}",
    tag = "Stores",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    responses(
        (status = 200, description = "Store detail", body = Store),
        (status = 404, description = "Store not found")
    )
)]
pub async fn get_store(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Store>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let store = fetch_store(&state.pool, project_id, store_id).await?;
    Ok(Json(store.try_into()?))
}

#[utoipa::path(
    post,
    path = "/projects/{project_id}/stores",
    tag = "Stores",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = StoreCreateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn create_store(
    State(state): State<AppState>,
    identity: Identity,
    Path(project_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<StoreCreateRequest>,
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

    // Domain conflict, checked before insert rather than surfaced as a
    // storage constraint violation.
    if store_title_taken(&state.pool, project_id, &title, None).await? {
        return Ok(Json(ActionResponse::error("error.store_exists")));
    }

    let now = utc_now();
    let store = Store {
        id: Uuid::new_v4(),
        project_id,
        title,
        description: payload.description,
        created_at: now,
        updated_at: now,
    };

    let result = sqlx::query(
        "INSERT INTO stores (id, project_id, title, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(store.id)
    .bind(store.project_id)
    .bind(&store.title)
    .bind(&store.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await;

    match result {
        Ok(_) => {
            log_activity(&state.event_bus, "created", Some(identity.id), &store);
            Ok(Json(ActionResponse::success("storeAddedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}/stores/{store_id}",
    tag = "Stores",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    request_body = StoreUpdateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn update_store(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<StoreUpdateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_edit() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let existing = match fetch_store(&state.pool, project_id, store_id).await {
        Ok(store) => store,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Ok(Json(ActionResponse::error("titleRequired")));
    }

    if title != existing.title && store_title_taken(&state.pool, project_id, &title, Some(store_id)).await? {
        return Ok(Json(ActionResponse::error("error.store_exists")));
    }

    let now = utc_now();
    let result = sqlx::query("UPDATE stores SET title = ?, description = ?, updated_at = ? WHERE id = ? AND project_id = ?")
        .bind(&title)
        .bind(&payload.description)
        .bind(now)
        .bind(store_id)
        .bind(project_id)
        .execute(&state.pool)
        .await;

    match result {
        Ok(_) => {
            let updated = Store {
                id: existing.id,
                project_id: existing.project_id,
                title,
                description: payload.description,
                created_at: existing.created_at,
                updated_at: now,
            };
            log_activity(&state.event_bus, "updated", Some(identity.id), &updated);
            Ok(Json(ActionResponse::success("storeUpdatedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    delete,
    path = "/projects/{project_id}/stores/{store_id}",
    tag = "Stores",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn delete_store(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_delete() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    let store = match fetch_store(&state.pool, project_id, store_id).await.and_then(Store::try_from) {
        Ok(store) => store,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };

    let result: Result<(), sqlx::Error> = async {
        let mut tx = state.pool.begin().await?;
        sqlx::query("DELETE FROM store_settings WHERE store_id = ?")
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM stores WHERE id = ? AND project_id = ?")
            .bind(store_id)
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await
    }
    .await;

    match result {
        Ok(()) => {
            log_activity(&state.event_bus, "deleted", Some(identity.id), &store);
            Ok(Json(ActionResponse::success("storeDeletedSuccessfully")))
        }
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

#[utoipa::path(
    get,
    path = "/projects/{project_id}/stores/{store_id}/settings",
    tag = "Stores",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    responses((status = 200, description = "Store settings, created with defaults on first read", body = StoreSettingsView))
)]
pub async fn get_store_settings(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<StoreSettingsView>> {
    let access = authz::evaluate(&state.pool, project_id, &identity).await?;
    if !access.can_view() {
        return Err(AppError::forbidden("insufficient permission for this operation"));
    }

    let _ = fetch_store(&state.pool, project_id, store_id).await?;

    let settings = fetch_settings(&state.pool, store_id).await?;
    match settings {
        Some(settings) => Ok(Json(settings)),
        None => {
            let defaults = StoreSettingsView::default();
            sqlx::query(
                "INSERT INTO store_settings (store_id, page_size, is_shipping_fee, shipping_fee, free_shipping_more_than, tax_percent) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(store_id)
            .bind(defaults.page_size)
            .bind(defaults.is_shipping_fee)
            .bind(defaults.shipping_fee)
            .bind(defaults.free_shipping_more_than)
            .bind(defaults.tax_percent)
            .execute(&state.pool)
            .await?;
            Ok(Json(defaults))
        }
    }
}

#[utoipa::path(
    put,
    path = "/projects/{project_id}/stores/{store_id}/settings",
    tag = "Stores",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    request_body = StoreSettingsUpdateRequest,
    responses((status = 200, description = "Action envelope", body = ActionResponse))
)]
pub async fn update_store_settings(
    State(state): State<AppState>,
    identity: Identity,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<StoreSettingsUpdateRequest>,
) -> AppResult<Json<ActionResponse>> {
    let access = match authz::evaluate(&state.pool, project_id, &identity).await {
        Ok(access) => access,
        Err(err) => return Ok(Json(ActionResponse::from_error(err))),
    };
    if !access.can_edit() {
        return Ok(Json(ActionResponse::error("unauthorized")));
    }

    if let Err(err) = fetch_store(&state.pool, project_id, store_id).await {
        return Ok(Json(ActionResponse::from_error(err)));
    }

    let result = sqlx::query(
        "INSERT INTO store_settings (store_id, page_size, is_shipping_fee, shipping_fee, free_shipping_more_than, tax_percent) VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (store_id) DO UPDATE SET page_size = excluded.page_size, is_shipping_fee = excluded.is_shipping_fee, shipping_fee = excluded.shipping_fee, free_shipping_more_than = excluded.free_shipping_more_than, tax_percent = excluded.tax_percent",
    )
    .bind(store_id)
    .bind(payload.page_size)
    .bind(payload.is_shipping_fee)
    .bind(payload.shipping_fee)
    .bind(payload.free_shipping_more_than)
    .bind(payload.tax_percent)
    .execute(&state.pool)
    .await;

    match result {
        Ok(_) => Ok(Json(ActionResponse::success("storeSettingsUpdatedSuccessfully"))),
        Err(err) => Ok(Json(ActionResponse::from_error(err.into()))),
    }
}

async fn fetch_store(pool: &SqlitePool, project_id: Uuid, store_id: Uuid) -> AppResult<DbStore> {
    sqlx::query_as::<_, DbStore>(
        "SELECT id, project_id, title, description, created_at, updated_at FROM stores WHERE id = ? AND project_id = ?",
    )
    .bind(store_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Store not found"))
}

async fn fetch_settings(pool: &SqlitePool, store_id: Uuid) -> AppResult<Option<StoreSettingsView>> {
    Ok(sqlx::query_as::<_, StoreSettingsView>(
        "SELECT page_size, is_shipping_fee, shipping_fee, free_shipping_more_than, tax_percent FROM store_settings WHERE store_id = ?",
    )
    .bind(store_id)
    .fetch_optional(pool)
    .await?)
}

pub(crate) async fn store_title_taken(
    pool: &SqlitePool,
    project_id: Uuid,
    title: &str,
    exclude: Option<Uuid>,
) -> AppResult<bool> {
    let count: i64 = match exclude {
        Some(id) => {
            sqlx::query_scalar("SELECT COUNT(1) FROM stores WHERE project_id = ? AND title = ? AND id != ?")
                .bind(project_id)
                .bind(title)
                .bind(id)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(1) FROM stores WHERE project_id = ? AND title = ?")
                .bind(project_id)
                .bind(title)
                .fetch_one(pool)
                .await?
        }
    };
    Ok(count > 0)
}
