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
use crate::models::store::{DbStore, Store, StoreCreateRequest, StoreDetail, StoreSettingsView, StoreSummary, StoreUpdateRequest};
use crate::routes::stores::store_title_taken;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/api/{project_id}/stores",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        crate::models::pagination::PageQuery
    ),
    responses(
        (status = 200, description = "Paginated stores"),
        (status = 401, description = "Missing or invalid API key")
    )
)]
pub async fn list_stores(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let page = Page::from_query(&query);

    let stores = sqlx::query_as::<_, StoreSummary>(
        "SELECT id, title, description, created_at FROM stores WHERE project_id = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
    )
    .bind(project_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM stores WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(json!({
        "data": stores,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "totalPages": page.total_pages(total),
            "totalStores": total,
        }
    })))
}

#[utoipa::path(
    post,
    path = "/api/{project_id}/stores",
    tag = "Public API",
    params(("project_id" = Uuid, Path, description = "Project id")),
    request_body = StoreCreateRequest,
    responses(
        (status = 201, description = "Store created", body = StoreSummary),
        (status = 409, description = "Store with this title already exists")
    )
)]
pub async fn create_store(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<StoreCreateRequest>,
) -> AppResult<(StatusCode, Json<StoreSummary>)> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("Missing title"));
    }

    if store_title_taken(&state.pool, project_id, &title, None).await? {
        return Err(AppError::conflict("Store with this title already exists"));
    }

    let now = utc_now();
    let store_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO stores (id, project_id, title, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(store_id)
    .bind(project_id)
    .bind(&title)
    .bind(&payload.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let summary = StoreSummary {
        id: store_id,
        title,
        description: payload.description,
        created_at: now,
    };

    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/api/{project_id}/stores/{store_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    responses(
        (status = 200, description = "Store detail with settings", body = StoreDetail),
        (status = 404, description = "Store not found")
    )
)]
pub async fn get_store(
    State(state): State<AppState>,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> AppResult<Json<StoreDetail>> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let store = fetch_store(&state.pool, project_id, store_id).await?;

    let settings = sqlx::query_as::<_, StoreSettingsView>(
        "SELECT page_size, is_shipping_fee, shipping_fee, free_shipping_more_than, tax_percent FROM store_settings WHERE store_id = ?",
    )
    .bind(store_id)
    .fetch_optional(&state.pool)
    .await?
    .unwrap_or_default();

    Ok(Json(StoreDetail {
        id: store.id,
        title: store.title,
        description: store.description,
        created_at: store.created_at,
        store_settings: settings,
    }))
}

#[utoipa::path(
    put,
    path = "/api/{project_id}/stores/{store_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    request_body = StoreUpdateRequest,
    responses(
        (status = 200, description = "Store updated", body = Store),
        (status = 404, description = "Store not found"),
        (status = 409, description = "Title already in use")
    )
)]
pub async fn update_store(
    State(state): State<AppState>,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    ValidatedJson(payload): ValidatedJson<StoreUpdateRequest>,
) -> AppResult<Json<Store>> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let existing = fetch_store(&state.pool, project_id, store_id).await?;

    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("Missing title"));
    }

    if title != existing.title && store_title_taken(&state.pool, project_id, &title, Some(store_id)).await? {
        return Err(AppError::conflict("Title already in use"));
    }

    let now = utc_now();
    sqlx::query("UPDATE stores SET title = ?, description = ?, updated_at = ? WHERE id = ? AND project_id = ?")
        .bind(&title)
        .bind(&payload.description)
        .bind(now)
        .bind(store_id)
        .bind(project_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(Store {
        id: existing.id,
        project_id: existing.project_id,
        title,
        description: payload.description,
        created_at: existing.created_at,
        updated_at: now,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/{project_id}/stores/{store_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("store_id" = Uuid, Path, description = "Store id")
    ),
    responses(
        (status = 200, description = "Store deleted"),
        (status = 404, description = "Store not found")
    )
)]
pub async fn delete_store(
    State(state): State<AppState>,
    Path((project_id, store_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> AppResult<(StatusCode, &'static str)> {
    require_api_key(&state.pool, project_id, &headers).await?;

    let _ = fetch_store(&state.pool, project_id, store_id).await?;

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
    tx.commit().await?;

    Ok((StatusCode::OK, "Store deleted"))
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
