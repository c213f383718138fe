use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::{json, Value};
use sqlx::FromRow;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::models::category::{CategorySummary, ParentCategory};
use crate::models::pagination::{Page, PageQuery};

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: Uuid,
    title: String,
    slug: String,
    kind: String,
    parent_id: Option<Uuid>,
    parent_title: Option<String>,
    parent_slug: Option<String>,
    parent_kind: Option<String>,
}

impl From<CategoryRow> for CategorySummary {
    fn from(row: CategoryRow) -> Self {
        let parent = match (row.parent_id, row.parent_title, row.parent_slug, row.parent_kind) {
            (Some(id), Some(title), Some(slug), Some(kind)) => Some(ParentCategory { id, title, slug, kind }),
            _ => None,
        };
        CategorySummary {
            id: row.id,
            title: row.title,
            slug: row.slug,
            kind: row.kind,
            parent,
        }
    }
}

/// Public category listing; the one surface that needs no API key.
#[utoipa::path(
    get,
    path = "/api/{project_id}/categories",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        crate::models::pagination::PageQuery
    ),
    responses((status = 200, description = "Paginated categories"))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Value>> {
    let page = Page::from_query(&query);

    let rows = sqlx::query_as::<_, CategoryRow>(
        "SELECT c.id, c.title, c.slug, c.kind, \
                p.id AS parent_id, p.title AS parent_title, p.slug AS parent_slug, p.kind AS parent_kind \
         FROM categories c \
         LEFT JOIN categories p ON p.id = c.parent_id \
         WHERE c.project_id = ? \
         ORDER BY c.created_at DESC \
         LIMIT ? OFFSET ?",
    )
    .bind(project_id)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM categories WHERE project_id = ?")
        .bind(project_id)
        .fetch_one(&state.pool)
        .await?;

    let data: Vec<CategorySummary> = rows.into_iter().map(CategorySummary::from).collect();

    Ok(Json(json!({
        "data": data,
        "pagination": {
            "page": page.page,
            "limit": page.limit,
            "totalPages": page.total_pages(total),
            "totalClassifications": total,
        }
    })))
}

#[utoipa::path(
    get,
    path = "/api/{project_id}/categories/{category_id}",
    tag = "Public API",
    params(
        ("project_id" = Uuid, Path, description = "Project id"),
        ("category_id" = Uuid, Path, description = "Category id")
    ),
    responses(
        (status = 200, description = "Category detail", body = CategorySummary),
        (status = 404, description = "Category not found")
    )
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path((project_id, category_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<CategorySummary>> {
    let row = sqlx::query_as::<_, CategoryRow>(
        "SELECT c.id, c.title, c.slug, c.kind, \
                p.id AS parent_id, p.title AS parent_title, p.slug AS parent_slug, p.kind AS parent_kind \
         FROM categories c \
         LEFT JOIN categories p ON p.id = c.parent_id \
         WHERE c.id = ? AND c.project_id = ?",
    )
    .bind(category_id)
    .bind(project_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("Category not found"))?;

    Ok(Json(row.into()))
}
