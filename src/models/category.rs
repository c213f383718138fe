use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

/// Classification node. `kind` partitions independent category trees
/// within a project (serialized as `type` for API compatibility).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Category {
    fn entity_type() -> &'static str {
        "category"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbCategory {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub slug: String,
    pub kind: String,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbCategory> for Category {
    type Error = AppError;

    fn try_from(value: DbCategory) -> Result<Self, Self::Error> {
        Ok(Category {
            id: value.id,
            project_id: value.project_id,
            title: value.title,
            slug: value.slug,
            kind: value.kind,
            parent_id: value.parent_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCreateRequest {
    #[schema(example = "Home Appliances")]
    pub title: String,
    #[serde(rename = "type")]
    #[schema(example = "product")]
    pub kind: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdateRequest {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parent_id: Option<Uuid>,
}

/// Public REST listing shape: flat fields plus an embedded parent summary.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parent: Option<ParentCategory>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentCategory {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: String,
}
