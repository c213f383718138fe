use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Store {
    fn entity_type() -> &'static str {
        "store"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbStore {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbStore> for Store {
    type Error = AppError;

    fn try_from(value: DbStore) -> Result<Self, Self::Error> {
        Ok(Store {
            id: value.id,
            project_id: value.project_id,
            title: value.title,
            description: value.description,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StoreCreateRequest {
    #[schema(example = "Downtown Branch")]
    pub title: String,
    #[schema(example = "Walk-in outlet near the main square")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StoreUpdateRequest {
    pub title: String,
    pub description: Option<String>,
}

/// Fields exposed on the public REST listing.
#[derive(Debug, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Public REST detail: the summary plus the store's settings block.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreDetail {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub store_settings: StoreSettingsView,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettingsView {
    pub page_size: i64,
    pub is_shipping_fee: bool,
    pub shipping_fee: i64,
    pub free_shipping_more_than: i64,
    pub tax_percent: i64,
}

impl Default for StoreSettingsView {
    fn default() -> Self {
        Self {
            page_size: 10,
            is_shipping_fee: false,
            shipping_fee: 0,
            free_shipping_more_than: 0,
            tax_percent: 0,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettingsUpdateRequest {
    pub page_size: i64,
    pub is_shipping_fee: bool,
    pub shipping_fee: i64,
    pub free_shipping_more_than: i64,
    pub tax_percent: i64,
}
