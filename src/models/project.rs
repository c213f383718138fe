use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::membership::{Membership, ShareItem};

/// A project is the multi-tenant boundary: it owns stores, categories and
/// project users, and carries the bearer key for its public REST surface.
/// The key is never serialized with the project; it is fetched through the
/// dedicated api-key endpoint, which is gated like sharing.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for Project {
    fn entity_type() -> &'static str {
        "project"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProject {
    pub id: Uuid,
    pub title: String,
    pub owner_id: Uuid,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProject> for Project {
    type Error = AppError;

    fn try_from(value: DbProject) -> Result<Self, Self::Error> {
        Ok(Project {
            id: value.id,
            title: value.title,
            owner_id: value.owner_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Project detail as returned by the console: the project plus its
/// membership rows, so the share dialog can render current grants.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithMembers {
    #[serde(flatten)]
    pub project: Project,
    pub user_projects: Vec<Membership>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreateRequest {
    #[schema(example = "Corner Shop")]
    pub title: String,
    /// Optional initial grants; the creator is always added with
    /// FULLACCESS whether or not they appear here.
    #[serde(default)]
    pub user_projects: Vec<ShareItem>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProjectUpdateRequest {
    #[schema(example = "Corner Shop")]
    pub title: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShareRequest {
    pub items: Vec<ShareItem>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub api_key: String,
}

pub const TITLE_MIN: usize = 3;
pub const TITLE_MAX: usize = 50;

/// Title validation shared by create and update.
pub fn validate_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("titleRequired"));
    }
    if title.chars().count() < TITLE_MIN {
        return Err(AppError::validation("titleMinLength"));
    }
    if title.chars().count() > TITLE_MAX {
        return Err(AppError::validation("titleMaxLength"));
    }
    Ok(title)
}
