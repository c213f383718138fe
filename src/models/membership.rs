use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::authz::Permission;
use crate::errors::AppError;

/// One (account, project) grant with its permission set. Replaced
/// wholesale on every share operation, never diffed.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbMembership {
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub permissions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbMembership> for Membership {
    type Error = AppError;

    fn try_from(value: DbMembership) -> Result<Self, Self::Error> {
        let permissions: Vec<Permission> = serde_json::from_str(&value.permissions)
            .map_err(|err| AppError::internal(format!("malformed permission set: {err}")))?;

        Ok(Membership {
            user_id: value.user_id,
            project_id: value.project_id,
            permissions,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// One entry of a share payload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareItem {
    pub user_id: Uuid,
    pub permissions: Vec<Permission>,
}

impl ShareItem {
    pub fn permissions_json(&self) -> Result<String, AppError> {
        serde_json::to_string(&self.permissions)
            .map_err(|err| AppError::internal(format!("failed to encode permissions: {err}")))
    }
}
