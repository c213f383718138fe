use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;
use uuid::Uuid;

use super::principal::Identity;
use crate::errors::{AppError, AppResult};

/// Per-membership permission, granted when a project is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Permission {
    #[serde(rename = "FULLACCESS")]
    FullAccess,
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "EDIT")]
    Edit,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "VIEW")]
    View,
}

/// The evaluator's output for one (project, identity) pair.
///
/// `permissions` mirrors the caller's membership row exactly (absent row
/// yields an empty set). Ownership admits the caller past the gate but
/// grants no capability by itself; only the global admin role or the
/// permission set does.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub is_owner: bool,
    pub is_global_admin: bool,
    pub permissions: HashSet<Permission>,
}

impl ProjectAccess {
    fn allows(&self, permission: Permission) -> bool {
        self.is_global_admin
            || self.permissions.contains(&Permission::FullAccess)
            || self.permissions.contains(&permission)
    }

    pub fn can_view(&self) -> bool {
        self.allows(Permission::View)
    }

    pub fn can_add(&self) -> bool {
        self.allows(Permission::Add)
    }

    pub fn can_edit(&self) -> bool {
        self.allows(Permission::Edit)
    }

    pub fn can_delete(&self) -> bool {
        self.allows(Permission::Delete)
    }

    /// Sharing has no dedicated permission; FULLACCESS or admin only.
    pub fn can_share(&self) -> bool {
        self.is_global_admin || self.permissions.contains(&Permission::FullAccess)
    }
}

/// Derive the caller's standing on a project.
///
/// Fails NotFound when the project does not exist, Unauthorized when the
/// caller is neither the owner, nor a global admin, nor listed in the
/// project's membership table.
pub async fn evaluate(pool: &SqlitePool, project_id: Uuid, identity: &Identity) -> AppResult<ProjectAccess> {
    let owner_id: Option<Uuid> = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(pool)
        .await?;

    let owner_id = owner_id.ok_or_else(|| AppError::not_found("Project not found"))?;

    let membership: Option<String> =
        sqlx::query_scalar("SELECT permissions FROM user_projects WHERE user_id = ? AND project_id = ?")
            .bind(identity.id)
            .bind(project_id)
            .fetch_optional(pool)
            .await?;

    grant(owner_id, membership.as_deref(), identity)
}

/// Pure grant rules, split from the row lookups so they can be tested
/// without a pool.
fn grant(owner_id: Uuid, membership: Option<&str>, identity: &Identity) -> AppResult<ProjectAccess> {
    let is_owner = owner_id == identity.id;
    let is_global_admin = identity.is_global_admin();

    if !is_owner && !is_global_admin && membership.is_none() {
        tracing::debug!(
            account_id = %identity.id,
            "project access denied: no ownership, admin role, or membership"
        );
        return Err(AppError::unauthorized("unauthorized"));
    }

    let permissions = match membership {
        Some(raw) => parse_permissions(raw)?,
        None => HashSet::new(),
    };

    Ok(ProjectAccess {
        is_owner,
        is_global_admin,
        permissions,
    })
}

fn parse_permissions(raw: &str) -> AppResult<HashSet<Permission>> {
    serde_json::from_str::<Vec<Permission>>(raw)
        .map(|perms| perms.into_iter().collect())
        .map_err(|err| AppError::internal(format!("malformed permission set: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::GlobalRole;

    fn identity(id: Uuid, role: GlobalRole) -> Identity {
        Identity { id, role }
    }

    #[test]
    fn admin_without_membership_passes_gate_and_all_checks() {
        let owner = Uuid::new_v4();
        let admin = identity(Uuid::new_v4(), GlobalRole::Admin);

        let access = grant(owner, None, &admin).unwrap();
        assert!(access.is_global_admin);
        assert!(!access.is_owner);
        assert!(access.can_view());
        assert!(access.can_add());
        assert!(access.can_edit());
        assert!(access.can_delete());
        assert!(access.can_share());
    }

    #[test]
    fn owner_without_membership_passes_gate_but_no_capability() {
        let owner_id = Uuid::new_v4();
        let owner = identity(owner_id, GlobalRole::User);

        let access = grant(owner_id, None, &owner).unwrap();
        assert!(access.is_owner);
        assert!(access.permissions.is_empty());
        assert!(!access.can_view());
        assert!(!access.can_add());
        assert!(!access.can_edit());
        assert!(!access.can_delete());
        assert!(!access.can_share());
    }

    #[test]
    fn stranger_is_rejected_at_the_gate() {
        let owner = Uuid::new_v4();
        let stranger = identity(Uuid::new_v4(), GlobalRole::User);

        let err = grant(owner, None, &stranger).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn fullaccess_subsumes_every_capability() {
        let owner = Uuid::new_v4();
        let member = identity(Uuid::new_v4(), GlobalRole::User);

        let access = grant(owner, Some(r#"["FULLACCESS"]"#), &member).unwrap();
        assert!(access.can_view());
        assert!(access.can_add());
        assert!(access.can_edit());
        assert!(access.can_delete());
        assert!(access.can_share());
    }

    #[test]
    fn single_permissions_map_one_to_one() {
        let owner = Uuid::new_v4();
        let member = identity(Uuid::new_v4(), GlobalRole::User);

        let view_only = grant(owner, Some(r#"["VIEW"]"#), &member).unwrap();
        assert!(view_only.can_view());
        assert!(!view_only.can_add());
        assert!(!view_only.can_share());

        let add_only = grant(owner, Some(r#"["ADD"]"#), &member).unwrap();
        assert!(!add_only.can_view());
        assert!(add_only.can_add());
        assert!(!add_only.can_edit());
        assert!(!add_only.can_delete());
    }

    #[test]
    fn empty_membership_row_admits_but_grants_nothing() {
        let owner = Uuid::new_v4();
        let member = identity(Uuid::new_v4(), GlobalRole::User);

        let access = grant(owner, Some("[]"), &member).unwrap();
        assert!(access.permissions.is_empty());
        assert!(!access.can_view());
    }

    #[test]
    fn redundant_entries_are_harmless() {
        let owner = Uuid::new_v4();
        let member = identity(Uuid::new_v4(), GlobalRole::User);

        let access = grant(owner, Some(r#"["FULLACCESS","VIEW","VIEW"]"#), &member).unwrap();
        assert!(access.can_delete());
        assert!(access.can_share());
    }

    #[test]
    fn malformed_permission_json_is_an_internal_error() {
        let owner = Uuid::new_v4();
        let member = identity(Uuid::new_v4(), GlobalRole::User);

        let err = grant(owner, Some("not json"), &member).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
