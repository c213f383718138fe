use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppError;

/// Global role of a console account, independent of any project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalRole {
    Admin,
    User,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Admin => "ADMIN",
            GlobalRole::User => "USER",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "ADMIN" => Ok(GlobalRole::Admin),
            "USER" => Ok(GlobalRole::User),
            other => Err(AppError::internal(format!("unknown account role: {other}"))),
        }
    }
}

/// The authenticated principal for console calls.
///
/// Extracting this from a request is the identity-resolution step: it
/// decodes the bearer token and loads the account's global role, so
/// handlers receive the identity explicitly instead of reading ambient
/// session state.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub role: GlobalRole,
}

impl Identity {
    pub fn is_global_admin(&self) -> bool {
        self.role == GlobalRole::Admin
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::unauthorized("Authorization header missing"))?;

        let claims = state.jwt.decode(token)?;

        let role: Option<String> = sqlx::query_scalar("SELECT role FROM accounts WHERE id = ?")
            .bind(claims.sub)
            .fetch_optional(&state.pool)
            .await?;

        let role = role.ok_or_else(|| AppError::unauthorized("account no longer exists"))?;

        Ok(Identity {
            id: claims.sub,
            role: GlobalRole::parse(&role)?,
        })
    }
}
