use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

pub const OTP_TTL_MIN_SECONDS: i64 = 60;
pub const OTP_TTL_MAX_SECONDS: i64 = 900;

/// End user of a project's storefront, identified by phone number and
/// authenticated out-of-band via OTP. Unrelated to console accounts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUser {
    pub id: Uuid,
    pub project_id: Uuid,
    pub phone_number: String,
    pub full_name: Option<String>,
    pub otp_code: String,
    pub otp_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl crate::events::Loggable for ProjectUser {
    fn entity_type() -> &'static str {
        "project_user"
    }
    fn subject_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbProjectUser {
    pub id: Uuid,
    pub project_id: Uuid,
    pub phone_number: String,
    pub full_name: Option<String>,
    pub otp_code: String,
    pub otp_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbProjectUser> for ProjectUser {
    type Error = AppError;

    fn try_from(value: DbProjectUser) -> Result<Self, Self::Error> {
        Ok(ProjectUser {
            id: value.id,
            project_id: value.project_id,
            phone_number: value.phone_number,
            full_name: value.full_name,
            otp_code: value.otp_code,
            otp_expires_at: value.otp_expires_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// Listing shape for the public REST surface (no OTP material).
#[derive(Debug, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUserSummary {
    pub id: Uuid,
    pub phone_number: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUserCreateRequest {
    #[schema(example = "09123456789")]
    pub phone_number: String,
    #[schema(example = "Sara Ahmadi")]
    pub full_name: Option<String>,
    #[schema(example = "4821")]
    pub otp_code: String,
    /// OTP time-to-live in seconds, converted to an absolute expiry.
    #[schema(example = 300)]
    pub otp_expires_in: i64,
}

impl ProjectUserCreateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_phone_number(&self.phone_number)?;
        validate_otp_code(&self.otp_code)?;
        validate_otp_ttl(self.otp_expires_in)?;
        Ok(())
    }

    pub fn otp_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.otp_expires_in)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUserUpdateRequest {
    pub phone_number: Option<String>,
    pub full_name: Option<String>,
    pub otp_code: Option<String>,
    pub otp_expires_in: Option<i64>,
}

impl ProjectUserUpdateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(phone) = self.phone_number.as_deref() {
            validate_phone_number(phone)?;
        }
        if let Some(otp) = self.otp_code.as_deref() {
            validate_otp_code(otp)?;
        }
        if let Some(ttl) = self.otp_expires_in {
            validate_otp_ttl(ttl)?;
        }
        Ok(())
    }
}

/// Exactly 11 digits, leading `09`.
pub fn validate_phone_number(phone: &str) -> Result<(), AppError> {
    if phone.len() != 11 {
        return Err(AppError::validation("Phone number must be exactly 11 digits"));
    }
    if !phone.starts_with("09") || !phone.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation("Invalid phone number format"));
    }
    Ok(())
}

pub fn validate_otp_code(otp: &str) -> Result<(), AppError> {
    if otp.len() != 4 || !otp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation("OTP must be exactly 4 numeric digits"));
    }
    Ok(())
}

pub fn validate_otp_ttl(seconds: i64) -> Result<(), AppError> {
    if seconds < OTP_TTL_MIN_SECONDS {
        return Err(AppError::validation("Expiration time must be at least 60 seconds"));
    }
    if seconds > OTP_TTL_MAX_SECONDS {
        return Err(AppError::validation("Expiration time cannot exceed 900 seconds (15 minutes)"));
    }
    Ok(())
}
