use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::AppError;

/// Envelope returned by console mutations. Exactly one of the two fields
/// carries a localization key; the other is the empty string, so the UI
/// can translate a single key without branching on exception types.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    #[schema(example = "storeAddedSuccessfully")]
    pub success: String,
    #[schema(example = "")]
    pub error: String,
}

impl ActionResponse {
    pub fn success(key: impl Into<String>) -> Self {
        Self {
            success: key.into(),
            error: String::new(),
        }
    }

    pub fn error(key: impl Into<String>) -> Self {
        Self {
            success: String::new(),
            error: key.into(),
        }
    }

    /// Normalize an evaluator or persistence failure into the envelope.
    /// NotFound/Unauthorized/Conflict keep their message key; anything
    /// else collapses to the generic key.
    pub fn from_error(err: AppError) -> Self {
        let key = match err {
            AppError::NotFound(msg) | AppError::Unauthorized(msg) | AppError::Conflict(msg) => msg,
            AppError::Validation(msg) | AppError::BadRequest(msg) => msg,
            _ => "somethingWentWrong".to_string(),
        };
        Self::error(key)
    }
}
