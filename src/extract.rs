use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};

use crate::errors::AppError;

/// `axum::Json` replacement for request bodies that reports the path of
/// the offending field on deserialization failure, so 400 responses name
/// what was wrong instead of a bare syntax error.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|err| AppError::bad_request(err.to_string()))?;

        let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
        match serde_path_to_error::deserialize(deserializer) {
            Ok(value) => Ok(ValidatedJson(value)),
            Err(err) => {
                let path = err.path().to_string();
                if path.is_empty() || path == "." {
                    Err(AppError::validation(err.inner().to_string()))
                } else {
                    Err(AppError::validation(format!("{}: {}", path, err.inner())))
                }
            }
        }
    }
}
