use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// The client's transaction key, taken from the `Idempotency-Key` header.
#[derive(Debug, Clone)]
pub struct InboundKey(pub String);

impl<S> FromRequestParts<S> for InboundKey
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .ok_or_else(|| AppError::ValidationError("Missing Idempotency-Key header".to_string()))?;
        let key = raw
            .to_str()
            .map_err(|_| AppError::ValidationError("Idempotency-Key must be visible ASCII".to_string()))?
            .trim();

        if key.is_empty() {
            return Err(AppError::ValidationError("Idempotency-Key must not be empty".to_string()));
        }
        Ok(InboundKey(key.to_string()))
    }
}
