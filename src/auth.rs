use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity resolved by the upstream auth gateway. Credentials were
/// already checked before the request reached us; handlers only verify
/// that this actor is party to the resource they touch.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Forbidden(format!("missing {USER_ID_HEADER} header")))?;

        let id = raw
            .parse::<Uuid>()
            .map_err(|_| AppError::BadRequest(format!("{USER_ID_HEADER} must be a uuid")))?;

        Ok(Actor(id))
    }
}
