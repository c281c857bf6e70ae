//! Caller identity extraction.
//!
//! Authentication and role checks live in the upstream gateway; by the time
//! a request reaches this service the caller has been verified and their id
//! is forwarded in `X-User-Id`. Container-level authorization (may this user
//! manage that container) is still checked here against the database.

use crate::error::HttpAppError;
use axum::{extract::FromRequestParts, http::request::Parts};
use lectern_core::AppError;
use uuid::Uuid;

/// Header carrying the gateway-verified caller id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Verified caller identity for the current request.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                HttpAppError(AppError::Forbidden("Missing caller identity".to_string()))
            })?;

        let user_id = Uuid::parse_str(header).map_err(|_| {
            HttpAppError(AppError::Forbidden("Invalid caller identity".to_string()))
        })?;

        Ok(UserContext { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<UserContext, HttpAppError> {
        let (mut parts, _) = request.into_parts();
        UserContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header_is_accepted() {
        let user_id = Uuid::new_v4();
        let request = Request::builder()
            .header(USER_ID_HEADER, user_id.to_string())
            .body(())
            .unwrap();
        let ctx = extract(request).await.unwrap();
        assert_eq!(ctx.user_id, user_id);
    }

    #[tokio::test]
    async fn test_missing_header_is_forbidden() {
        let request = Request::builder().body(()).unwrap();
        let result = extract(request).await;
        assert!(matches!(result, Err(HttpAppError(AppError::Forbidden(_)))));
    }

    #[tokio::test]
    async fn test_malformed_header_is_forbidden() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "not-a-uuid")
            .body(())
            .unwrap();
        let result = extract(request).await;
        assert!(matches!(result, Err(HttpAppError(AppError::Forbidden(_)))));
    }
}
