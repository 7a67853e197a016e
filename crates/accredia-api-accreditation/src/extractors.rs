//! Axum extractors for accreditation handlers.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AccreditationApiError;
use crate::models::AuthenticatedUser;

/// Reads the submitter placed in request extensions by upstream auth
/// middleware. Handlers that accept anonymous submissions take
/// `Option<AuthenticatedUser>`.
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AccreditationApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .copied()
            .ok_or(AccreditationApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accredia_core::UserId;
    use axum::http::Request;

    #[tokio::test]
    async fn test_reads_user_from_extensions() {
        let user = AuthenticatedUser {
            user_id: UserId::new(),
        };
        let (mut parts, ()) = Request::builder()
            .extension(user)
            .body(())
            .unwrap()
            .into_parts();

        let extracted = AuthenticatedUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(extracted, user);
    }

    #[tokio::test]
    async fn test_missing_user_is_rejected() {
        let (mut parts, ()) = Request::builder().body(()).unwrap().into_parts();
        let err = AuthenticatedUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, AccreditationApiError::Unauthorized));
    }
}
