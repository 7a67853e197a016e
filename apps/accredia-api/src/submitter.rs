//! Submitter identification from the gateway.
//!
//! The gateway authenticates callers and forwards the account id in
//! `X-Submitter-Id`. Requests without the header are anonymous.

use accredia_api_accreditation::{AccreditationApiError, AuthenticatedUser};
use accredia_core::UserId;
use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

pub const SUBMITTER_HEADER: &str = "X-Submitter-Id";

/// Place an [`AuthenticatedUser`] in request extensions when the gateway
/// header is present. A malformed header is rejected with 401.
pub async fn submitter_middleware(
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let Some(raw) = request.headers().get(SUBMITTER_HEADER) else {
        return Ok(next.run(request).await);
    };

    let user_id: UserId = raw
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            tracing::warn!("Malformed X-Submitter-Id header");
            AccreditationApiError::Unauthorized.into_response()
        })?;

    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn whoami(user: Option<AuthenticatedUser>) -> String {
        user.map_or_else(|| "anonymous".to_string(), |u| u.user_id.to_string())
    }

    fn app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn(submitter_middleware))
    }

    async fn call(header: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = header {
            builder = builder.header(SUBMITTER_HEADER, value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_header_sets_submitter() {
        let user = UserId::new();
        let (status, body) = call(Some(&user.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, user.to_string());
    }

    #[tokio::test]
    async fn test_missing_header_is_anonymous() {
        let (status, body) = call(None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let (status, _) = call(Some("not-a-uuid")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
