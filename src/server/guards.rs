use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

/// The raw bearer credential from `Authorization: Bearer <token>`, required by every endpoint
/// that binds an operation to the upstream identity that owns the data (stream attach, status
/// reports, edge registration). Missing entirely ⇒ 401, matching the external-interface table.
pub struct BearerCredential(pub String);

impl<S> FromRequestParts<S> for BearerCredential
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| BearerCredential(auth.token().to_string()))
            .ok_or_else(|| StatusCode::UNAUTHORIZED.into_response())
    }
}
