use super::IsRetryable;
use axum::http::StatusCode;
use axum::{Json, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use relay_store::StoreError;
use serde::Serialize;
use thiserror::Error as ThisError;

/// The proxy's single error hierarchy. Every fallible operation in the core returns one of
/// these variants; `IntoResponse` maps each to the HTTP surface from the error-kinds table,
/// and `is_retryable` classifies it for the OAuth-exchange and push-delivery retry loops.
#[derive(Debug, ThisError)]
pub enum RelayError {
    #[error("webhook signature missing or invalid")]
    SignatureInvalid,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("auth state absent or expired")]
    StateExpired,

    #[error("token exchange with upstream failed: {0}")]
    TokenExchangeFailed(String),

    #[error("upstream viewer lookup failed: {0}")]
    WorkspaceLookupFailed(String),

    #[error("stored record failed authenticated decryption")]
    CryptoCorrupt,

    #[error("key/value store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("write to edge stream failed: {0}")]
    StreamWriteFailed(String),

    #[error("push delivery to edge failed after retries: {0}")]
    PushDeliveryFailed(String),

    #[error("credential refresh is not implemented; the workspace must re-authorize")]
    RefreshNotImplemented,

    #[error("upstream HTTP error with status {0}")]
    UpstreamStatus(StatusCode),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for RelayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => RelayError::StoreUnavailable(msg),
        }
    }
}

type TokenExchangeError = RequestTokenError<
    HttpClientError<ReqwestClientError>,
    StandardErrorResponse<BasicErrorResponseType>,
>;

impl From<TokenExchangeError> for RelayError {
    fn from(e: TokenExchangeError) -> Self {
        let detail = match e {
            RequestTokenError::ServerResponse(err) => err.error().to_string(),
            RequestTokenError::Request(wrapper) => match wrapper {
                HttpClientError::Reqwest(real_err) => real_err.to_string(),
                other => format!("{other:?}"),
            },
            RequestTokenError::Parse(parse_err, body) => {
                let preview = String::from_utf8_lossy(&body);
                format!("{parse_err}: {:.200}", preview)
            }
            RequestTokenError::Other(s) => s,
        };
        RelayError::TokenExchangeFailed(detail)
    }
}

impl IsRetryable for RelayError {
    fn is_retryable(&self) -> bool {
        match self {
            RelayError::Reqwest(_) => true,
            RelayError::UpstreamStatus(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            RelayError::TokenExchangeFailed(_) => false,
            _ => false,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            RelayError::SignatureInvalid => (
                StatusCode::UNAUTHORIZED,
                ApiErrorObject {
                    code: "SIGNATURE_INVALID",
                    message: "missing or invalid webhook signature".to_string(),
                },
            ),
            RelayError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "BAD_REQUEST",
                    message: msg.clone(),
                },
            ),
            RelayError::StateExpired => (
                StatusCode::BAD_REQUEST,
                ApiErrorObject {
                    code: "STATE_EXPIRED",
                    message: "auth state is absent or expired".to_string(),
                },
            ),
            RelayError::TokenExchangeFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "TOKEN_EXCHANGE_FAILED",
                    message: "failed to exchange authorization code with upstream".to_string(),
                },
            ),
            RelayError::WorkspaceLookupFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "WORKSPACE_LOOKUP_FAILED",
                    message: "failed to discover workspace from upstream".to_string(),
                },
            ),
            RelayError::CryptoCorrupt => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "CRYPTO_CORRUPT",
                    message: "stored record failed authenticated decryption".to_string(),
                },
            ),
            RelayError::StoreUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "STORE_UNAVAILABLE",
                    message: "key/value store unavailable".to_string(),
                },
            ),
            RelayError::StreamWriteFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "STREAM_WRITE_FAILED",
                    message: "write to edge stream failed".to_string(),
                },
            ),
            RelayError::PushDeliveryFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "PUSH_DELIVERY_FAILED",
                    message: "push delivery to edge failed after retries".to_string(),
                },
            ),
            RelayError::RefreshNotImplemented => (
                StatusCode::NOT_IMPLEMENTED,
                ApiErrorObject {
                    code: "REFRESH_NOT_IMPLEMENTED",
                    message: "credential refresh is not implemented; re-authorize the workspace"
                        .to_string(),
                },
            ),
            RelayError::UpstreamStatus(code) => (
                *code,
                ApiErrorObject {
                    code: "UPSTREAM_ERROR",
                    message: "upstream service error".to_string(),
                },
            ),
            RelayError::Reqwest(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorObject {
                    code: "UPSTREAM_ERROR",
                    message: "upstream service error".to_string(),
                },
            ),
            RelayError::Json(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorObject {
                    code: "PROCESSING_ERROR",
                    message: "Processing error".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorBody { error: body })).into_response()
    }
}

#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorObject,
}
