use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Error taxonomy for the HTTP surface.
///
/// Every variant maps to exactly one status code; the body is either
/// `{"error": <message>}` or, for not-found, empty.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed, missing, or disallowed field.
    #[error("{0}")]
    Validation(String),

    /// Failed login. The message is the same for unknown email and wrong
    /// password so error text cannot be used to enumerate accounts.
    #[error("Unable to login.")]
    BadCredentials,

    /// Missing/malformed/revoked bearer token. Always the same generic
    /// message, no internal detail.
    #[error("Please authenticate.")]
    Unauthenticated,

    /// Missing resource, or a resource owned by someone else. The two cases
    /// are indistinguishable to the caller.
    #[error("not found")]
    NotFound,

    /// Unexpected store or service failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            ApiError::BadCredentials => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Unable to login." })),
            )
                .into_response(),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Please authenticate." })),
            )
                .into_response(),
            ApiError::NotFound => StatusCode::NOT_FOUND.into_response(),
            ApiError::Internal(e) => {
                error!(error = %e, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }
}

/// Failure of a store-write operation. Validation runs inside the write's
/// contract, so the store distinguishes bad input from a broken backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Create-path mapping: validation is the caller's fault, everything else is
/// a server error. Update handlers deliberately do NOT use this — store-level
/// validation failures on PATCH surface as 500s.
impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(msg) => ApiError::Validation(msg),
            StoreError::Database(e) => ApiError::Internal(e.into()),
            StoreError::Internal(e) => ApiError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::validation("bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::BadCredentials.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_has_empty_body() {
        let resp = ApiError::NotFound.into_response();
        // 404 carries no error payload, so existence cannot be inferred
        assert!(resp
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .is_none());
    }
}
