use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::User;

/// Resolved identity for a request. Carries the user record and the exact
/// token the request authenticated with, so logout can revoke just that
/// session.
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

/// Bearer-token resolution. Every failure mode — missing header, malformed
/// scheme, bad signature, expired token, revoked token, unknown user — maps
/// to the same generic 401.
#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthenticated)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Unauthenticated
        })?;

        // Signature validity is not enough: the token must still be in the
        // user's token list.
        let user = User::find_by_id_and_token(&state.db, claims.sub, token)
            .await
            .map_err(|e| {
                warn!(error = %e, "token resolution failed");
                ApiError::Unauthenticated
            })?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "token revoked or user gone");
                ApiError::Unauthenticated
            })?;

        Ok(CurrentUser {
            user,
            token: token.to_string(),
        })
    }
}
