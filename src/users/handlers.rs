use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{CurrentUser, JwtKeys},
    email::{send_cancellation_email, send_welcome_email},
    error::ApiError,
    state::AppState,
    users::avatar::{has_allowed_extension, process_avatar, MAX_AVATAR_BYTES},
    users::dto::{
        AuthResponse, LoginRequest, MessageResponse, SignupRequest, UpdateUserRequest,
        USER_UPDATE_FIELDS,
    },
    users::repo::{NewUser, User, UserPatch},
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(signup))
        .route("/users/login", post(login))
        .route("/users/:id/avatar", get(get_avatar))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/users/logout", post(logout))
        .route("/users/logoutAll", post(logout_all))
        .route("/users/me", get(get_me).patch(update_me).delete(delete_me))
}

pub fn avatar_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me/avatar", post(upload_avatar).delete(delete_avatar))
        // multipart framing overhead on top of the 1 MB file ceiling
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
}

#[instrument(skip(state, payload))]
async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let mut user = User::create(
        &state.db,
        NewUser {
            name: payload.name,
            email: payload.email,
            password: payload.password,
            age: payload.age,
        },
    )
    .await?;

    send_welcome_email(&state, &user.name);

    let keys = JwtKeys::from_ref(&state);
    let token = user.issue_token(&state.db, &keys).await?;

    info!(user_id = %user.id, email = %user.email, "user signed up");
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let mut user = User::find_by_credentials(&state.db, &payload.email, &payload.password)
        .await?
        .ok_or_else(|| {
            warn!("login failed");
            ApiError::BadCredentials
        })?;

    let keys = JwtKeys::from_ref(&state);
    let token = user.issue_token(&state.db, &keys).await?;

    info!(user_id = %user.id, "user logged in");
    Ok(Json(AuthResponse { user, token }))
}

/// Revokes only the token the request authenticated with; other sessions
/// stay live.
#[instrument(skip(state, current))]
async fn logout(
    State(state): State<AppState>,
    mut current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    current.user.revoke_token(&state.db, &current.token).await?;
    info!(user_id = %current.user.id, "session logged out");
    Ok(StatusCode::OK)
}

#[instrument(skip(state, current))]
async fn logout_all(
    State(state): State<AppState>,
    mut current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    current.user.revoke_all_tokens(&state.db).await?;
    info!(user_id = %current.user.id, "all sessions logged out");
    Ok(StatusCode::OK)
}

#[instrument(skip(current))]
async fn get_me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

pub(crate) fn check_allowed_fields(
    body: &serde_json::Value,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(obj) = body.as_object() else {
        return Err(ApiError::validation("Invalid updates"));
    };
    if obj.keys().any(|k| !allowed.contains(&k.as_str())) {
        return Err(ApiError::validation("Invalid updates"));
    }
    Ok(())
}

#[instrument(skip(state, current, body))]
async fn update_me(
    State(state): State<AppState>,
    mut current: CurrentUser,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<User>, ApiError> {
    // Allow-list check happens before any store call.
    check_allowed_fields(&body, USER_UPDATE_FIELDS)?;

    let patch: UpdateUserRequest =
        serde_json::from_value(body).map_err(|e| ApiError::validation(e.to_string()))?;

    // Store-level validation failures here are propagated as server errors,
    // unlike the signup path.
    current
        .user
        .apply_patch(
            &state.db,
            UserPatch {
                name: patch.name,
                email: patch.email,
                password: patch.password,
                age: patch.age,
            },
        )
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok(Json(current.user))
}

#[instrument(skip(state, current))]
async fn delete_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<User>, ApiError> {
    current.user.delete(&state.db).await?;

    send_cancellation_email(&state, &current.user.name);

    info!(user_id = %current.user.id, "account deleted");
    Ok(Json(current.user))
}

#[instrument(skip(state, current, multipart))]
async fn upload_avatar(
    State(state): State<AppState>,
    mut current: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut upload: Option<Bytes> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("avatar") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if !has_allowed_extension(&filename) {
            return Err(ApiError::validation(
                "File type must be an image (jpg,jpeg,png).",
            ));
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(e.to_string()))?;
        if data.len() > MAX_AVATAR_BYTES {
            return Err(ApiError::validation("File too large."));
        }
        upload = Some(data);
        break;
    }

    let bytes = upload.ok_or_else(|| ApiError::validation("Field \"avatar\" is required."))?;
    let png = process_avatar(&bytes).map_err(ApiError::Validation)?;

    current.user.set_avatar(&state.db, Some(png)).await?;
    info!(user_id = %current.user.id, "avatar saved");
    Ok(Json(MessageResponse {
        message: "Avatar saved.",
    }))
}

#[instrument(skip(state, current))]
async fn delete_avatar(
    State(state): State<AppState>,
    mut current: CurrentUser,
) -> Result<Json<MessageResponse>, ApiError> {
    current.user.set_avatar(&state.db, None).await?;
    info!(user_id = %current.user.id, "avatar deleted");
    Ok(Json(MessageResponse {
        message: "Avatar deleted.",
    }))
}

/// Public: anyone holding a user id can fetch that user's avatar.
#[instrument(skip(state))]
async fn get_avatar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(HeaderMap, Vec<u8>), ApiError> {
    let avatar = User::find_avatar(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    Ok((headers, avatar))
}
