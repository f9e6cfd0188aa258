use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    error::ApiError,
    state::AppState,
    tasks::dto::{CreateTaskRequest, ListTasksQuery, UpdateTaskRequest, TASK_UPDATE_FIELDS},
    tasks::repo::Task,
    users::handlers::check_allowed_fields,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route(
            "/tasks/:id",
            get(get_task).patch(update_task).delete(delete_task),
        )
}

#[instrument(skip(state, current, payload))]
async fn create_task(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = Task::create(
        &state.db,
        current.user.id,
        &payload.description,
        payload.completed,
    )
    .await?;

    info!(task_id = %task.id, owner = %task.owner, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, current))]
async fn list_tasks(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let filter = query.into_filter();
    let tasks = Task::list_by_owner(&state.db, current.user.id, &filter).await?;
    Ok(Json(tasks))
}

#[instrument(skip(state, current))]
async fn get_task(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, ApiError> {
    let task = Task::find_by_id_and_owner(&state.db, id, current.user.id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(task))
}

#[instrument(skip(state, current, body))]
async fn update_task(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<Task>, ApiError> {
    // Allow-list check happens before any store call.
    check_allowed_fields(&body, TASK_UPDATE_FIELDS)?;

    let patch: UpdateTaskRequest =
        serde_json::from_value(body).map_err(|e| ApiError::validation(e.to_string()))?;

    let mut task = Task::find_by_id_and_owner(&state.db, id, current.user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Store-level validation failures (empty description) surface as server
    // errors, matching the profile-update path.
    task.update(&state.db, patch.description, patch.completed)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))?;

    Ok(Json(task))
}

#[instrument(skip(state, current))]
async fn delete_task(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    Task::delete_by_id_and_owner(&state.db, id, current.user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    info!(task_id = %id, owner = %current.user.id, "task deleted");
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_allow_list_accepts_permitted_fields() {
        assert!(check_allowed_fields(
            &json!({ "description": "x", "completed": true }),
            TASK_UPDATE_FIELDS
        )
        .is_ok());
    }

    #[test]
    fn task_allow_list_rejects_owner_and_unknowns() {
        for forbidden in ["owner", "id", "createdAt", "priority"] {
            let body = json!({ forbidden: "x" });
            assert!(check_allowed_fields(&body, TASK_UPDATE_FIELDS).is_err());
        }
    }
}
