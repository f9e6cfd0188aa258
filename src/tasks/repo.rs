use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub completed: bool,
    pub owner: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Sortable columns for task listings. Client-supplied field names are
/// resolved against this set; anything else falls back to the default order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Description,
    Completed,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    pub fn parse(name: &str) -> Option<SortField> {
        match name {
            "description" => Some(SortField::Description),
            "completed" => Some(SortField::Completed),
            "createdAt" => Some(SortField::CreatedAt),
            "updatedAt" => Some(SortField::UpdatedAt),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortField::Description => "description",
            SortField::Completed => "completed",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

/// Listing options, always scoped to one owner by the queries below.
#[derive(Debug, Default)]
pub struct TaskFilter {
    pub completed: Option<bool>,
    pub sort: Option<(SortField, bool)>, // (field, descending)
    pub limit: Option<i64>,
    pub skip: Option<i64>,
}

fn validate_description(description: &str) -> Result<String, StoreError> {
    let description = description.trim();
    if description.is_empty() {
        return Err(StoreError::Validation("Description is required.".into()));
    }
    Ok(description.to_string())
}

const TASK_COLUMNS: &str = "id, description, completed, owner, created_at, updated_at";

impl Task {
    pub async fn create(
        db: &PgPool,
        owner: Uuid,
        description: &str,
        completed: bool,
    ) -> Result<Task, StoreError> {
        let description = validate_description(description)?;
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (description, completed, owner)
            VALUES ($1, $2, $3)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&description)
        .bind(completed)
        .bind(owner)
        .fetch_one(db)
        .await?;
        Ok(task)
    }

    pub async fn list_by_owner(
        db: &PgPool,
        owner: Uuid,
        filter: &TaskFilter,
    ) -> anyhow::Result<Vec<Task>> {
        // The ORDER BY column comes from the SortField whitelist, never from
        // raw client input.
        let (column, descending) = filter
            .sort
            .map(|(f, desc)| (f.column(), desc))
            .unwrap_or(("created_at", false));
        let direction = if descending { "DESC" } else { "ASC" };

        let sql = format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE owner = $1 AND ($2::boolean IS NULL OR completed = $2)
            ORDER BY {column} {direction}
            LIMIT $3 OFFSET $4
            "#
        );
        let tasks = sqlx::query_as::<_, Task>(&sql)
            .bind(owner)
            .bind(filter.completed)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(db)
            .await?;
        Ok(tasks)
    }

    /// Scoped fetch. A task owned by someone else misses exactly like a task
    /// that does not exist.
    pub async fn find_by_id_and_owner(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
    ) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND owner = $2"#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await?;
        Ok(task)
    }

    /// Re-validates the description on change before writing.
    pub async fn update(
        &mut self,
        db: &PgPool,
        description: Option<String>,
        completed: Option<bool>,
    ) -> Result<(), StoreError> {
        let description = description
            .as_deref()
            .map(validate_description)
            .transpose()?;

        let updated = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET description = COALESCE($3, description),
                completed = COALESCE($4, completed),
                updated_at = now()
            WHERE id = $1 AND owner = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(self.id)
        .bind(self.owner)
        .bind(description)
        .bind(completed)
        .fetch_one(db)
        .await?;
        *self = updated;
        Ok(())
    }

    /// Atomic scoped find-and-remove; `None` when nothing matched.
    pub async fn delete_by_id_and_owner(
        db: &PgPool,
        id: Uuid,
        owner: Uuid,
    ) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"DELETE FROM tasks WHERE id = $1 AND owner = $2 RETURNING {TASK_COLUMNS}"#
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(db)
        .await?;
        Ok(task)
    }

    /// Cascade step of account deletion; runs inside the caller's
    /// transaction before the user row goes away.
    pub async fn delete_all_for_owner(
        tx: &mut Transaction<'_, Postgres>,
        owner: Uuid,
    ) -> anyhow::Result<()> {
        sqlx::query(r#"DELETE FROM tasks WHERE owner = $1"#)
            .bind(owner)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
