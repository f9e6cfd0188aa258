use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::error::StoreError;
use crate::tasks::repo::Task;

/// User record. JSON serialization omits the password hash, the token list,
/// and the avatar bytes.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub age: i32,
    #[serde(skip_serializing)]
    pub tokens: Vec<String>,
    #[serde(skip_serializing)]
    pub avatar: Option<Vec<u8>>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated input for a new user row.
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: Option<i32>,
}

/// Partial update; only present fields are written.
#[derive(Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub age: Option<i32>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_name(name: &str) -> Result<String, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("Name is required.".into()));
    }
    Ok(name.to_string())
}

fn normalize_email(email: &str) -> Result<String, StoreError> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(StoreError::Validation("Email is invalid.".into()));
    }
    Ok(email)
}

fn validate_age(age: i32) -> Result<i32, StoreError> {
    if age < 0 {
        return Err(StoreError::Validation(
            "Age must be a positive number.".into(),
        ));
    }
    Ok(age)
}

fn hash_valid_password(plain: &str) -> Result<String, StoreError> {
    validate_password(plain).map_err(StoreError::Validation)?;
    Ok(hash_password(plain)?)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

const USER_COLUMNS: &str =
    "id, name, email, password_hash, age, tokens, avatar, created_at, updated_at";

impl User {
    /// Validate every field, hash the password, insert. Field validation and
    /// hashing are part of the store-write contract so ordering and failure
    /// points stay visible.
    pub async fn create(db: &PgPool, new: NewUser) -> Result<User, StoreError> {
        let name = validate_name(&new.name)?;
        let email = normalize_email(&new.email)?;
        let age = validate_age(new.age.unwrap_or(0))?;
        let password_hash = hash_valid_password(&new.password)?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, age)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&name)
        .bind(&email)
        .bind(&password_hash)
        .bind(age)
        .fetch_one(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Validation("Email is already in use.".into())
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(user)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE email = $1"#
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Look up by email and check the password. Unknown email and wrong
    /// password both come back as `None` so callers cannot tell them apart.
    pub async fn find_by_credentials(
        db: &PgPool,
        email: &str,
        password: &str,
    ) -> anyhow::Result<Option<User>> {
        let email = email.trim().to_lowercase();
        let Some(user) = User::find_by_email(db, &email).await? else {
            return Ok(None);
        };
        if !verify_password(password, &user.password_hash)? {
            return Ok(None);
        }
        Ok(Some(user))
    }

    /// Scoped token resolution: the id must match and the exact token string
    /// must still be in the token list. A logged-out token misses here even
    /// when its signature is still valid.
    pub async fn find_by_id_and_token(
        db: &PgPool,
        id: Uuid,
        token: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND $2 = ANY(tokens)"#
        ))
        .bind(id)
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Sign a fresh session token and append it to the token list. One token
    /// per login event; concurrent sessions each get their own.
    pub async fn issue_token(&mut self, db: &PgPool, keys: &JwtKeys) -> anyhow::Result<String> {
        let token = keys.sign(self.id)?;
        sqlx::query(
            r#"
            UPDATE users
            SET tokens = array_append(tokens, $2), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&token)
        .execute(db)
        .await?;
        self.tokens.push(token.clone());
        Ok(token)
    }

    pub async fn revoke_token(&mut self, db: &PgPool, token: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET tokens = array_remove(tokens, $2), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(token)
        .execute(db)
        .await?;
        self.tokens.retain(|t| t != token);
        Ok(())
    }

    pub async fn revoke_all_tokens(&mut self, db: &PgPool) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET tokens = '{}', updated_at = now() WHERE id = $1"#)
            .bind(self.id)
            .execute(db)
            .await?;
        self.tokens.clear();
        Ok(())
    }

    /// Apply a partial update. Changed fields are re-validated and a changed
    /// password is re-hashed before the write.
    pub async fn apply_patch(&mut self, db: &PgPool, patch: UserPatch) -> Result<(), StoreError> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let email = patch.email.as_deref().map(normalize_email).transpose()?;
        let age = patch.age.map(validate_age).transpose()?;
        let password_hash = patch
            .password
            .as_deref()
            .map(hash_valid_password)
            .transpose()?;

        let updated = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                age = COALESCE($5, age),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(self.id)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(age)
        .fetch_one(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Validation("Email is already in use.".into())
            } else {
                StoreError::Database(e)
            }
        })?;
        *self = updated;
        Ok(())
    }

    /// Delete the account and every task it owns. Two statements in one
    /// transaction; the task sweep runs first.
    pub async fn delete(&self, db: &PgPool) -> anyhow::Result<()> {
        let mut tx = db.begin().await?;
        Task::delete_all_for_owner(&mut tx, self.id).await?;
        sqlx::query(r#"DELETE FROM users WHERE id = $1"#)
            .bind(self.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Overwrite (or clear, with `None`) the stored avatar PNG.
    pub async fn set_avatar(&mut self, db: &PgPool, png: Option<Vec<u8>>) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET avatar = $2, updated_at = now() WHERE id = $1"#)
            .bind(self.id)
            .bind(&png)
            .execute(db)
            .await?;
        self.avatar = png;
        Ok(())
    }

    /// Public avatar lookup by user id; `None` when the user does not exist
    /// or has no avatar.
    pub async fn find_avatar(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Vec<u8>>> {
        let row: Option<(Option<Vec<u8>>,)> =
            sqlx::query_as(r#"SELECT avatar FROM users WHERE id = $1"#)
                .bind(id)
                .fetch_optional(db)
                .await?;
        Ok(row.and_then(|(avatar,)| avatar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Mike".into(),
            email: "mike@example.com".into(),
            password_hash: "$argon2id$fake".into(),
            age: 30,
            tokens: vec!["tok-a".into(), "tok-b".into()],
            avatar: Some(vec![1, 2, 3]),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn serialization_strips_secrets() {
        let json = serde_json::to_value(sample_user()).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("name"));
        assert!(obj.contains_key("email"));
        assert!(obj.contains_key("age"));
        assert!(obj.contains_key("createdAt"));
        assert!(!obj.contains_key("password"));
        assert!(!obj.contains_key("passwordHash"));
        assert!(!obj.contains_key("password_hash"));
        assert!(!obj.contains_key("tokens"));
        assert!(!obj.contains_key("avatar"));
    }

    #[test]
    fn email_grammar() {
        assert!(is_valid_email("mike@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two words@example.com"));
    }

    #[test]
    fn name_is_trimmed_and_required() {
        assert_eq!(validate_name("  Mike  ").unwrap(), "Mike");
        assert!(validate_name("   ").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn email_is_lowercased() {
        assert_eq!(
            normalize_email(" Mike@Example.COM ").unwrap(),
            "mike@example.com"
        );
    }

    #[test]
    fn age_must_be_non_negative() {
        assert_eq!(validate_age(0).unwrap(), 0);
        assert_eq!(validate_age(42).unwrap(), 42);
        assert!(validate_age(-1).is_err());
    }

    #[test]
    fn password_is_validated_before_hashing() {
        assert!(matches!(
            hash_valid_password("short"),
            Err(StoreError::Validation(_))
        ));
        let hash = hash_valid_password("MyV@alidP@ssword123!").unwrap();
        assert_ne!(hash, "MyV@alidP@ssword123!");
    }

    mod store {
        use super::*;
        use crate::state::AppState;
        use axum::extract::FromRef;
        use sqlx::PgPool;

        fn new_user(email: &str) -> NewUser {
            NewUser {
                name: "Mike".into(),
                email: email.into(),
                password: "MyV@alidP@ssword123!".into(),
                age: Some(30),
            }
        }

        fn keys_for(pool: &PgPool) -> JwtKeys {
            let fake = AppState::fake();
            let state = AppState::from_parts(pool.clone(), fake.config.clone(), fake.mailer.clone());
            JwtKeys::from_ref(&state)
        }

        #[sqlx::test]
        async fn stored_password_is_never_the_plaintext(pool: PgPool) {
            let user = User::create(&pool, new_user("mike@example.com"))
                .await
                .expect("create user");
            assert_ne!(user.password_hash, "MyV@alidP@ssword123!");
            assert!(user.password_hash.starts_with("$argon2"));
        }

        #[sqlx::test]
        async fn login_appends_one_token_and_logout_revokes_it(pool: PgPool) {
            let keys = keys_for(&pool);
            let mut user = User::create(&pool, new_user("mike@example.com"))
                .await
                .expect("create user");
            assert!(user.tokens.is_empty());

            let token = user.issue_token(&pool, &keys).await.expect("issue token");
            assert_eq!(user.tokens.len(), 1);

            let resolved = User::find_by_id_and_token(&pool, user.id, &token)
                .await
                .expect("resolve");
            assert_eq!(resolved.expect("session valid").id, user.id);

            user.revoke_token(&pool, &token).await.expect("revoke");
            let resolved = User::find_by_id_and_token(&pool, user.id, &token)
                .await
                .expect("resolve");
            assert!(resolved.is_none());
        }

        #[sqlx::test]
        async fn revoke_all_invalidates_every_issued_token(pool: PgPool) {
            let keys = keys_for(&pool);
            let mut user = User::create(&pool, new_user("mike@example.com"))
                .await
                .expect("create user");

            let first = user.issue_token(&pool, &keys).await.expect("issue token");
            // a later iat makes the second token string distinct
            tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
            let second = user.issue_token(&pool, &keys).await.expect("issue token");
            assert_ne!(first, second);
            assert_eq!(user.tokens.len(), 2);

            user.revoke_all_tokens(&pool).await.expect("revoke all");
            for token in [&first, &second] {
                let resolved = User::find_by_id_and_token(&pool, user.id, token)
                    .await
                    .expect("resolve");
                assert!(resolved.is_none());
            }
        }

        #[sqlx::test]
        async fn find_by_credentials_misses_on_bad_email_and_bad_password(pool: PgPool) {
            User::create(&pool, new_user("mike@example.com"))
                .await
                .expect("create user");

            let hit = User::find_by_credentials(&pool, "mike@example.com", "MyV@alidP@ssword123!")
                .await
                .expect("lookup");
            assert!(hit.is_some());

            let wrong_password = User::find_by_credentials(&pool, "mike@example.com", "not-it-12")
                .await
                .expect("lookup");
            assert!(wrong_password.is_none());

            let unknown_email = User::find_by_credentials(&pool, "ghost@example.com", "whatever99")
                .await
                .expect("lookup");
            assert!(unknown_email.is_none());
        }

        #[sqlx::test]
        async fn duplicate_email_is_a_validation_error(pool: PgPool) {
            User::create(&pool, new_user("mike@example.com"))
                .await
                .expect("first create");
            let err = User::create(&pool, new_user("mike@example.com"))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::Validation(msg) if msg.contains("already in use")));
        }

        #[sqlx::test]
        async fn deleting_a_user_removes_all_owned_tasks(pool: PgPool) {
            let user = User::create(&pool, new_user("mike@example.com"))
                .await
                .expect("create user");
            Task::create(&pool, user.id, "pack boxes", false)
                .await
                .expect("create task");
            Task::create(&pool, user.id, "book movers", true)
                .await
                .expect("create task");

            user.delete(&pool).await.expect("delete account");

            let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE owner = $1")
                .bind(user.id)
                .fetch_one(&pool)
                .await
                .expect("count");
            assert_eq!(remaining, 0);
            assert!(User::find_by_email(&pool, "mike@example.com")
                .await
                .expect("lookup")
                .is_none());
        }
    }
}
