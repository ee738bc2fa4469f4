use std::collections::HashSet;

use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{is_unique_violation, ApiError};

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, first_name, last_name, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, first_name, last_name, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new user with a hashed password. Uniqueness races are
    /// caught here and reported as field errors.
    pub async fn create(
        db: &PgPool,
        email: &str,
        username: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, email, username, first_name, last_name, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                let constraint = e
                    .as_database_error()
                    .and_then(|db_err| db_err.constraint().map(str::to_string));
                match constraint.as_deref() {
                    Some("users_email_key") => {
                        ApiError::field("email", "user with this email already exists")
                    }
                    Some("users_username_key") => {
                        ApiError::field("username", "user with this username already exists")
                    }
                    _ => ApiError::validation("user already exists"),
                }
            } else {
                e.into()
            }
        })
    }

    pub async fn list(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<User>, ApiError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, first_name, last_name, password_hash, created_at
            FROM users
            ORDER BY username
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn set_password(db: &PgPool, id: Uuid, password_hash: &str) -> Result<(), ApiError> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }
}

// ---- Subscriptions ----

pub async fn subscribe(db: &PgPool, user_id: Uuid, target_id: Uuid) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO subscriptions (user_id, target_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(target_id)
        .execute(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::validation("already subscribed to this user")
            } else {
                e.into()
            }
        })?;
    Ok(())
}

/// Returns the number of removed rows; zero means the pair did not exist.
pub async fn unsubscribe(db: &PgPool, user_id: Uuid, target_id: Uuid) -> Result<u64, ApiError> {
    let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND target_id = $2")
        .bind(user_id)
        .bind(target_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn is_subscribed(
    db: &PgPool,
    viewer: Option<Uuid>,
    target_id: Uuid,
) -> Result<bool, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(false);
    };
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1 AND target_id = $2)",
    )
    .bind(viewer)
    .bind(target_id)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

/// Subset of `targets` the viewer is subscribed to, fetched in one query.
pub async fn subscribed_targets(
    db: &PgPool,
    viewer: Option<Uuid>,
    targets: &[Uuid],
) -> Result<HashSet<Uuid>, ApiError> {
    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    if targets.is_empty() {
        return Ok(HashSet::new());
    }
    let rows: Vec<Uuid> = sqlx::query_scalar(
        "SELECT target_id FROM subscriptions WHERE user_id = $1 AND target_id = ANY($2)",
    )
    .bind(viewer)
    .bind(targets.to_vec())
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().collect())
}

/// Users the given user is subscribed to, newest subscription first.
pub async fn list_subscription_targets(
    db: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<User>, ApiError> {
    let rows = sqlx::query_as::<_, User>(
        r#"
        SELECT u.id, u.email, u.username, u.first_name, u.last_name,
               u.password_hash, u.created_at
        FROM subscriptions s
        JOIN users u ON u.id = s.target_id
        WHERE s.user_id = $1
        ORDER BY s.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
