//! Credential store: user rows in Postgres.
//!
//! Callers pass emails already lowercased (the facade normalizes once); the
//! store persists exactly what it receives. User rows are created at signup
//! and only ever have their password hash updated afterwards; this subsystem
//! never deletes them.

use anyhow::{Context, Result};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};
use tracing::Instrument;
use uuid::Uuid;

/// A user row as persisted. `password_hash` is an opaque digest; only the
/// password hasher knows how to produce or check it.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Vec<u8>,
    pub salt: String,
}

/// Outcome when inserting a new user.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(Uuid),
    DuplicateEmail,
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        salt: row.get("salt"),
    }
}

/// Insert a new user. The unique constraint on `email` is the single
/// authority on duplicates; there is no read-then-insert race.
pub async fn create_user(
    pool: &PgPool,
    email: &str,
    password_hash: &[u8],
    salt: &str,
) -> Result<CreateUserOutcome> {
    let query = "INSERT INTO users (id, email, password_hash, salt) VALUES ($1, $2, $3, $4)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let id = Uuid::new_v4();
    let result = sqlx::query(query)
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .bind(salt)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(CreateUserOutcome::Created(id)),
        Err(err) if is_unique_violation(&err) => Ok(CreateUserOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, password_hash, salt FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub async fn find_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, password_hash, salt FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Load and lock a user row inside a transaction. The password-change flow
/// holds this lock across verify-then-update so concurrent changes serialize.
pub(crate) async fn find_by_id_for_update(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<Option<UserRecord>> {
    let query = "SELECT id, email, password_hash, salt FROM users WHERE id = $1 FOR UPDATE";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lock user row")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Replace a user's password hash. Returns whether a row was updated.
pub async fn update_password_hash(pool: &PgPool, user_id: Uuid, new_hash: &[u8]) -> Result<bool> {
    let query = "UPDATE users SET password_hash = $1 WHERE id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(new_hash)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_password_hash_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    new_hash: &[u8],
) -> Result<bool> {
    let query = "UPDATE users SET password_hash = $1 WHERE id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(new_hash)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;
    Ok(result.rows_affected() > 0)
}
