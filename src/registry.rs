//! Session registry: the server-side table of live sessions.
//!
//! The registry exclusively owns session rows; the facade never touches them
//! except through these operations. Deleting a row revokes the session on the
//! very next request, since identity resolution always re-reads the store.

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use crate::store::is_unique_violation;

/// Longest client IP stored per session; anything longer is truncated.
pub const MAX_CLIENT_IP_LENGTH: usize = 128;
/// Longest user-agent descriptor stored per session.
pub const MAX_USER_AGENT_LENGTH: usize = 256;

const TOKEN_BYTES: usize = 32;
const CREATE_ATTEMPTS: usize = 3;

/// One device's session, as shown on the "your active sessions" view.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: Uuid,
    pub initiated_at: DateTime<Utc>,
    pub client_ip: String,
    pub user_agent: String,
    pub remember: bool,
}

/// Outcome of an owner-checked session delete.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Forbidden,
    NotFound,
}

/// Generate a fresh opaque session token.
fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Truncate on a character boundary. Clients control both values, so the
/// bound has to hold against arbitrary (including multi-byte) input.
fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((index, _)) => &value[..index],
        None => value,
    }
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        token: row.get("token"),
        user_id: row.get("user_id"),
        initiated_at: row.get("initiated_at"),
        client_ip: row.get("ip"),
        user_agent: row.get("user_agent"),
        remember: row.get("remember"),
    }
}

/// Create a session row for a user who just logged in.
///
/// Token collisions are vanishingly rare but the unique constraint is still
/// honored: a colliding insert is retried with a fresh token.
pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    client_ip: &str,
    user_agent: &str,
    remember: bool,
) -> Result<Session> {
    let client_ip = truncate_chars(client_ip, MAX_CLIENT_IP_LENGTH);
    let user_agent = truncate_chars(user_agent, MAX_USER_AGENT_LENGTH);
    let query = r"
        INSERT INTO sessions (token, user_id, initiated_at, ip, user_agent, remember)
        VALUES ($1, $2, NOW(), $3, $4, $5)
        RETURNING initiated_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..CREATE_ATTEMPTS {
        let token = generate_token()?;
        let result = sqlx::query(query)
            .bind(&token)
            .bind(user_id)
            .bind(client_ip)
            .bind(user_agent)
            .bind(remember)
            .fetch_one(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(row) => {
                return Ok(Session {
                    token,
                    user_id,
                    initiated_at: row.get("initiated_at"),
                    client_ip: client_ip.to_string(),
                    user_agent: user_agent.to_string(),
                    remember,
                })
            }
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate a unique session token"))
}

/// Resolve a token to its owning user. The hottest operation in the crate:
/// every authenticated request goes through it.
///
/// Joining `users` means a session whose owner vanished reads as `None`:
/// an authentication failure, not a crash.
pub async fn find_user_id_by_token(pool: &PgPool, token: &str) -> Result<Option<Uuid>> {
    let query = r"
        SELECT sessions.user_id
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.token = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session by token")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// All of a user's sessions, oldest first. Same-second logins tie-break on
/// token so the sessions view renders deterministically.
pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Session>> {
    let query = r"
        SELECT token, user_id, initiated_at, ip, user_agent, remember
        FROM sessions
        WHERE user_id = $1
        ORDER BY initiated_at, token
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list sessions")?;
    Ok(rows.iter().map(session_from_row).collect())
}

/// Delete a session by token without an ownership check. Used by logout,
/// where the token comes out of the caller's own authenticated cookie.
/// Idempotent: deleting an already-gone session is fine.
pub async fn delete(pool: &PgPool, token: &str) -> Result<()> {
    let query = "DELETE FROM sessions WHERE token = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

/// Delete a session only if it belongs to `requesting_user_id`.
///
/// Tokens are unguessable, but the ownership check must hold regardless: one
/// user can never terminate another's session, whatever token value they
/// present.
pub async fn delete_by_token(
    pool: &PgPool,
    token: &str,
    requesting_user_id: Uuid,
) -> Result<DeleteOutcome> {
    let mut tx = pool
        .begin()
        .await
        .context("begin session delete transaction")?;

    let query = "SELECT user_id FROM sessions WHERE token = $1 FOR UPDATE";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup session owner")?;

    let Some(row) = row else {
        tx.commit().await.context("commit session delete noop")?;
        return Ok(DeleteOutcome::NotFound);
    };

    let owner: Uuid = row.get("user_id");
    if owner != requesting_user_id {
        let _ = tx.rollback().await;
        return Ok(DeleteOutcome::Forbidden);
    }

    // The predicate repeats the owner check so the delete stays safe even if
    // this ever runs outside the locking select.
    let query = "DELETE FROM sessions WHERE token = $1 AND user_id = $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token)
        .bind(requesting_user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete session")?;

    tx.commit().await.context("commit session delete")?;
    Ok(DeleteOutcome::Deleted)
}
