//! Auth facade: the only seam the presentation layer touches.
//!
//! Flow Overview: an incoming request carries an opaque cookie; the codec
//! decodes it to a session ticket, the registry resolves the ticket's token
//! to the owning user, and the request becomes [`Identity::Authenticated`].
//! Login runs the reverse direction: credential store plus hasher check the
//! password, the registry mints a session row, and the codec seals the token
//! into a `Set-Cookie` value.
//!
//! Failures the user caused (wrong password, duplicate email, someone else's
//! session) come back as typed [`AuthError`] variants; store trouble is
//! logged and surfaced as [`AuthError::StoreUnavailable`], never silently
//! turned into a success or an anonymous identity.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::AuthState;
use crate::cookie::{clear_cookie, session_cookie, SessionTicket};
use crate::error::AuthError;
use crate::password::{derive, generate_salt, verify, DIGEST_LENGTH};
use crate::registry::{self, DeleteOutcome, Session};
use crate::store::{self, CreateUserOutcome};

/// Identity resolved for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(Uuid),
}

/// A freshly created session plus the cookie that proves it.
#[derive(Debug)]
pub struct LoginSession {
    pub session: Session,
    pub set_cookie: HeaderValue,
}

// Burned on unknown emails so they cost the same as a wrong password.
const DECOY_SALT: &str = "penny-decoy-salt";

/// Authenticate a password and open a new session.
///
/// Unknown email and wrong password are deliberately the same error; the
/// unknown-email path still pays for one derivation so the two are not
/// timing-distinguishable either.
pub async fn login(
    pool: &PgPool,
    state: &AuthState,
    email: &str,
    password: &str,
    remember: bool,
    client_ip: &str,
    user_agent: &str,
) -> Result<LoginSession, AuthError> {
    let email = normalize_email(email);
    let user = store::find_by_email(pool, &email)
        .await
        .map_err(store_failure)?;
    let Some(user) = user else {
        let _ = verify(
            password,
            DECOY_SALT,
            &[0u8; DIGEST_LENGTH],
            state.config().hash_params(),
        );
        return Err(AuthError::InvalidCredentials);
    };

    let matches = verify(
        password,
        &user.salt,
        &user.password_hash,
        state.config().hash_params(),
    )
    .map_err(store_failure)?;
    if !matches {
        info!(user_id = %user.id, "rejected login: wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let session = registry::create(pool, user.id, client_ip, user_agent, remember)
        .await
        .map_err(store_failure)?;
    let encoded = state
        .codec()
        .encode(&SessionTicket {
            token: session.token.clone(),
        })
        .map_err(store_failure)?;
    let set_cookie = session_cookie(state.config(), &encoded, remember)
        .map_err(|err| store_failure(anyhow::Error::new(err).context("build session cookie")))?;

    info!(user_id = %user.id, remember, "user logged in");
    Ok(LoginSession {
        session,
        set_cookie,
    })
}

/// Register a new user. Never opens a session: the caller redirects to the
/// login form afterwards.
pub async fn signup(
    pool: &PgPool,
    state: &AuthState,
    email: &str,
    password: &str,
) -> Result<Uuid, AuthError> {
    let email = normalize_email(email);
    let salt = generate_salt(state.config().salt_length());
    let digest = derive(password, &salt, state.config().hash_params()).map_err(store_failure)?;

    match store::create_user(pool, &email, &digest, &salt)
        .await
        .map_err(store_failure)?
    {
        CreateUserOutcome::Created(id) => {
            info!(user_id = %id, "new user signed up");
            Ok(id)
        }
        CreateUserOutcome::DuplicateEmail => Err(AuthError::DuplicateEmail),
    }
}

/// Resolve the request's identity from its cookie. Pure read, no side
/// effects; runs on every request including anonymous ones.
///
/// A missing, malformed, or forged cookie and an unknown token all resolve to
/// [`Identity::Anonymous`], never to some default authenticated identity.
pub async fn resolve_identity(
    pool: &PgPool,
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<Identity, AuthError> {
    let Some(value) = extract_cookie_value(headers, state.config().cookie_name()) else {
        return Ok(Identity::Anonymous);
    };
    let Ok(ticket) = state.codec().decode(&value) else {
        return Ok(Identity::Anonymous);
    };
    match registry::find_user_id_by_token(pool, &ticket.token)
        .await
        .map_err(store_failure)?
    {
        Some(user_id) => Ok(Identity::Authenticated(user_id)),
        None => Ok(Identity::Anonymous),
    }
}

/// Log the request's session out: revoke the server-side row, then hand back
/// the clearing `Set-Cookie` value.
///
/// Clearing only the cookie would leave a captured copy of it replayable;
/// the registry row has to go too. [`crate::cookie::clear_cookie`] is public
/// so presentation code can still clear the client side when this errors.
pub async fn logout(
    pool: &PgPool,
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<HeaderValue, AuthError> {
    if let Some(value) = extract_cookie_value(headers, state.config().cookie_name()) {
        if let Ok(ticket) = state.codec().decode(&value) {
            registry::delete(pool, &ticket.token)
                .await
                .map_err(store_failure)?;
        }
    }
    clear_cookie(state.config())
        .map_err(|err| store_failure(anyhow::Error::new(err).context("build clearing cookie")))
}

/// Change a user's password after verifying the old one.
///
/// The whole find-then-compare-then-update runs in one transaction with the
/// user row locked, so two racing changes serialize instead of interleaving.
/// The existing salt is kept; only the hash changes.
pub async fn change_password(
    pool: &PgPool,
    state: &AuthState,
    user_id: Uuid,
    old_password: &str,
    new_password: &str,
) -> Result<(), AuthError> {
    use anyhow::Context;

    let mut tx = pool
        .begin()
        .await
        .context("begin password change transaction")
        .map_err(store_failure)?;

    let user = store::find_by_id_for_update(&mut tx, user_id)
        .await
        .map_err(store_failure)?;
    let Some(user) = user else {
        let _ = tx.rollback().await;
        return Err(AuthError::NotFound);
    };

    let matches = verify(
        old_password,
        &user.salt,
        &user.password_hash,
        state.config().hash_params(),
    )
    .map_err(store_failure)?;
    if !matches {
        let _ = tx.rollback().await;
        info!(user_id = %user.id, "rejected password change: wrong old password");
        return Err(AuthError::InvalidCredentials);
    }

    let digest =
        derive(new_password, &user.salt, state.config().hash_params()).map_err(store_failure)?;
    let updated = store::update_password_hash_in_tx(&mut tx, user_id, &digest)
        .await
        .map_err(store_failure)?;
    if !updated {
        let _ = tx.rollback().await;
        return Err(AuthError::NotFound);
    }

    tx.commit()
        .await
        .context("commit password change")
        .map_err(store_failure)?;
    info!(user_id = %user_id, "password changed");
    Ok(())
}

/// All of a user's live sessions, oldest first, for the sessions view.
pub async fn list_sessions(pool: &PgPool, user_id: Uuid) -> Result<Vec<Session>, AuthError> {
    registry::list_by_user(pool, user_id)
        .await
        .map_err(store_failure)
}

/// Terminate one of the requesting user's other sessions by token.
pub async fn terminate_session(
    pool: &PgPool,
    requesting_user_id: Uuid,
    token: &str,
) -> Result<(), AuthError> {
    match registry::delete_by_token(pool, token, requesting_user_id)
        .await
        .map_err(store_failure)?
    {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::Forbidden => Err(AuthError::Forbidden),
        DeleteOutcome::NotFound => Err(AuthError::NotFound),
    }
}

/// The token of the session the request rode in on, if any. The sessions
/// view uses it to mark the current device in the list.
#[must_use]
pub fn session_token(state: &AuthState, headers: &HeaderMap) -> Option<String> {
    let value = extract_cookie_value(headers, state.config().cookie_name())?;
    state
        .codec()
        .decode(&value)
        .ok()
        .map(|ticket| ticket.token)
}

/// Lowercase only. The tracker never trimmed or Unicode-folded emails, and
/// changing that now would strand existing accounts.
fn normalize_email(email: &str) -> String {
    email.to_lowercase()
}

fn extract_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        // A pair without '=' is malformed; skip it rather than give up on
        // the pairs after it.
        let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
            continue;
        };
        if key.trim() == name {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn store_failure(err: anyhow::Error) -> AuthError {
    error!("auth store failure: {err:#}");
    AuthError::StoreUnavailable(err)
}
