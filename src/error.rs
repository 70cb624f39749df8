//! Error taxonomy for the auth subsystem.
//!
//! Credential and session mismatches are ordinary control flow and get their
//! own variants; only backing-store trouble carries an underlying error. The
//! presentation layer receives failures as small integer codes (see
//! [`AuthError::code`]) and maps them to localized messages itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email or wrong password. Deliberately not distinguished so the
    /// login form cannot be used to discover which emails have accounts.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Signup collision on the unique email column.
    #[error("email is already registered")]
    DuplicateEmail,

    /// The session exists but belongs to another user.
    #[error("session belongs to another user")]
    Forbidden,

    /// No user or session matched the given identifier.
    #[error("no such user or session")]
    NotFound,

    /// The backing store (or another subsystem dependency) failed. The cause
    /// is logged before this is returned; it is never folded into a success.
    #[error("backing store unavailable")]
    StoreUnavailable(anyhow::Error),
}

impl AuthError {
    /// The code the presentation layer appends to the redirect URL.
    ///
    /// `2` and `8` are inherited from the tracker's original query-string
    /// protocol; `7` was its catch-all password-change failure and stays
    /// reserved. The remaining codes are new.
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::InvalidCredentials => 2,
            Self::DuplicateEmail => 8,
            Self::Forbidden => 9,
            Self::NotFound => 10,
            Self::StoreUnavailable(_) => 11,
        }
    }
}
