//! # Penny Auth (Authentication & Session Core)
//!
//! `penny-auth` is the authentication and session-management core of the
//! Penny personal-finance tracker. It owns credential storage, password
//! derivation, signed session cookies, and the server-side session registry.
//! The tracker's CRUD, report, and template layers consume it only through
//! the facade operations in [`service`].
//!
//! ## Identity Resolution
//!
//! Every request's cookie is decoded by the [`cookie`] codec and its token
//! resolved through the [`registry`]; there is no in-process caching, so
//! deleting a session row revokes that device on its very next request.
//!
//! ## Sessions
//!
//! One user holds many sessions (one per device). The registry supports
//! listing them oldest-first and terminating any of them remotely, with an
//! ownership check that holds even against forged tokens.
//!
//! ## Cookie Signing Key
//!
//! The codec's key is explicit state injected at startup
//! ([`cookie::CookieCodec::from_key`]) or generated per process
//! ([`cookie::CookieCodec::generate`]).
//!
//! > **Warning:** Rotating or losing the key invalidates every outstanding
//! > cookie; affected clients are logged out.

pub mod config;
pub mod cookie;
pub mod error;
pub mod password;
pub mod registry;
pub mod service;
pub mod store;

pub use config::{AuthConfig, AuthState};
pub use cookie::{CookieCodec, SessionTicket};
pub use error::AuthError;
pub use registry::Session;
pub use service::{Identity, LoginSession};
