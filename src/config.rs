//! Auth configuration and shared per-process state.

use crate::cookie::CookieCodec;
use crate::password::HashParams;

const DEFAULT_COOKIE_NAME: &str = "cookie";
const DEFAULT_SALT_LENGTH: usize = 16;
const DEFAULT_REMEMBER_TTL_DAYS: i64 = 365;

/// Argon2 refuses salts shorter than this; [`AuthConfig::with_salt_length`]
/// clamps to it.
pub const MIN_SALT_LENGTH: usize = 8;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    cookie_name: String,
    salt_length: usize,
    remember_ttl_days: i64,
    secure_cookies: bool,
    hash_params: HashParams,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            salt_length: DEFAULT_SALT_LENGTH,
            remember_ttl_days: DEFAULT_REMEMBER_TTL_DAYS,
            secure_cookies: false,
            hash_params: HashParams::default(),
        }
    }

    #[must_use]
    pub fn with_cookie_name(mut self, name: String) -> Self {
        self.cookie_name = name;
        self
    }

    /// Salt length for new signups. Existing users keep the salt they were
    /// created with, whatever its length.
    #[must_use]
    pub fn with_salt_length(mut self, length: usize) -> Self {
        self.salt_length = length.max(MIN_SALT_LENGTH);
        self
    }

    #[must_use]
    pub fn with_remember_ttl_days(mut self, days: i64) -> Self {
        self.remember_ttl_days = days;
        self
    }

    /// Only set this when the tracker is served over HTTPS.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_hash_params(mut self, params: HashParams) -> Self {
        self.hash_params = params;
        self
    }

    #[must_use]
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    #[must_use]
    pub fn salt_length(&self) -> usize {
        self.salt_length
    }

    #[must_use]
    pub fn remember_ttl_days(&self) -> i64 {
        self.remember_ttl_days
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    #[must_use]
    pub fn hash_params(&self) -> &HashParams {
        &self.hash_params
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for the auth facade: configuration plus the cookie codec.
///
/// Read-only after construction, so a single instance can serve every request
/// concurrently.
pub struct AuthState {
    config: AuthConfig,
    codec: CookieCodec,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, codec: CookieCodec) -> Self {
        Self { config, codec }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &CookieCodec {
        &self.codec
    }
}
