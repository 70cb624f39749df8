//! Signed session cookie codec and `Set-Cookie` builders.
//!
//! The cookie value is an HMAC-SHA256-authenticated encoding of a
//! [`SessionTicket`], a fixed shape holding only the opaque session token.
//! Nothing else ever rides in the cookie; in particular no user ids, which
//! would bypass the registry and be unrevocable.
//!
//! The signing key lives for the process lifetime unless the caller injects
//! persisted key material via [`CookieCodec::from_key`]. Rotating or losing
//! the key invalidates every outstanding cookie: affected clients are simply
//! logged out.

use anyhow::{Context, Result};
use axum::http::{header::InvalidHeaderValue, HeaderValue};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::AuthConfig;

type HmacSha256 = Hmac<Sha256>;

/// Key bytes required by the codec.
pub const KEY_LENGTH: usize = 32;

/// The only payload shape a session cookie may carry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    pub token: String,
}

/// A cookie value that failed authentication or parsing.
///
/// Callers must treat this exactly like an absent cookie: the request stays
/// anonymous, never falls back to some default identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidCookie;

pub struct CookieCodec {
    key: [u8; KEY_LENGTH],
}

impl CookieCodec {
    /// Build a codec from caller-provided key material.
    ///
    /// Deployments that want cookies to survive restarts load the key from
    /// their secret store and pass it here; this crate never persists it.
    #[must_use]
    pub const fn from_key(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Generate a fresh signing key. Cookies issued under it die with the
    /// process.
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; KEY_LENGTH];
        OsRng
            .try_fill_bytes(&mut key)
            .context("failed to generate cookie signing key")?;
        Ok(Self::from_key(key))
    }

    fn tag(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    /// Encode a ticket into an opaque cookie value.
    pub fn encode(&self, ticket: &SessionTicket) -> Result<String> {
        let payload = serde_json::to_vec(ticket).context("failed to serialize session ticket")?;
        let tag = self.tag(&payload);
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(tag)
        ))
    }

    /// Decode and authenticate a cookie value.
    ///
    /// Truncation, tampering, or a signature from a different key all come
    /// back as [`InvalidCookie`].
    pub fn decode(&self, value: &str) -> Result<SessionTicket, InvalidCookie> {
        let (payload_b64, tag_b64) = value.split_once('.').ok_or(InvalidCookie)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_b64).map_err(|_| InvalidCookie)?;
        let tag = URL_SAFE_NO_PAD.decode(tag_b64).map_err(|_| InvalidCookie)?;
        let expected = self.tag(&payload);
        if !bool::from(expected.as_slice().ct_eq(&tag)) {
            return Err(InvalidCookie);
        }
        let ticket: SessionTicket = serde_json::from_slice(&payload).map_err(|_| InvalidCookie)?;
        if ticket.token.is_empty() {
            return Err(InvalidCookie);
        }
        Ok(ticket)
    }
}

/// Build the `Set-Cookie` value carrying an encoded session ticket.
///
/// Remembered sessions get an `Expires` a year out (configurable); ephemeral
/// ones carry no `Expires` and die with the browser.
pub fn session_cookie(
    config: &AuthConfig,
    encoded: &str,
    remember: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let mut cookie = format!("{name}={encoded}; Path=/; HttpOnly");
    if remember {
        let expires = Utc::now() + Duration::days(config.remember_ttl_days());
        cookie.push_str(&format!(
            "; Expires={}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build the `Set-Cookie` value that clears the session cookie immediately.
pub fn clear_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    // The old tracker set MaxAge=-1, which serializes to Max-Age=0 on the wire.
    let mut cookie = format!("{}=; Path=/; HttpOnly; Max-Age=0", config.cookie_name());
    if config.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

#[cfg(test)]
mod tests {
    use super::{clear_cookie, session_cookie, CookieCodec, InvalidCookie, SessionTicket};
    use crate::config::AuthConfig;
    use anyhow::{Context, Result};

    fn codec() -> CookieCodec {
        CookieCodec::from_key([7u8; 32])
    }

    fn ticket() -> SessionTicket {
        SessionTicket {
            token: "q5h-JcnqGDSxHw2NeLvWyg".to_string(),
        }
    }

    #[test]
    fn encode_decode_round_trips_the_ticket() -> Result<()> {
        let codec = codec();
        let encoded = codec.encode(&ticket())?;
        let decoded = codec.decode(&encoded);
        assert_eq!(decoded, Ok(ticket()));
        Ok(())
    }

    #[test]
    fn same_key_means_same_encoding() -> Result<()> {
        let encoded = codec().encode(&ticket())?;
        let again = CookieCodec::from_key([7u8; 32]).encode(&ticket())?;
        assert_eq!(encoded, again);
        Ok(())
    }

    #[test]
    fn flipping_one_byte_invalidates_the_cookie() -> Result<()> {
        let codec = codec();
        let encoded = codec.encode(&ticket())?;
        for index in 0..encoded.len() {
            let mut bytes = encoded.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let Ok(mutated) = String::from_utf8(bytes) else {
                continue;
            };
            if mutated == encoded {
                continue;
            }
            assert_eq!(
                codec.decode(&mutated),
                Err(InvalidCookie),
                "byte {index} flip was accepted"
            );
        }
        Ok(())
    }

    #[test]
    fn a_different_key_rejects_the_cookie() -> Result<()> {
        let encoded = codec().encode(&ticket())?;
        let other = CookieCodec::from_key([8u8; 32]);
        assert_eq!(other.decode(&encoded), Err(InvalidCookie));
        Ok(())
    }

    #[test]
    fn garbage_values_are_invalid() {
        let codec = codec();
        assert_eq!(codec.decode(""), Err(InvalidCookie));
        assert_eq!(codec.decode("no-dot-here"), Err(InvalidCookie));
        assert_eq!(codec.decode("!!!.###"), Err(InvalidCookie));
    }

    #[test]
    fn generated_keys_differ() -> Result<()> {
        let first = CookieCodec::generate()?;
        let second = CookieCodec::generate()?;
        assert_ne!(first.encode(&ticket())?, second.encode(&ticket())?);
        Ok(())
    }

    #[test]
    fn ephemeral_cookie_has_no_expires() -> Result<()> {
        let config = AuthConfig::new();
        let value = session_cookie(&config, "abc", false)?;
        let value = value.to_str().context("cookie is ascii")?;
        assert_eq!(value, "cookie=abc; Path=/; HttpOnly");
        Ok(())
    }

    #[test]
    fn remembered_cookie_is_long_lived() -> Result<()> {
        let config = AuthConfig::new();
        let value = session_cookie(&config, "abc", true)?;
        let value = value.to_str().context("cookie is ascii")?;
        assert!(value.starts_with("cookie=abc; Path=/; HttpOnly; Expires="));
        assert!(value.ends_with(" GMT"));
        Ok(())
    }

    #[test]
    fn secure_flag_follows_configuration() -> Result<()> {
        let config = AuthConfig::new().with_secure_cookies(true);
        let value = session_cookie(&config, "abc", false)?;
        assert!(value.to_str().context("cookie is ascii")?.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn clearing_cookie_expires_immediately() -> Result<()> {
        let config = AuthConfig::new();
        let value = clear_cookie(&config)?;
        let value = value.to_str().context("cookie is ascii")?;
        assert_eq!(value, "cookie=; Path=/; HttpOnly; Max-Age=0");
        Ok(())
    }
}
