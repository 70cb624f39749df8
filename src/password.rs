//! Password derivation, verification, and salt generation.
//!
//! Digests are Argon2id over `password ++ salt`, never a bare hash of the
//! password. The work factor and salt length are configuration
//! ([`crate::config::AuthConfig`]), not constants; the tracker's original
//! single SHA-256 pass and 5-character salts are gone on purpose.

use anyhow::{anyhow, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use subtle::ConstantTimeEq;

/// Length in bytes of the digest stored in `users.password_hash`.
pub const DIGEST_LENGTH: usize = 32;

/// Argon2 work-factor settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HashParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes over memory.
    pub iterations: u32,
    /// Lanes; keep at 1 unless the deployment has cores to spare.
    pub parallelism: u32,
}

impl Default for HashParams {
    fn default() -> Self {
        // OWASP-recommended Argon2id baseline.
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HashParams {
    fn hasher(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(DIGEST_LENGTH),
        )
        .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Derive the stored digest for a password and its per-user salt.
///
/// Deterministic and fixed-length. Empty passwords are accepted; a minimum
/// length is the caller's policy, not the hasher's. Only malformed work-factor
/// parameters can make this fail.
pub fn derive(password: &str, salt: &str, params: &HashParams) -> Result<[u8; DIGEST_LENGTH]> {
    let mut digest = [0u8; DIGEST_LENGTH];
    params
        .hasher()?
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut digest)
        .map_err(|err| anyhow!("password derivation failed: {err}"))?;
    Ok(digest)
}

/// Re-derive and compare against the stored digest in constant time.
pub fn verify(password: &str, salt: &str, expected: &[u8], params: &HashParams) -> Result<bool> {
    let digest = derive(password, salt, params)?;
    Ok(bool::from(digest.as_slice().ct_eq(expected)))
}

/// Generate a per-user salt drawn from `[a-zA-Z0-9]`.
///
/// Uses the thread-local CSPRNG; salts must be unpredictable to defeat
/// precomputed dictionaries.
#[must_use]
pub fn generate_salt(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{derive, generate_salt, verify, HashParams, DIGEST_LENGTH};
    use anyhow::Result;

    // Minimum-cost parameters so the suite stays fast.
    fn cheap() -> HashParams {
        HashParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn derive_is_deterministic_and_fixed_length() -> Result<()> {
        let params = cheap();
        let first = derive("hunter2", "saltsalt", &params)?;
        let second = derive("hunter2", "saltsalt", &params)?;
        assert_eq!(first, second);
        assert_eq!(first.len(), DIGEST_LENGTH);
        Ok(())
    }

    #[test]
    fn verify_accepts_the_original_password() -> Result<()> {
        let params = cheap();
        let digest = derive("correct horse", "saltsalt", &params)?;
        assert!(verify("correct horse", "saltsalt", &digest, &params)?);
        Ok(())
    }

    #[test]
    fn verify_rejects_a_different_password() -> Result<()> {
        let params = cheap();
        let digest = derive("correct horse", "saltsalt", &params)?;
        assert!(!verify("battery staple", "saltsalt", &digest, &params)?);
        Ok(())
    }

    #[test]
    fn same_password_different_salt_differs() -> Result<()> {
        let params = cheap();
        let first = derive("hunter2", "salt-one", &params)?;
        let second = derive("hunter2", "salt-two", &params)?;
        assert_ne!(first, second);
        Ok(())
    }

    #[test]
    fn empty_password_is_valid_input() -> Result<()> {
        let params = cheap();
        let digest = derive("", "saltsalt", &params)?;
        assert!(verify("", "saltsalt", &digest, &params)?);
        assert!(!verify("x", "saltsalt", &digest, &params)?);
        Ok(())
    }

    #[test]
    fn verify_rejects_wrong_length_digest() -> Result<()> {
        let params = cheap();
        assert!(!verify("hunter2", "saltsalt", &[0u8; 7], &params)?);
        Ok(())
    }

    #[test]
    fn salt_uses_the_alphanumeric_alphabet() {
        let salt = generate_salt(64);
        assert_eq!(salt.len(), 64);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn salts_are_not_repeated() {
        assert_ne!(generate_salt(16), generate_salt(16));
    }
}
