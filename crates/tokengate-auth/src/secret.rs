//! Opaque token generation.
//!
//! Tokens are random bytes from the OS CSPRNG, encoded as unpadded
//! URL-safe base64. They carry no structure and are looked up, never parsed.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::config::MIN_TOKEN_BYTES;
use crate::{AuthError, AuthResult};

/// Generates opaque access and refresh tokens.
#[derive(Debug, Clone, Copy)]
pub struct SecretGenerator {
    token_bytes: usize,
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self {
            token_bytes: MIN_TOKEN_BYTES,
        }
    }
}

impl SecretGenerator {
    /// Creates a generator drawing `token_bytes` random bytes per token.
    ///
    /// Values below 32 are raised to 32.
    #[must_use]
    pub fn new(token_bytes: usize) -> Self {
        Self {
            token_bytes: token_bytes.max(MIN_TOKEN_BYTES),
        }
    }

    /// Draws a new opaque token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the OS random source fails.
    pub fn new_opaque_token(&self) -> AuthResult<String> {
        let mut bytes = vec![0u8; self.token_bytes];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AuthError::internal(format!("random source failed: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(&bytes))
    }
}

/// Short non-reversible identifier for a token, safe to log.
#[must_use]
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_length_and_alphabet() {
        let token = SecretGenerator::default().new_opaque_token().unwrap();
        // 32 bytes -> 43 unpadded base64 chars
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_minimum_entropy_enforced() {
        let token = SecretGenerator::new(8).new_opaque_token().unwrap();
        assert_eq!(token.len(), 43);

        let token = SecretGenerator::new(48).new_opaque_token().unwrap();
        assert_eq!(token.len(), 64);
    }

    #[test]
    fn test_tokens_are_unique() {
        let generator = SecretGenerator::default();
        let tokens: HashSet<_> = (0..1000)
            .map(|_| generator.new_opaque_token().unwrap())
            .collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 12);
    }
}
