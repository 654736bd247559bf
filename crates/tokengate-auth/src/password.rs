//! Password hashing with Argon2id.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`), so
//! the salt and cost parameters travel with the hash and verification works
//! across parameter changes.
//!
//! Hashing is deliberately slow. [`CredentialHasher::hash_blocking`] and
//! [`CredentialHasher::verify_blocking`] move the work to the blocking pool
//! so async workers are not stalled.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::config::PasswordHashingConfig;
use crate::{AuthError, AuthResult};

/// Argon2id password hasher with fixed cost parameters.
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl CredentialHasher {
    /// Creates a hasher from configured cost parameters.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if argon2 rejects the parameters.
    pub fn new(config: &PasswordHashingConfig) -> AuthResult<Self> {
        let params = config
            .params()
            .map_err(|e| AuthError::internal(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a plaintext password with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if hashing fails.
    pub fn hash(&self, plaintext: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| AuthError::internal(format!("password hashing failed: {e}")))?;
        Ok(hash.to_string())
    }

    /// Verifies a plaintext password against a stored hash.
    ///
    /// Returns `Ok(false)` on mismatch. Errors only if the stored hash is
    /// not a valid PHC string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the stored hash cannot be parsed.
    pub fn verify(&self, hash: &str, plaintext: &str) -> AuthResult<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::internal(format!("malformed password hash: {e}")))?;
        // Parameters are read from the hash itself.
        Ok(self
            .argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok())
    }

    /// [`hash`](Self::hash) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if hashing fails or the task panics.
    pub async fn hash_blocking(&self, plaintext: String) -> AuthResult<String> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| AuthError::internal(format!("hashing task failed: {e}")))?
    }

    /// [`verify`](Self::verify) on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the hash is malformed or the task panics.
    pub async fn verify_blocking(&self, hash: String, plaintext: String) -> AuthResult<bool> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&hash, &plaintext))
            .await
            .map_err(|e| AuthError::internal(format!("verification task failed: {e}")))?
    }
}

#[cfg(test)]
pub(crate) fn fast_hashing_config() -> PasswordHashingConfig {
    PasswordHashingConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(&fast_hashing_config()).unwrap()
    }

    #[test]
    fn test_hash_is_argon2id_phc() {
        let hash = hasher().hash("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(!hash.contains("correct horse"));
    }

    #[test]
    fn test_verify_matches_and_mismatches() {
        let h = hasher();
        let hash = h.hash("s3cret").unwrap();
        assert!(h.verify(&hash, "s3cret").unwrap());
        assert!(!h.verify(&hash, "S3cret").unwrap());
        assert!(!h.verify(&hash, "").unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let h = hasher();
        assert_ne!(h.hash("same").unwrap(), h.hash("same").unwrap());
    }

    #[test]
    fn test_verify_malformed_hash_errors() {
        let err = hasher().verify("not-a-phc-string", "x").unwrap_err();
        assert!(matches!(err, AuthError::Internal { .. }));
    }

    #[test]
    fn test_verify_with_other_params() {
        // A hash produced with different cost still verifies.
        let strong = CredentialHasher::new(&PasswordHashingConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();
        let hash = strong.hash("pw").unwrap();
        assert!(hasher().verify(&hash, "pw").unwrap());
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let h = hasher();
        let hash = h.hash_blocking("pw".to_string()).await.unwrap();
        assert!(h.verify_blocking(hash.clone(), "pw".to_string()).await.unwrap());
        assert!(!h.verify_blocking(hash, "nope".to_string()).await.unwrap());
    }
}
