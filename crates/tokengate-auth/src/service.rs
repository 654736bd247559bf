//! Token lifecycle orchestration.
//!
//! [`TokenLifecycleManager`] is the single entry point for registration,
//! login, refresh, logout and validation. It is the only writer of token
//! state and keeps the durable store, the token projection cache and the
//! blacklist consistent:
//!
//! - the durable store is the source of truth for which pairs exist
//! - the projection `auth:token:{access}` is a TTL-bounded hint
//! - the blacklist is the only authority for "never accept this token"
//!
//! Every store and cache call is bounded by the configured timeout.
//! Dropping a returned future cancels whatever call is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::cache::{CacheError, CacheResult, EphemeralCache, keys};
use crate::config::AuthConfig;
use crate::metrics::{self, ops};
use crate::password::CredentialHasher;
use crate::secret::{SecretGenerator, fingerprint};
use crate::storage::{DurableStore, StoreError, StoreResult};
use crate::throttle::LoginThrottle;
use crate::types::{
    IssuedTokens, Principal, PrincipalStatus, Registration, TokenPair, ValidatedPrincipal,
};
use crate::{AuthError, AuthResult};

/// Minimum TTL for blacklist entries.
const MIN_BLACKLIST_TTL: Duration = Duration::from_secs(1);

/// Orchestrates credential checks, throttling and token state.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    store: Arc<dyn DurableStore>,
    cache: Arc<dyn EphemeralCache>,
    throttle: LoginThrottle,
    hasher: CredentialHasher,
    secrets: SecretGenerator,
    config: AuthConfig,
}

impl TokenLifecycleManager {
    /// Creates a manager over the given store and cache.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if the configuration fails
    /// [`AuthConfig::validate`].
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Arc<dyn EphemeralCache>,
        config: AuthConfig,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::internal(e.to_string()))?;
        let hasher = CredentialHasher::new(&config.password_hashing)?;
        let throttle = LoginThrottle::new(Arc::clone(&cache), &config.throttle);
        let secrets = SecretGenerator::new(config.token_bytes);
        Ok(Self {
            store,
            cache,
            throttle,
            hasher,
            secrets,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Register
    // -------------------------------------------------------------------------

    /// Creates a principal and issues its first token pair.
    ///
    /// The registration succeeds once the principal is stored, even if the
    /// initial pair cannot be issued; that failure is reported in
    /// [`Registration::session`].
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` if the username or password is empty
    /// - `AlreadyExists` if the username is taken
    /// - `Internal` if hashing fails
    /// - `StoreUnavailable` / `Timeout` if the principal cannot be stored
    #[instrument(skip(self, password, email, phone))]
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
        phone: Option<&str>,
    ) -> AuthResult<Registration> {
        let start = Instant::now();
        let result = self.register_inner(username, password, email, phone).await;
        metrics::record_operation(ops::REGISTER, &result, start.elapsed());
        result
    }

    async fn register_inner(
        &self,
        username: &str,
        password: &str,
        email: &str,
        phone: Option<&str>,
    ) -> AuthResult<Registration> {
        if username.trim().is_empty() {
            return Err(AuthError::invalid_request("username is required"));
        }
        if password.is_empty() {
            return Err(AuthError::invalid_request("password is required"));
        }

        let existing = self
            .store_call(
                "get_principal_by_username",
                self.store.get_principal_by_username(username),
            )
            .await?;
        if existing.is_some() {
            return Err(AuthError::already_exists(username));
        }

        let password_hash = self.hasher.hash_blocking(password.to_string()).await?;
        let principal = Principal::new(
            username,
            password_hash,
            email,
            phone.map(str::to_string),
        );

        match self
            .store_call("create_principal", self.store.create_principal(&principal))
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_conflict() => return Err(AuthError::already_exists(username)),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(principal_id = %principal.id, "principal registered");

        let session = self
            .issue_pair(principal.id)
            .await
            .map(|pair| IssuedTokens::from(&pair));
        if let Err(e) = &session {
            tracing::warn!(
                principal_id = %principal.id,
                error = %e,
                "principal registered but initial token pair could not be issued"
            );
        }

        Ok(Registration {
            principal_id: principal.id,
            session,
        })
    }

    // -------------------------------------------------------------------------
    // Login
    // -------------------------------------------------------------------------

    /// Verifies credentials and issues a token pair.
    ///
    /// Unknown usernames are counted against the throttle exactly like wrong
    /// passwords and produce the same error.
    ///
    /// # Errors
    ///
    /// - `TooManyAttempts` if the username is locked or this failure locks it
    /// - `InvalidCredentials` for an unknown username or wrong password
    /// - `AccountBanned` if the principal is banned
    /// - `StoreUnavailable` / `Timeout` if the principal cannot be read or
    ///   the pair cannot be stored
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<IssuedTokens> {
        let start = Instant::now();
        let result = self.login_inner(username, password).await;
        metrics::record_operation(ops::LOGIN, &result, start.elapsed());
        result
    }

    async fn login_inner(&self, username: &str, password: &str) -> AuthResult<IssuedTokens> {
        match self.cache_call("peek", self.throttle.peek(username)).await {
            Ok(count) if self.throttle.is_locked(count) => {
                tracing::debug!(count, "login refused: username locked");
                return Err(AuthError::TooManyAttempts);
            }
            Ok(_) => {}
            Err(e) => {
                // Fail open: the counter is advisory when the cache is down.
                tracing::warn!(error = %e, "throttle check failed, continuing without it");
            }
        }

        let principal = self
            .store_call(
                "get_principal_by_username",
                self.store.get_principal_by_username(username),
            )
            .await?;

        let Some(principal) = principal else {
            return Err(self.record_failure(username).await);
        };

        if principal.status == PrincipalStatus::Banned {
            tracing::info!(principal_id = %principal.id, "login refused: account banned");
            return Err(AuthError::AccountBanned);
        }

        let matches = self
            .hasher
            .verify_blocking(principal.password_hash.clone(), password.to_string())
            .await?;
        if !matches {
            return Err(self.record_failure(username).await);
        }

        if let Err(e) = self.cache_call("reset", self.throttle.reset(username)).await {
            tracing::warn!(error = %e, "failed to reset login failure counter");
        }

        let pair = self.issue_pair(principal.id).await?;
        tracing::info!(principal_id = %principal.id, "login succeeded");
        Ok(IssuedTokens::from(&pair))
    }

    /// Counts a failed attempt and picks the error to return.
    async fn record_failure(&self, username: &str) -> AuthError {
        match self
            .cache_call(
                "incr_with_ttl",
                self.throttle.check_and_record_failure(username),
            )
            .await
        {
            Ok(outcome) if outcome.locked => {
                tracing::warn!(count = outcome.count, "login failure threshold reached");
                AuthError::TooManyAttempts
            }
            Ok(outcome) => {
                tracing::debug!(count = outcome.count, "login failed");
                AuthError::InvalidCredentials
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to record login failure");
                AuthError::InvalidCredentials
            }
        }
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    /// Exchanges a refresh token for a new pair and invalidates the old one.
    ///
    /// Both old tokens are blacklisted for their remaining lifetime, the old
    /// row is deleted and its projection is dropped. The new pair is issued
    /// only once the old one is known to be unusable.
    ///
    /// # Errors
    ///
    /// - `TokenRevoked` if the refresh token is blacklisted
    /// - `InvalidToken` if it is unknown or was already exchanged
    /// - `TokenExpired` if its pair has expired
    /// - `StoreUnavailable` if the old pair could not be revoked
    /// - `StoreUnavailable` / `Timeout` on backend failure
    #[instrument(skip_all, fields(token = %fingerprint(refresh_token)))]
    pub async fn refresh_token(&self, refresh_token: &str) -> AuthResult<IssuedTokens> {
        let start = Instant::now();
        let result = self.refresh_inner(refresh_token).await;
        metrics::record_operation(ops::REFRESH, &result, start.elapsed());
        result
    }

    async fn refresh_inner(&self, refresh_token: &str) -> AuthResult<IssuedTokens> {
        if refresh_token.is_empty() {
            return Err(AuthError::invalid_token("refresh token is empty"));
        }

        self.ensure_not_revoked(refresh_token).await?;

        let pair = self
            .store_call(
                "get_token_pair_by_refresh_token",
                self.store.get_token_pair_by_refresh_token(refresh_token),
            )
            .await?
            .ok_or_else(|| AuthError::invalid_token("unknown refresh token"))?;

        let now = OffsetDateTime::now_utc();
        if pair.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }

        if self.revoke_pair(&pair, now).await? == RowRemoval::AlreadyGone {
            // A concurrent refresh or logout got there first.
            return Err(AuthError::invalid_token("refresh token already used"));
        }

        let next = self.issue_pair(pair.principal_id).await?;
        tracing::info!(principal_id = %pair.principal_id, "token pair refreshed");
        Ok(IssuedTokens::from(&next))
    }

    // -------------------------------------------------------------------------
    // Logout
    // -------------------------------------------------------------------------

    /// Revokes the pair that owns `access_token`.
    ///
    /// Logging out twice returns `InvalidToken` the second time.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` if no pair exists for the token
    /// - `StoreUnavailable` if the token could not be made unusable; the pair
    ///   is kept so that a retry can finish the job
    /// - `StoreUnavailable` / `Timeout` if the pair cannot be looked up
    #[instrument(skip_all, fields(token = %fingerprint(access_token)))]
    pub async fn logout(&self, access_token: &str) -> AuthResult<()> {
        let start = Instant::now();
        let result = self.logout_inner(access_token).await;
        metrics::record_operation(ops::LOGOUT, &result, start.elapsed());
        result
    }

    async fn logout_inner(&self, access_token: &str) -> AuthResult<()> {
        if access_token.is_empty() {
            return Err(AuthError::invalid_token("access token is empty"));
        }

        let pair = self
            .store_call(
                "get_token_pair_by_access_token",
                self.store.get_token_pair_by_access_token(access_token),
            )
            .await?;

        let Some(pair) = pair else {
            // A projection can outlive its row if an earlier revocation was
            // interrupted; drop it so the token cannot validate from cache.
            self.drop_projection(access_token).await;
            return Err(AuthError::invalid_token("unknown access token"));
        };

        self.revoke_pair(&pair, OffsetDateTime::now_utc()).await?;

        tracing::info!(principal_id = %pair.principal_id, "logged out");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Validate
    // -------------------------------------------------------------------------

    /// Resolves an access token to its principal.
    ///
    /// The blacklist is consulted first and a failure to consult it rejects
    /// the token. A projection hit skips the token row read; a miss reads the
    /// row and repopulates the projection for the remaining lifetime.
    ///
    /// # Errors
    ///
    /// - `TokenRevoked` if the token is blacklisted
    /// - `TokenNotFound` if no pair exists
    /// - `TokenExpired` if the pair has expired
    /// - `AccountInvalid` if the principal is missing or not active
    /// - `StoreUnavailable` / `Timeout` if the blacklist or store cannot be read
    #[instrument(skip_all, fields(token = %fingerprint(access_token)))]
    pub async fn validate_token(&self, access_token: &str) -> AuthResult<ValidatedPrincipal> {
        let start = Instant::now();
        let result = self.validate_inner(access_token).await;
        metrics::record_operation(ops::VALIDATE, &result, start.elapsed());
        result
    }

    async fn validate_inner(&self, access_token: &str) -> AuthResult<ValidatedPrincipal> {
        if access_token.is_empty() {
            return Err(AuthError::invalid_token("access token is empty"));
        }

        self.ensure_not_revoked(access_token).await?;

        match self
            .cache_call("get", self.cache.get(&keys::token(access_token)))
            .await
        {
            Ok(Some(value)) => match Uuid::parse_str(&value) {
                Ok(principal_id) => {
                    metrics::record_cache_lookup("hit");
                    let principal = self
                        .store_call(
                            "get_principal_by_id",
                            self.store.get_principal_by_id(principal_id),
                        )
                        .await?;
                    return active_principal(principal);
                }
                Err(_) => {
                    metrics::record_cache_lookup("error");
                    tracing::warn!("malformed token projection, falling back to store");
                }
            },
            Ok(None) => metrics::record_cache_lookup("miss"),
            Err(e) => {
                metrics::record_cache_lookup("error");
                tracing::warn!(error = %e, "token projection lookup failed, falling back to store");
            }
        }

        let pair = self
            .store_call(
                "get_token_pair_by_access_token",
                self.store.get_token_pair_by_access_token(access_token),
            )
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        let now = OffsetDateTime::now_utc();
        if pair.is_expired_at(now) {
            return Err(AuthError::TokenExpired);
        }

        let principal = self
            .store_call(
                "get_principal_by_id",
                self.store.get_principal_by_id(pair.principal_id),
            )
            .await?;
        let validated = active_principal(principal)?;

        self.cache_projection(&pair, pair.remaining_at(now)).await;
        Ok(validated)
    }

    // -------------------------------------------------------------------------
    // Revoke All / Sweep
    // -------------------------------------------------------------------------

    /// Revokes every session of a principal.
    ///
    /// Intended for callers that ban a principal or change its password.
    /// Returns the number of pairs removed.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable` / `Timeout` if the pairs cannot be deleted
    /// - `StoreUnavailable` if the rows were deleted but some access token
    ///   could be neither blacklisted nor dropped from the projection cache
    #[instrument(skip(self))]
    pub async fn revoke_all_sessions(&self, principal_id: Uuid) -> AuthResult<usize> {
        let start = Instant::now();
        let result = self.revoke_all_inner(principal_id).await;
        metrics::record_operation(ops::REVOKE_ALL, &result, start.elapsed());
        result
    }

    async fn revoke_all_inner(&self, principal_id: Uuid) -> AuthResult<usize> {
        let pairs = self
            .store_call(
                "delete_token_pairs_by_principal",
                self.store.delete_token_pairs_by_principal(principal_id),
            )
            .await?;

        let now = OffsetDateTime::now_utc();
        let mut incomplete = 0usize;
        for pair in pairs.iter().filter(|p| !p.is_expired_at(now)) {
            let (access, refresh) = self.blacklist_pair(pair, now).await;
            let revocation = CacheRevocation {
                access_blacklisted: access,
                refresh_blacklisted: refresh,
                projection_dropped: self.drop_projection(&pair.access_token).await,
            };
            if !revocation.is_complete(true) {
                incomplete += 1;
            }
        }

        if incomplete > 0 {
            tracing::error!(
                count = pairs.len(),
                incomplete,
                "revoke-all left cached tokens usable"
            );
            return Err(AuthError::store_unavailable(format!(
                "{incomplete} of {} sessions could not be revoked",
                pairs.len()
            )));
        }

        tracing::info!(count = pairs.len(), "revoked all sessions");
        Ok(pairs.len())
    }

    /// Deletes token pairs whose lifetime has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` / `Timeout` if the delete fails.
    pub async fn sweep_expired(&self) -> AuthResult<u64> {
        let start = Instant::now();
        let result = self
            .store_call(
                "delete_expired_token_pairs",
                self.store
                    .delete_expired_token_pairs(OffsetDateTime::now_utc()),
            )
            .await
            .map_err(AuthError::from);
        metrics::record_operation(ops::SWEEP, &result, start.elapsed());

        let removed = result?;
        metrics::record_tokens_swept(removed);
        if removed > 0 {
            tracing::info!(removed, "swept expired token pairs");
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    /// Generates, stores and projects a new pair.
    async fn issue_pair(&self, principal_id: Uuid) -> AuthResult<TokenPair> {
        let lifetime = self.config.access_token_lifetime;
        let now = OffsetDateTime::now_utc();
        let expires_at = now
            .checked_add(time::Duration::try_from(lifetime).map_err(|e| {
                AuthError::internal(format!("token lifetime out of range: {e}"))
            })?)
            .ok_or_else(|| AuthError::internal("token expiry out of range"))?;
        let pair = TokenPair {
            access_token: self.secrets.new_opaque_token()?,
            refresh_token: self.secrets.new_opaque_token()?,
            principal_id,
            expires_at,
            created_at: now,
        };

        self.store_call("create_token_pair", self.store.create_token_pair(&pair))
            .await?;
        self.cache_projection(&pair, lifetime).await;
        Ok(pair)
    }

    /// Best-effort write of the `access -> principal` projection.
    async fn cache_projection(&self, pair: &TokenPair, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let result = self
            .cache_call(
                "set_with_ttl",
                self.cache.set_with_ttl(
                    &keys::token(&pair.access_token),
                    &pair.principal_id.to_string(),
                    ttl,
                ),
            )
            .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to cache token projection");
        }
    }

    /// Makes both tokens of a live pair unusable.
    ///
    /// An access token is unusable once it is blacklisted, or once both its
    /// row and its projection are gone. A refresh token is unusable once it
    /// is blacklisted or its row is gone. If the cache can neither blacklist
    /// the access token nor drop its projection, the row is left in place
    /// so that a retry can still find the pair.
    async fn revoke_pair(
        &self,
        pair: &TokenPair,
        now: OffsetDateTime,
    ) -> AuthResult<RowRemoval> {
        let (access_blacklisted, refresh_blacklisted) = self.blacklist_pair(pair, now).await;

        if !access_blacklisted && !self.drop_projection(&pair.access_token).await {
            return Err(revocation_failed(pair));
        }

        let removal = match self
            .store_call(
                "delete_token_pair_by_access_token",
                self.store.delete_token_pair_by_access_token(&pair.access_token),
            )
            .await
        {
            Ok(true) => RowRemoval::Deleted,
            Ok(false) => RowRemoval::AlreadyGone,
            Err(e) => {
                tracing::warn!(
                    principal_id = %pair.principal_id,
                    error = %e,
                    "failed to delete token pair"
                );
                RowRemoval::Failed
            }
        };

        // Dropped again after the delete: a concurrent validation may have
        // repopulated it from the row.
        let revocation = CacheRevocation {
            access_blacklisted,
            refresh_blacklisted,
            projection_dropped: self.drop_projection(&pair.access_token).await,
        };
        if !revocation.is_complete(removal != RowRemoval::Failed) {
            return Err(revocation_failed(pair));
        }
        Ok(removal)
    }

    /// Blacklists both tokens for the pair's remaining lifetime.
    ///
    /// Returns whether the access and refresh entries were written.
    async fn blacklist_pair(&self, pair: &TokenPair, now: OffsetDateTime) -> (bool, bool) {
        let ttl = pair.remaining_at(now).max(MIN_BLACKLIST_TTL);
        let access = self.blacklist(&pair.access_token, ttl).await;
        let refresh = self.blacklist(&pair.refresh_token, ttl).await;
        (access, refresh)
    }

    /// Deletes the `access -> principal` projection. Returns `true` on success.
    async fn drop_projection(&self, access_token: &str) -> bool {
        match self
            .cache_call("delete", self.cache.delete(&keys::token(access_token)))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to drop token projection");
                false
            }
        }
    }

    /// Writes a blacklist entry, retrying up to the configured attempts.
    async fn blacklist(&self, token: &str, ttl: Duration) -> bool {
        let key = keys::blacklist(token);
        let attempts = self.config.blacklist_write_attempts.max(1);
        for attempt in 1..=attempts {
            match self
                .cache_call("set_with_ttl", self.cache.set_with_ttl(&key, "1", ttl))
                .await
            {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "blacklist write failed");
                }
            }
        }

        tracing::error!(
            token = %fingerprint(token),
            ttl_secs = ttl.as_secs(),
            "blacklist write failed after all attempts; revoked token may be accepted until it expires"
        );
        metrics::record_blacklist_write_failure();
        false
    }

    /// Rejects blacklisted tokens. Fails closed if the blacklist is unreadable.
    async fn ensure_not_revoked(&self, token: &str) -> AuthResult<()> {
        match self
            .cache_call("exists", self.cache.exists(&keys::blacklist(token)))
            .await
        {
            Ok(false) => Ok(()),
            Ok(true) => Err(AuthError::TokenRevoked),
            Err(CacheError::Timeout { operation }) => {
                tracing::error!(operation = %operation, "blacklist check timed out, rejecting token");
                Err(AuthError::timeout(operation))
            }
            Err(CacheError::Unavailable { message }) => {
                tracing::error!(error = %message, "blacklist check failed, rejecting token");
                Err(AuthError::store_unavailable(format!(
                    "revocation check failed: {message}"
                )))
            }
        }
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        tokio::time::timeout(self.config.timeouts.store, call)
            .await
            .unwrap_or_else(|_| Err(StoreError::timeout(operation)))
    }

    async fn cache_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = CacheResult<T>>,
    ) -> CacheResult<T> {
        tokio::time::timeout(self.config.timeouts.cache, call)
            .await
            .unwrap_or_else(|_| Err(CacheError::timeout(operation)))
    }
}

/// Fate of a token pair's row during revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowRemoval {
    Deleted,
    /// Someone else deleted it first.
    AlreadyGone,
    Failed,
}

/// Which cache writes landed while revoking a pair.
#[derive(Debug, Clone, Copy)]
struct CacheRevocation {
    access_blacklisted: bool,
    refresh_blacklisted: bool,
    projection_dropped: bool,
}

impl CacheRevocation {
    /// Whether both tokens are unusable, given whether the row is gone.
    fn is_complete(&self, row_gone: bool) -> bool {
        let access = self.access_blacklisted || (row_gone && self.projection_dropped);
        let refresh = self.refresh_blacklisted || row_gone;
        access && refresh
    }
}

fn revocation_failed(pair: &TokenPair) -> AuthError {
    tracing::error!(
        principal_id = %pair.principal_id,
        "token pair could not be revoked"
    );
    AuthError::store_unavailable("token could not be revoked, try again")
}

fn active_principal(principal: Option<Principal>) -> AuthResult<ValidatedPrincipal> {
    let principal =
        principal.ok_or_else(|| AuthError::account_invalid("principal no longer exists"))?;
    if !principal.status.is_active() {
        return Err(AuthError::account_invalid("principal is not active"));
    }
    Ok(ValidatedPrincipal {
        principal_id: principal.id,
        username: principal.username,
    })
}
