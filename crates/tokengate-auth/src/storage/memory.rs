//! In-memory durable store backed by DashMap.
//!
//! Suitable for single-instance deployments without a database and for
//! tests. Data does not survive a restart.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{DurableStore, StoreError, StoreResult};
use crate::types::{Principal, PrincipalStatus, TokenPair};

/// DashMap-backed [`DurableStore`].
///
/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    principals: DashMap<Uuid, Principal>,
    usernames: DashMap<String, Uuid>,
    /// Keyed by access token.
    pairs: DashMap<String, TokenPair>,
    /// Refresh token -> access token.
    refresh_index: DashMap<String, String>,
    token_reads: AtomicU64,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes a principal's status. Returns `false` if it does not exist.
    pub fn set_status(&self, id: Uuid, status: PrincipalStatus) -> bool {
        match self.inner.principals.get_mut(&id) {
            Some(mut principal) => {
                principal.status = status;
                principal.updated_at = OffsetDateTime::now_utc();
                true
            }
            None => false,
        }
    }

    /// Removes a principal without touching its token pairs.
    pub fn remove_principal(&self, id: Uuid) -> Option<Principal> {
        let (_, principal) = self.inner.principals.remove(&id)?;
        self.inner.usernames.remove(&principal.username);
        Some(principal)
    }

    /// Number of token-pair lookups served so far.
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn token_reads(&self) -> u64 {
        self.inner.token_reads.load(Ordering::Relaxed)
    }

    /// Number of stored token pairs.
    #[must_use]
    pub fn token_pair_count(&self) -> usize {
        self.inner.pairs.len()
    }

    /// Makes every call fail with `StoreError::Unavailable` while set.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Delays every call by `latency`.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_latency(&self, latency: Duration) {
        self.inner
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    async fn enter(&self) -> StoreResult<()> {
        let latency = self.inner.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.inner.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::unavailable("in-memory store marked unavailable"));
        }
        Ok(())
    }

    fn remove_pair(&self, access_token: &str) -> Option<TokenPair> {
        let (_, pair) = self.inner.pairs.remove(access_token)?;
        self.inner.refresh_index.remove(&pair.refresh_token);
        Some(pair)
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn create_principal(&self, principal: &Principal) -> StoreResult<()> {
        self.enter().await?;
        match self.inner.usernames.entry(principal.username.clone()) {
            Entry::Occupied(_) => Err(StoreError::conflict(format!(
                "username '{}' already exists",
                principal.username
            ))),
            Entry::Vacant(slot) => {
                self.inner
                    .principals
                    .insert(principal.id, principal.clone());
                slot.insert(principal.id);
                Ok(())
            }
        }
    }

    async fn get_principal_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        self.enter().await?;
        let Some(id) = self.inner.usernames.get(username).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.inner.principals.get(&id).map(|p| p.clone()))
    }

    async fn get_principal_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        self.enter().await?;
        Ok(self.inner.principals.get(&id).map(|p| p.clone()))
    }

    async fn create_token_pair(&self, pair: &TokenPair) -> StoreResult<()> {
        self.enter().await?;
        if self.inner.refresh_index.contains_key(&pair.refresh_token) {
            return Err(StoreError::conflict("refresh token already exists"));
        }
        match self.inner.pairs.entry(pair.access_token.clone()) {
            Entry::Occupied(_) => Err(StoreError::conflict("access token already exists")),
            Entry::Vacant(slot) => {
                self.inner
                    .refresh_index
                    .insert(pair.refresh_token.clone(), pair.access_token.clone());
                slot.insert(pair.clone());
                Ok(())
            }
        }
    }

    async fn get_token_pair_by_access_token(
        &self,
        access_token: &str,
    ) -> StoreResult<Option<TokenPair>> {
        self.enter().await?;
        self.inner.token_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.inner.pairs.get(access_token).map(|p| p.clone()))
    }

    async fn get_token_pair_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> StoreResult<Option<TokenPair>> {
        self.enter().await?;
        self.inner.token_reads.fetch_add(1, Ordering::Relaxed);
        let Some(access_token) = self
            .inner
            .refresh_index
            .get(refresh_token)
            .map(|a| a.clone())
        else {
            return Ok(None);
        };
        Ok(self.inner.pairs.get(&access_token).map(|p| p.clone()))
    }

    async fn delete_token_pair_by_access_token(&self, access_token: &str) -> StoreResult<bool> {
        self.enter().await?;
        Ok(self.remove_pair(access_token).is_some())
    }

    async fn delete_token_pairs_by_principal(
        &self,
        principal_id: Uuid,
    ) -> StoreResult<Vec<TokenPair>> {
        self.enter().await?;
        let access_tokens: Vec<String> = self
            .inner
            .pairs
            .iter()
            .filter(|entry| entry.principal_id == principal_id)
            .map(|entry| entry.key().clone())
            .collect();

        Ok(access_tokens
            .iter()
            .filter_map(|token| self.remove_pair(token))
            .collect())
    }

    async fn delete_expired_token_pairs(&self, now: OffsetDateTime) -> StoreResult<u64> {
        self.enter().await?;
        let expired: Vec<String> = self
            .inner
            .pairs
            .iter()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        Ok(expired
            .iter()
            .filter(|token| self.remove_pair(token).is_some())
            .count() as u64)
    }
}
