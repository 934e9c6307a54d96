//! Cached signing keys
//!
//! Keys are cached per key set endpoint. Each endpoint holds an immutable
//! snapshot of its keys that readers load without locking; a refresh builds a
//! new snapshot and swaps it in. Refreshes of one endpoint are serialized by a
//! per-endpoint gate, so validations against other endpoints, or against keys
//! already in the current snapshot, never wait on a refresh.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use arc_swap::ArcSwap;
use cloudauth::{
    clock::UnixTime,
    jwa::SigningAlgorithm,
    jwk::{KeyId, KeyIdRef},
    Jwk, Jwks,
};
use url::Url;

use crate::{
    config::KeyCacheConfig,
    error::{Fault, Rejection, ValidationFailure},
    fetch::KeySetFetcher,
};

#[derive(Debug, Default)]
struct KeySnapshot {
    keys: HashMap<KeyId, Arc<Jwk>>,
    fetched_at: Option<UnixTime>,
    generation: u64,
}

impl KeySnapshot {
    fn from_jwks(jwks: Jwks, fetched_at: UnixTime, generation: u64) -> Self {
        let keys = jwks
            .into_keys()
            .into_iter()
            .map(|k| (k.effective_key_id().to_owned(), Arc::new(k)))
            .collect();

        Self {
            keys,
            fetched_at: Some(fetched_at),
            generation,
        }
    }

    fn lookup(&self, kid: &KeyIdRef, alg: SigningAlgorithm) -> Option<Arc<Jwk>> {
        self.keys
            .get(kid)
            .filter(|k| k.is_compatible(alg))
            .map(Arc::clone)
    }

    fn is_fresh(&self, config: &KeyCacheConfig, now: UnixTime) -> bool {
        match (self.fetched_at, config.ttl()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(at), Some(ttl)) => at.saturating_add(ttl) > now,
        }
    }
}

#[derive(Debug, Default)]
struct EndpointKeys {
    snapshot: ArcSwap<KeySnapshot>,
    refresh_gate: tokio::sync::Mutex<()>,
}

/// A concurrent cache of signing keys, keyed by key set endpoint and key ID
#[derive(Debug)]
pub struct KeyCache {
    config: KeyCacheConfig,
    endpoints: RwLock<HashMap<Url, Arc<EndpointKeys>>>,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new(KeyCacheConfig::default())
    }
}

impl KeyCache {
    /// Constructs an empty cache
    #[must_use]
    pub fn new(config: KeyCacheConfig) -> Self {
        Self {
            config,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Gets the key `kid` published at `endpoint`
    ///
    /// A key found in a fresh snapshot is returned directly. Otherwise the
    /// key set is fetched once and the lookup repeated. If another task
    /// refreshed the same endpoint while this one waited for it, that refresh
    /// is reused rather than fetching again.
    ///
    /// # Errors
    ///
    /// * [`Rejection::UnknownSigningKey`] if the key is still absent after
    ///   the refresh
    /// * [`Fault::KeyRetrieval`] if the key set could not be fetched; the
    ///   previously cached keys are left untouched
    pub async fn get_key(
        &self,
        endpoint: &Url,
        kid: &KeyIdRef,
        alg: SigningAlgorithm,
        fetcher: &dyn KeySetFetcher,
        now: UnixTime,
    ) -> Result<Arc<Jwk>, ValidationFailure> {
        let entry = self.entry(endpoint);

        let observed = {
            let snapshot = entry.snapshot.load();
            if snapshot.is_fresh(&self.config, now) {
                if let Some(key) = snapshot.lookup(kid, alg) {
                    return Ok(key);
                }
            }
            snapshot.generation
        };

        tracing::debug!(jwks.url = %endpoint, jwk.kid = %kid, "key cache miss");

        let _gate = entry.refresh_gate.lock().await;

        let current = entry.snapshot.load_full();
        let snapshot = if current.generation == observed {
            self.refresh(endpoint, &entry, observed, fetcher, now).await?
        } else {
            tracing::debug!(jwks.url = %endpoint, "reusing concurrent refresh");
            current
        };

        snapshot.lookup(kid, alg).ok_or_else(|| {
            tracing::debug!(jwks.url = %endpoint, jwk.kid = %kid, "key not found after refresh");
            Rejection::UnknownSigningKey {
                kid: kid.to_owned(),
                endpoint: endpoint.clone(),
            }
            .into()
        })
    }

    /// Replaces the cached keys for `endpoint` without fetching
    pub fn insert(&self, endpoint: &Url, jwks: Jwks, now: UnixTime) {
        let entry = self.entry(endpoint);
        let generation = entry.snapshot.load().generation + 1;
        entry
            .snapshot
            .store(Arc::new(KeySnapshot::from_jwks(jwks, now, generation)));
    }

    /// Gets a cached key without fetching, regardless of freshness
    #[must_use]
    pub fn cached_key(&self, endpoint: &Url, kid: &KeyIdRef) -> Option<Arc<Jwk>> {
        let endpoints = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        let entry = endpoints.get(endpoint)?;
        let snapshot = entry.snapshot.load();
        snapshot.keys.get(kid).map(Arc::clone)
    }

    /// Forgets the keys cached for `endpoint`
    pub fn invalidate(&self, endpoint: &Url) {
        let removed = self
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(endpoint);

        if removed.is_some() {
            tracing::debug!(jwks.url = %endpoint, "key set invalidated");
        }
    }

    /// Forgets every cached key
    pub fn clear(&self) {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// The number of endpoints with cached state
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing is cached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[tracing::instrument(skip_all, fields(jwks.url = %endpoint))]
    async fn refresh(
        &self,
        endpoint: &Url,
        entry: &EndpointKeys,
        observed: u64,
        fetcher: &dyn KeySetFetcher,
        now: UnixTime,
    ) -> Result<Arc<KeySnapshot>, Fault> {
        tracing::debug!("refreshing JWKS");

        let jwks = fetcher.fetch_key_set(endpoint).await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, "JWKS refresh failed");
            Fault::KeyRetrieval {
                endpoint: endpoint.clone(),
                source: Arc::new(err),
            }
        })?;

        let snapshot = Arc::new(KeySnapshot::from_jwks(jwks, now, observed + 1));
        entry.snapshot.store(Arc::clone(&snapshot));

        tracing::info!(jwks.keys = snapshot.keys.len(), "JWKS refreshed");
        Ok(snapshot)
    }

    fn entry(&self, endpoint: &Url) -> Arc<EndpointKeys> {
        if let Some(entry) = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(endpoint)
        {
            return Arc::clone(entry);
        }

        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = endpoints.get(endpoint) {
            return Arc::clone(entry);
        }

        if endpoints.len() >= self.config.max_endpoints() {
            let oldest = endpoints
                .iter()
                .min_by_key(|(_, e)| e.snapshot.load().fetched_at)
                .map(|(url, _)| url.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(jwks.url = %oldest, "evicting least recently refreshed key set");
                endpoints.remove(&oldest);
            }
        }

        let entry = Arc::new(EndpointKeys::default());
        endpoints.insert(endpoint.clone(), Arc::clone(&entry));
        entry
    }
}
