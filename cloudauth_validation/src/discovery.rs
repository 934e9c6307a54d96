//! OpenID Connect discovery
//!
//! When a trust configuration names a discovery endpoint rather than a key
//! set endpoint, the key set location is read from the issuer's
//! `openid-configuration` document. Resolved locations are cached with the
//! same time to live as key sets.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use cloudauth::clock::UnixTime;
use serde::Deserialize;
use url::Url;

use crate::{
    config::KeyCacheConfig,
    error::{Fault, FetchError},
    fetch::DiscoveryFetcher,
};

const WELL_KNOWN_PATH: &str = ".well-known/openid-configuration";

/// The parts of an OpenID Provider configuration used for validation
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    /// The issuer identifier
    pub issuer: String,
    /// The location of the issuer's JSON Web Key Set
    pub jwks_uri: Url,
}

impl DiscoveryDocument {
    /// The location of the configuration document for `issuer`
    ///
    /// A URL that already points at the configuration document is returned
    /// unchanged.
    #[must_use]
    pub fn well_known_url(issuer: &Url) -> Url {
        let mut url = issuer.clone();
        if !url.path().trim_end_matches('/').ends_with(WELL_KNOWN_PATH) {
            let path = format!("{}/{WELL_KNOWN_PATH}", url.path().trim_end_matches('/'));
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        url
    }
}

#[derive(Debug)]
struct ResolvedEndpoint {
    jwks_uri: Url,
    fetched_at: UnixTime,
}

/// Caches key set locations resolved through discovery
#[derive(Debug)]
pub struct DiscoveryCache {
    config: KeyCacheConfig,
    resolved: RwLock<HashMap<Url, ResolvedEndpoint>>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl DiscoveryCache {
    /// Constructs an empty cache
    #[must_use]
    pub fn new(config: KeyCacheConfig) -> Self {
        Self {
            config,
            resolved: RwLock::new(HashMap::new()),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Resolves the key set location advertised at `endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Discovery`] if the discovery document cannot be
    /// retrieved or advertises a key set location that does not use `https`.
    pub async fn resolve(
        &self,
        endpoint: &Url,
        fetcher: &dyn DiscoveryFetcher,
        now: UnixTime,
    ) -> Result<Url, Fault> {
        let well_known = DiscoveryDocument::well_known_url(endpoint);

        if let Some(jwks_uri) = self.lookup(&well_known, now) {
            return Ok(jwks_uri);
        }

        let _gate = self.refresh_gate.lock().await;
        if let Some(jwks_uri) = self.lookup(&well_known, now) {
            return Ok(jwks_uri);
        }

        tracing::debug!(oidc.url = %well_known, "resolving key set location");
        let document = fetcher.fetch_discovery(&well_known).await.map_err(|err| {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(error, oidc.url = %well_known, "discovery failed");
            Fault::Discovery {
                endpoint: well_known.clone(),
                source: Arc::new(err),
            }
        })?;

        if document.jwks_uri.scheme() != "https" {
            tracing::warn!(
                oidc.url = %well_known,
                jwks.url = %document.jwks_uri,
                "discovered key set location does not use https"
            );
            let message = format!("jwks_uri '{}' must use https", document.jwks_uri);
            return Err(Fault::Discovery {
                endpoint: well_known,
                source: Arc::new(FetchError::malformed(message)),
            });
        }

        tracing::info!(
            oidc.url = %well_known,
            jwks.url = %document.jwks_uri,
            "key set location discovered"
        );

        let jwks_uri = document.jwks_uri;
        let mut resolved = self.resolved.write().unwrap_or_else(PoisonError::into_inner);
        if resolved.len() >= self.config.max_endpoints() && !resolved.contains_key(&well_known) {
            let oldest = resolved
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(url, _)| url.clone());
            if let Some(oldest) = oldest {
                resolved.remove(&oldest);
            }
        }
        resolved.insert(
            well_known,
            ResolvedEndpoint {
                jwks_uri: jwks_uri.clone(),
                fetched_at: now,
            },
        );

        Ok(jwks_uri)
    }

    /// Forgets every resolved location
    pub fn clear(&self) {
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn lookup(&self, well_known: &Url, now: UnixTime) -> Option<Url> {
        let resolved = self.resolved.read().unwrap_or_else(PoisonError::into_inner);
        let entry = resolved.get(well_known)?;
        let fresh = self
            .config
            .ttl()
            .map_or(true, |ttl| entry.fetched_at.saturating_add(ttl) > now);
        fresh.then(|| entry.jwks_uri.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use color_eyre::Result;

    use super::*;
    use crate::test::ScriptedFetcher;

    #[test]
    fn builds_well_known_url() -> Result<()> {
        let issuer = Url::parse("https://issuer.example.com")?;
        assert_eq!(
            DiscoveryDocument::well_known_url(&issuer).as_str(),
            "https://issuer.example.com/.well-known/openid-configuration"
        );

        let issuer = Url::parse("https://issuer.example.com/tenant/")?;
        assert_eq!(
            DiscoveryDocument::well_known_url(&issuer).as_str(),
            "https://issuer.example.com/tenant/.well-known/openid-configuration"
        );

        let full = Url::parse("https://issuer.example.com/.well-known/openid-configuration")?;
        assert_eq!(DiscoveryDocument::well_known_url(&full), full);
        Ok(())
    }

    #[tokio::test]
    async fn caches_resolved_location() -> Result<()> {
        let issuer = Url::parse("https://issuer.example.com")?;
        let jwks_uri = Url::parse("https://issuer.example.com/keys")?;
        let fetcher = ScriptedFetcher::default();
        fetcher.publish_discovery(&issuer, jwks_uri.clone());

        let cache = DiscoveryCache::new(KeyCacheConfig::default());
        let now = UnixTime(1_000);

        assert_eq!(cache.resolve(&issuer, &fetcher, now).await?, jwks_uri);
        assert_eq!(cache.resolve(&issuer, &fetcher, now).await?, jwks_uri);
        assert_eq!(fetcher.discovery_fetches(), 1);

        let later = now.saturating_add(Duration::from_secs(601));
        cache.resolve(&issuer, &fetcher, later).await?;
        assert_eq!(fetcher.discovery_fetches(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn failure_is_a_discovery_fault() -> Result<()> {
        let issuer = Url::parse("https://unknown.example.com")?;
        let fetcher = ScriptedFetcher::default();
        let cache = DiscoveryCache::new(KeyCacheConfig::default());

        let err = cache
            .resolve(&issuer, &fetcher, UnixTime(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Fault::Discovery { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn refuses_plain_http_key_set_location() -> Result<()> {
        let issuer = Url::parse("https://issuer.example.com")?;
        let fetcher = ScriptedFetcher::default();
        fetcher.publish_discovery(&issuer, Url::parse("http://issuer.example.com/keys")?);
        let cache = DiscoveryCache::new(KeyCacheConfig::default());

        let err = cache
            .resolve(&issuer, &fetcher, UnixTime(0))
            .await
            .unwrap_err();
        let Fault::Discovery { source, .. } = &err else {
            panic!("expected a discovery fault, got {err:?}");
        };
        let reason = std::error::Error::source(source.as_ref()).map(ToString::to_string);
        assert_eq!(
            reason.as_deref(),
            Some("jwks_uri 'http://issuer.example.com/keys' must use https")
        );

        let err = cache
            .resolve(&issuer, &fetcher, UnixTime(0))
            .await
            .unwrap_err();
        assert!(matches!(err, Fault::Discovery { .. }));
        assert_eq!(fetcher.discovery_fetches(), 2);
        Ok(())
    }
}
