//! RS256 signature verification against cached signing keys

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use cloudauth::{clock::Clock, jwa::SigningAlgorithm, jwk, Token};
use url::Url;

use super::{issuer::trusted_key_url, TokenValidator, ValidatorKind};
use crate::{
    cache::KeyCache,
    config::TrustConfiguration,
    discovery::DiscoveryCache,
    error::{Fault, Rejection, ValidationFailure},
    fetch::{DiscoveryFetcher, KeySetFetcher},
};

/// Verifies that the token was signed by a key from a trusted key set
///
/// The key set is taken from the first available of:
///
/// 1. the token's `jku` header, if it lies within a trusted domain
/// 2. the configured key set endpoint
/// 3. the key set location advertised by the configured discovery endpoint
///
/// An untrusted `jku` is rejected outright and never fetched.
pub struct SignatureValidator {
    trust: Arc<TrustConfiguration>,
    keys: Arc<KeyCache>,
    discovery: Arc<DiscoveryCache>,
    key_fetcher: Arc<dyn KeySetFetcher>,
    discovery_fetcher: Arc<dyn DiscoveryFetcher>,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SignatureValidator {
    /// Constructs a signature validator
    #[must_use]
    pub fn new(
        trust: Arc<TrustConfiguration>,
        keys: Arc<KeyCache>,
        discovery: Arc<DiscoveryCache>,
        key_fetcher: Arc<dyn KeySetFetcher>,
        discovery_fetcher: Arc<dyn DiscoveryFetcher>,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            trust,
            keys,
            discovery,
            key_fetcher,
            discovery_fetcher,
            clock,
        }
    }

    /// Determines which key set the token must be verified against
    ///
    /// # Errors
    ///
    /// * [`Rejection::UntrustedKeyUrl`] if the token names an untrusted key set
    /// * [`Fault::Discovery`] if discovery fails
    /// * [`Fault::NoKeySource`] if no key set can be determined
    pub async fn key_set_endpoint(&self, token: &Token) -> Result<Url, ValidationFailure> {
        if let Some(jku) = trusted_key_url(&self.trust, token)? {
            return Ok(jku);
        }

        if let Some(endpoint) = self.trust.token_keys_endpoint() {
            return Ok(endpoint.clone());
        }

        if let Some(endpoint) = self.trust.discovery_endpoint() {
            let jwks_uri = self
                .discovery
                .resolve(endpoint, &*self.discovery_fetcher, self.clock.now())
                .await?;
            return Ok(jwks_uri);
        }

        Err(Fault::NoKeySource.into())
    }
}

impl fmt::Debug for SignatureValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureValidator")
            .field("trust", &self.trust)
            .field("keys", &self.keys)
            .field("key_fetcher", &self.key_fetcher)
            .field("discovery_fetcher", &self.discovery_fetcher)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenValidator for SignatureValidator {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::Signature
    }

    async fn validate(&self, token: &Token) -> Result<(), ValidationFailure> {
        let alg: SigningAlgorithm = token
            .algorithm()?
            .ok_or(Rejection::MissingClaim("alg"))?
            .parse()
            .map_err(Rejection::from)?;

        let endpoint = self.key_set_endpoint(token).await?;
        let kid = token.key_id()?.unwrap_or(jwk::default_key_id());

        let key = self
            .keys
            .get_key(&endpoint, kid, alg, &*self.key_fetcher, self.clock.now())
            .await?;

        key.public_key()
            .verify(alg, token.signed_content(), token.signature())
            .map_err(|_| Rejection::InvalidSignature)?;

        Ok(())
    }
}
