use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use cloudauth::{jwa::rsa::PublicKey, Jwk, Jwks, Token};
use color_eyre::Result;
use openssl::{
    hash::MessageDigest,
    pkey::{PKey, Private},
    rsa::Rsa,
    sign::Signer,
};
use url::Url;

use crate::{
    discovery::DiscoveryDocument,
    error::FetchError,
    fetch::{DiscoveryFetcher, KeySetFetcher},
};

/// An RSA key pair for signing test tokens
pub struct TestKey {
    kid: String,
    key: PKey<Private>,
    public: PublicKey,
}

impl TestKey {
    pub fn generate(kid: &str) -> Result<Self> {
        let rsa = Rsa::generate(2048)?;
        let public = PublicKey::from_components(rsa.n().to_vec(), rsa.e().to_vec())?;

        Ok(Self {
            kid: kid.to_owned(),
            key: PKey::from_rsa(rsa)?,
            public,
        })
    }

    pub fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    pub fn jwk(&self) -> Jwk {
        Jwk::new(self.public_key())
            .with_key_id(self.kid.clone())
            .with_algorithm(cloudauth::jwa::SigningAlgorithm::RS256)
    }

    pub fn encode_json(value: &serde_json::Value) -> Result<String> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
    }

    /// Signs `payload` under a `{"alg":"RS256","kid":<kid>}` header
    pub fn compact(&self, payload: serde_json::Value) -> Result<String> {
        self.compact_with_header(
            serde_json::json!({ "alg": "RS256", "kid": self.kid }),
            payload,
        )
    }

    pub fn compact_with_header(
        &self,
        header: serde_json::Value,
        payload: serde_json::Value,
    ) -> Result<String> {
        let signed = format!(
            "{}.{}",
            Self::encode_json(&header)?,
            Self::encode_json(&payload)?
        );

        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(signed.as_bytes())?;
        let signature = signer.sign_to_vec()?;

        Ok(format!("{signed}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    pub fn token(&self, payload: serde_json::Value) -> Result<Token> {
        Ok(Token::decode(&self.compact(payload)?)?)
    }

    pub fn token_with_header(
        &self,
        header: serde_json::Value,
        payload: serde_json::Value,
    ) -> Result<Token> {
        Ok(Token::decode(&self.compact_with_header(header, payload)?)?)
    }
}

/// A token with an empty signature, for validators that ignore signatures
pub fn unsigned_token(payload: serde_json::Value) -> Result<Token> {
    token_with_header(serde_json::json!({ "alg": "RS256" }), payload)
}

pub fn token_with_header(header: serde_json::Value, payload: serde_json::Value) -> Result<Token> {
    let compact = format!(
        "{}.{}.",
        TestKey::encode_json(&header)?,
        TestKey::encode_json(&payload)?
    );
    Ok(Token::decode(&compact)?)
}

/// An in-memory stand-in for key set and discovery endpoints that counts
/// how often it is asked
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    key_sets: Mutex<HashMap<Url, Jwks>>,
    discovery: Mutex<HashMap<Url, DiscoveryDocument>>,
    fetched_key_urls: Mutex<Vec<Url>>,
    key_fetches: AtomicUsize,
    discovery_fetches: AtomicUsize,
    fail_key_fetches: AtomicBool,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }

    pub fn publish_keys<'a>(&self, endpoint: &Url, keys: impl IntoIterator<Item = &'a TestKey>) {
        self.publish_jwks(endpoint, keys.into_iter().map(TestKey::jwk).collect());
    }

    pub fn publish_jwks(&self, endpoint: &Url, jwks: Jwks) {
        self.key_sets
            .lock()
            .expect("poisoned")
            .insert(endpoint.clone(), jwks);
    }

    pub fn publish_discovery(&self, issuer: &Url, jwks_uri: Url) {
        self.discovery.lock().expect("poisoned").insert(
            DiscoveryDocument::well_known_url(issuer),
            DiscoveryDocument {
                issuer: issuer.to_string(),
                jwks_uri,
            },
        );
    }

    pub fn fail_key_fetches(&self, fail: bool) {
        self.fail_key_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn key_fetches(&self) -> usize {
        self.key_fetches.load(Ordering::SeqCst)
    }

    pub fn discovery_fetches(&self) -> usize {
        self.discovery_fetches.load(Ordering::SeqCst)
    }

    pub fn fetched_key_urls(&self) -> Vec<Url> {
        self.fetched_key_urls.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl KeySetFetcher for ScriptedFetcher {
    async fn fetch_key_set(&self, endpoint: &Url) -> Result<Jwks, FetchError> {
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        self.fetched_key_urls
            .lock()
            .expect("poisoned")
            .push(endpoint.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_key_fetches.load(Ordering::SeqCst) {
            return Err(FetchError::transport("connection refused"));
        }

        let found = self.key_sets.lock().expect("poisoned").get(endpoint).cloned();
        found.ok_or(FetchError::Status { status: 404 })
    }
}

#[async_trait]
impl DiscoveryFetcher for ScriptedFetcher {
    async fn fetch_discovery(&self, endpoint: &Url) -> Result<DiscoveryDocument, FetchError> {
        self.discovery_fetches.fetch_add(1, Ordering::SeqCst);

        let found = self.discovery.lock().expect("poisoned").get(endpoint).cloned();
        found.ok_or(FetchError::Status { status: 404 })
    }
}
