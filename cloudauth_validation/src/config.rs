//! Trust configuration and validation policy
//!
//! A [`TrustConfiguration`] describes one binding to an identity service: which
//! issuers are trusted, which audiences identify this application, and where
//! the signing keys are published. It is usually produced by an external
//! loader from service-binding metadata and handed over as JSON.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

const BROKER_PLAN_MARKER: &str = "!b";

/// Which identity service to trust and how to find its signing keys
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TrustConfigurationDto")]
#[must_use]
pub struct TrustConfiguration {
    issuer_domains: Vec<String>,
    client_ids: Vec<String>,
    app_id: Option<String>,
    token_keys_endpoint: Option<Url>,
    discovery_endpoint: Option<Url>,
}

impl TrustConfiguration {
    /// Trusts tokens issued under `issuer_domain`
    pub fn new(issuer_domain: impl Into<String>) -> Self {
        Self {
            issuer_domains: vec![normalize_domain(issuer_domain.into())],
            client_ids: Vec::new(),
            app_id: None,
            token_keys_endpoint: None,
            discovery_endpoint: None,
        }
    }

    /// Trusts an additional issuer domain
    pub fn with_issuer_domain(mut self, domain: impl Into<String>) -> Self {
        self.issuer_domains.push(normalize_domain(domain.into()));
        self
    }

    /// Accepts tokens addressed to `client_id`
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_ids.push(client_id.into());
        self
    }

    /// Sets the application name
    ///
    /// The app ID is accepted as an audience, prefixes scopes granted to the
    /// application, and identifies broker tenants when it is a broker plan ID
    /// (contains `!b`).
    pub fn with_app_id(self, app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..self
        }
    }

    /// Fetches signing keys from a fixed key set endpoint
    pub fn with_token_keys_endpoint(self, endpoint: Url) -> Self {
        Self {
            token_keys_endpoint: Some(endpoint),
            ..self
        }
    }

    /// Resolves the key set endpoint through OpenID Connect discovery
    ///
    /// Either the issuer URL or the full `.well-known/openid-configuration`
    /// URL may be given.
    pub fn with_discovery_endpoint(self, endpoint: Url) -> Self {
        Self {
            discovery_endpoint: Some(endpoint),
            ..self
        }
    }

    /// The trusted issuer domains
    #[must_use]
    pub fn issuer_domains(&self) -> &[String] {
        &self.issuer_domains
    }

    /// The accepted client IDs
    #[must_use]
    pub fn client_ids(&self) -> &[String] {
        &self.client_ids
    }

    /// The application name
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }

    /// The fixed key set endpoint
    #[must_use]
    pub fn token_keys_endpoint(&self) -> Option<&Url> {
        self.token_keys_endpoint.as_ref()
    }

    /// The discovery endpoint
    #[must_use]
    pub fn discovery_endpoint(&self) -> Option<&Url> {
        self.discovery_endpoint.as_ref()
    }

    /// Checks that the configuration can be used to validate tokens
    ///
    /// # Errors
    ///
    /// Returns an error if no issuer domain is trusted, no audience is
    /// accepted, or an endpoint does not use `https`.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.issuer_domains.iter().all(String::is_empty) {
            return Err(ConfigError::NoIssuerDomain);
        }

        if self.client_ids.is_empty() && self.app_id.is_none() {
            return Err(ConfigError::NoAudience);
        }

        for endpoint in [&self.token_keys_endpoint, &self.discovery_endpoint]
            .into_iter()
            .flatten()
        {
            if endpoint.scheme() != "https" {
                return Err(ConfigError::InsecureEndpoint(endpoint.clone()));
            }
        }

        Ok(())
    }

    /// Parses `raw` as a URL and returns it if its host lies within a trusted
    /// issuer domain
    ///
    /// A bare host name is read as `https://<host>`. The URL must use `https`
    /// and carry neither a query nor a fragment. The host must equal a trusted
    /// domain or be a subdomain of one; matching is on label boundaries, so
    /// `evil-example.com` is not within `example.com`.
    #[must_use]
    pub fn trusted_url(&self, raw: &str) -> Option<Url> {
        let url = if raw.contains("://") {
            Url::parse(raw)
        } else {
            Url::parse(&format!("https://{raw}"))
        }
        .ok()?;

        if url.scheme() != "https" || url.query().is_some() || url.fragment().is_some() {
            return None;
        }

        let host = url.host_str()?.trim_end_matches('.');
        let trusted = self
            .issuer_domains
            .iter()
            .filter(|d| !d.is_empty())
            .any(|domain| is_within_domain(host, domain));

        trusted.then_some(url)
    }

    /// Whether `candidate` identifies this application
    ///
    /// A candidate is accepted if it equals a configured client ID or the app
    /// ID. If the app ID is a broker plan ID, a tenant clone of the broker
    /// application (`<clone>|<app id>`) is accepted as well.
    #[must_use]
    pub fn accepts_audience(&self, candidate: &str) -> bool {
        if self.client_ids.iter().any(|c| c == candidate) {
            return true;
        }

        match self.app_id.as_deref() {
            Some(app_id) if app_id == candidate => true,
            Some(app_id) if app_id.contains(BROKER_PLAN_MARKER) => candidate
                .strip_suffix(app_id)
                .is_some_and(|clone| clone.ends_with('|')),
            _ => false,
        }
    }
}

fn normalize_domain(domain: String) -> String {
    domain.trim().trim_matches('.').to_ascii_lowercase()
}

fn is_within_domain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

#[derive(Deserialize)]
struct TrustConfigurationDto {
    #[serde(alias = "uaadomain", alias = "domain")]
    issuer_domains: OneOrMany,
    #[serde(default, alias = "clientid")]
    client_ids: Option<OneOrMany>,
    #[serde(default, alias = "xsappname")]
    app_id: Option<String>,
    #[serde(default)]
    token_keys_endpoint: Option<Url>,
    #[serde(default)]
    discovery_endpoint: Option<Url>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

impl TryFrom<TrustConfigurationDto> for TrustConfiguration {
    type Error = ConfigError;

    fn try_from(dto: TrustConfigurationDto) -> Result<Self, Self::Error> {
        let config = Self {
            issuer_domains: Vec::<String>::from(dto.issuer_domains)
                .into_iter()
                .map(normalize_domain)
                .collect(),
            client_ids: dto.client_ids.map(Vec::from).unwrap_or_default(),
            app_id: dto.app_id,
            token_keys_endpoint: dto.token_keys_endpoint,
            discovery_endpoint: dto.discovery_endpoint,
        };

        config.check()?;
        Ok(config)
    }
}

/// When to skip signature verification for a token that has already failed
///
/// The default, [`AfterFault`][Self::AfterFault], still verifies the
/// signature of a token rejected by an earlier validator, so that the result
/// lists every reason the token is unacceptable. That means a stream of
/// expired or misdirected tokens naming unknown key IDs can still trigger key
/// set retrieval. Services exposed to untrusted callers should prefer
/// [`AfterAnyFailure`][Self::AfterAnyFailure].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSkipPolicy {
    /// Always verify the signature
    Never,
    /// Skip verification once an earlier validator reported a fault
    #[default]
    AfterFault,
    /// Skip verification once an earlier validator reported any failure
    ///
    /// This avoids key retrieval for tokens already known to be invalid.
    AfterAnyFailure,
}

const DEFAULT_CLOCK_SKEW_SECS: u64 = 180;

/// Policy knobs for validation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[must_use]
pub struct ValidationSettings {
    #[serde(rename = "clock_skew_secs")]
    clock_skew: u64,
    signature_skip: SignatureSkipPolicy,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            clock_skew: DEFAULT_CLOCK_SKEW_SECS,
            signature_skip: SignatureSkipPolicy::default(),
        }
    }
}

impl ValidationSettings {
    /// Allows a grace period for the expiration and not-before checks
    ///
    /// Defaults to three minutes. Sub-second precision is discarded.
    pub fn with_clock_skew(self, skew: Duration) -> Self {
        Self {
            clock_skew: skew.as_secs(),
            ..self
        }
    }

    /// Sets when signature verification may be skipped
    pub fn with_signature_skip(self, policy: SignatureSkipPolicy) -> Self {
        Self {
            signature_skip: policy,
            ..self
        }
    }

    /// The clock skew tolerance
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew)
    }

    /// The signature skip policy
    #[must_use]
    pub fn signature_skip(&self) -> SignatureSkipPolicy {
        self.signature_skip
    }
}

const DEFAULT_TTL_SECS: u64 = 600;
const DEFAULT_MAX_ENDPOINTS: usize = 1000;

/// Sizing and freshness of the key and discovery caches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[must_use]
pub struct KeyCacheConfig {
    #[serde(rename = "ttl_secs")]
    ttl: Option<u64>,
    max_endpoints: usize,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL_SECS),
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
        }
    }
}

impl KeyCacheConfig {
    /// Sets how long a fetched key set is used before it is fetched again
    ///
    /// `None` keeps key sets until a key ID misses or the cache is
    /// invalidated. Defaults to ten minutes.
    pub fn with_ttl(self, ttl: Option<Duration>) -> Self {
        Self {
            ttl: ttl.map(|d| d.as_secs()),
            ..self
        }
    }

    /// Sets how many endpoints are cached before the least recently
    /// refreshed one is evicted
    ///
    /// Defaults to 1000. Values below one are treated as one.
    pub fn with_max_endpoints(self, max: usize) -> Self {
        Self {
            max_endpoints: max,
            ..self
        }
    }

    /// The time to live of a cached key set
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }

    /// The maximum number of cached endpoints
    #[must_use]
    pub fn max_endpoints(&self) -> usize {
        self.max_endpoints.max(1)
    }
}
