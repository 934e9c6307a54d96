//! Retrieval of key sets and discovery documents
//!
//! Validation reaches the network only through the [`KeySetFetcher`] and
//! [`DiscoveryFetcher`] capabilities, so the transport can be replaced. With
//! the `reqwest` feature, [`HttpFetcher`] implements both over HTTPS.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use cloudauth::Jwks;
use url::Url;

use crate::{discovery::DiscoveryDocument, error::FetchError};

/// Retrieves the full JSON Web Key Set published at an endpoint
#[async_trait]
pub trait KeySetFetcher: Send + Sync + fmt::Debug {
    /// Fetches the key set at `endpoint`
    async fn fetch_key_set(&self, endpoint: &Url) -> Result<Jwks, FetchError>;
}

/// Retrieves OpenID Connect discovery documents
#[async_trait]
pub trait DiscoveryFetcher: Send + Sync + fmt::Debug {
    /// Fetches the discovery document at `endpoint`
    async fn fetch_discovery(&self, endpoint: &Url) -> Result<DiscoveryDocument, FetchError>;
}

#[async_trait]
impl<T: KeySetFetcher + ?Sized> KeySetFetcher for Arc<T> {
    async fn fetch_key_set(&self, endpoint: &Url) -> Result<Jwks, FetchError> {
        T::fetch_key_set(self, endpoint).await
    }
}

#[async_trait]
impl<T: DiscoveryFetcher + ?Sized> DiscoveryFetcher for Arc<T> {
    async fn fetch_discovery(&self, endpoint: &Url) -> Result<DiscoveryDocument, FetchError> {
        T::fetch_discovery(self, endpoint).await
    }
}

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub use http::HttpFetcher;

#[cfg(feature = "reqwest")]
mod http {
    use async_trait::async_trait;
    use cloudauth::Jwks;
    use reqwest::{header, Client};
    use serde::de::DeserializeOwned;
    use url::Url;

    use super::{DiscoveryFetcher, KeySetFetcher};
    use crate::{discovery::DiscoveryDocument, error::FetchError};

    /// Fetches key sets and discovery documents over HTTP
    ///
    /// This crate does not enable TLS support in `reqwest` by itself; enable
    /// the `default-tls` or `rustls-tls` feature if nothing else in the
    /// application does.
    #[derive(Clone, Debug)]
    pub struct HttpFetcher {
        client: Client,
    }

    impl HttpFetcher {
        /// Constructs a fetcher with its own client
        ///
        /// # Errors
        ///
        /// Returns an error if the HTTP client cannot be initialized.
        pub fn new() -> Result<Self, FetchError> {
            let client = Client::builder()
                .user_agent(concat!("cloudauth_validation/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(FetchError::transport)?;

            Ok(Self { client })
        }

        /// Constructs a fetcher using an existing client
        ///
        /// Timeouts and proxies configured on the client apply to every fetch.
        #[must_use]
        pub fn from_client(client: Client) -> Self {
            Self { client }
        }

        async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
            let response = self
                .client
                .get(url.clone())
                .header(header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(FetchError::transport)?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(
                    http.status_code = status.as_u16(),
                    "fetch failed; unexpected response status",
                );
                return Err(FetchError::Status {
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(FetchError::transport)?;
            serde_json::from_slice(&body).map_err(|err| {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "fetch failed; malformed response body");
                FetchError::malformed(err)
            })
        }
    }

    #[async_trait]
    impl KeySetFetcher for HttpFetcher {
        #[tracing::instrument(skip(self, endpoint), fields(jwks.url = %endpoint))]
        async fn fetch_key_set(&self, endpoint: &Url) -> Result<Jwks, FetchError> {
            tracing::debug!("fetching JWKS");
            self.get_json(endpoint).await
        }
    }

    #[async_trait]
    impl DiscoveryFetcher for HttpFetcher {
        #[tracing::instrument(skip(self, endpoint), fields(oidc.url = %endpoint))]
        async fn fetch_discovery(&self, endpoint: &Url) -> Result<DiscoveryDocument, FetchError> {
            tracing::debug!("fetching OpenID configuration");
            self.get_json(endpoint).await
        }
    }
}
