//! Trust decisions for bearer tokens issued by a cloud identity service
//!
//! Builds on the primitives in [`cloudauth`] to decide whether a decoded
//! token should be accepted. A [`CombiningValidator`] applies four checks, in
//! order:
//!
//! 1. the token is within its validity period, allowing for clock skew
//! 2. the issuer, and any key set URL named by the token, lie within a
//!    trusted issuer domain
//! 3. the token is addressed to this application
//! 4. the token carries a valid RS256 signature by a key from a trusted key
//!    set
//!
//! The local checks run first, so a token that is expired or misdirected
//! never causes a key set to be fetched. Key sets are retrieved through a
//! [`KeySetFetcher`], either from the location named by the token, the
//! configured endpoint, or an OpenID Connect discovery document, and are
//! cached in a [`KeyCache`] shared by all concurrent validations.
//!
//! Every check runs even if an earlier one fails, and the resulting
//! [`ValidationResult`] distinguishes tokens that were _rejected_ from
//! validations that could not be completed because of a _fault_ such as an
//! unreachable key set endpoint.
//!
//! Tokens accepted through [`CombiningValidator::authenticate`] are made
//! available to the rest of the request through the [`ValidationContext`].
//!
//! # Example
//!
//! ```no_run
//! # async fn handle(bearer: &str) -> Result<(), Box<dyn std::error::Error>> {
//! use cloudauth_validation::{
//!     CombiningValidator, TracingListener, TrustConfiguration, ValidationContext,
//! };
//!
//! let trust: TrustConfiguration = serde_json::from_str(r#"{
//!     "uaadomain": "auth.example.com",
//!     "clientid": "app-client-1",
//!     "xsappname": "my-app!t42"
//! }"#)?;
//!
//! let validator = CombiningValidator::http_builder(trust)?
//!     .with_listener(TracingListener)
//!     .build()?;
//!
//! ValidationContext::scope(async {
//!     match validator.authenticate(bearer).await {
//!         Ok(token) => println!("authenticated {:?}", token.subject()),
//!         Err(err) if err.has_fault() => println!("try again later: {err}"),
//!         Err(err) => println!("unauthorized: {err}"),
//!     }
//! })
//! .await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

pub mod cache;
mod combining;
pub mod config;
mod context;
pub mod discovery;
pub mod error;
pub mod fetch;
mod listener;
mod result;
pub mod validator;

#[cfg(test)]
mod test;

pub use cache::KeyCache;
pub use combining::{CombiningValidator, CombiningValidatorBuilder};
pub use config::{KeyCacheConfig, SignatureSkipPolicy, TrustConfiguration, ValidationSettings};
pub use context::{ContextGuard, ValidationContext};
pub use error::{AuthenticationError, ConfigError, Fault, Rejection, ValidationFailure};
pub use fetch::{DiscoveryFetcher, KeySetFetcher};
pub use listener::{TracingListener, ValidationListener};
pub use result::{ValidationError, ValidationResult};
pub use validator::{TokenValidator, ValidatorKind};

#[cfg(feature = "reqwest")]
#[cfg_attr(docsrs, doc(cfg(feature = "reqwest")))]
pub use fetch::HttpFetcher;
