//! Validation errors
//!
//! A token can fail validation in two ways. A [`Rejection`] means the token
//! itself is unacceptable: it is expired, misdirected, or not signed by a
//! trusted key. A [`Fault`] means validation could not be completed because a
//! dependency, such as the key set endpoint, was unavailable. Both leave the
//! token invalid, but only a fault points at an outage rather than a bad token.

use std::{error::Error as StdError, sync::Arc};

use cloudauth::{
    clock::UnixTime,
    error::{ClaimTypeMismatch, DecodeError, UnsupportedAlgorithm},
    jwk::KeyId,
};
use thiserror::Error;
use url::Url;

use crate::ValidationResult;

/// A failure to retrieve a key set or discovery document
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be completed
    #[error("request failed")]
    Transport(#[source] Box<dyn StdError + Send + Sync + 'static>),

    /// The endpoint responded with an unsuccessful status
    #[error("unexpected response status {status}")]
    Status {
        /// The HTTP status code
        status: u16,
    },

    /// The response body could not be understood
    #[error("malformed response")]
    MalformedResponse(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl FetchError {
    /// Wraps a transport-level failure
    pub fn transport(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Transport(source.into())
    }

    /// Wraps a failure to parse the response body
    pub fn malformed(source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::MalformedResponse(source.into())
    }
}

/// A token was found to be unacceptable
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    /// A required claim or header parameter is absent
    #[error("missing required claim '{0}'")]
    MissingClaim(&'static str),

    /// A claim has the wrong JSON type
    #[error(transparent)]
    ClaimTypeMismatch(#[from] ClaimTypeMismatch),

    /// The token has expired
    #[error("token expired at {expired_at}")]
    TokenExpired {
        /// The `exp` claim
        expired_at: UnixTime,
    },

    /// The token is not valid yet
    #[error("token not valid before {not_before}")]
    TokenNotYetValid {
        /// The `nbf` claim
        not_before: UnixTime,
    },

    /// The issuer is not one of the trusted issuer domains
    #[error("issuer '{issuer}' is not trusted")]
    IssuerMismatch {
        /// The `iss` claim
        issuer: String,
    },

    /// The `jku` header names a key set outside the trusted issuer domains
    #[error("key set url '{url}' is not trusted")]
    UntrustedKeyUrl {
        /// The `jku` header parameter
        url: String,
    },

    /// None of the token's audiences is accepted
    #[error("audience mismatch: none of {found:?} is accepted")]
    AudienceMismatch {
        /// The audience candidates found in the token
        found: Vec<String>,
    },

    /// The token is signed with an algorithm other than RS256
    #[error(transparent)]
    UnsupportedAlgorithm(#[from] UnsupportedAlgorithm),

    /// The key set holds no key with the token's key ID, even after a refresh
    #[error("no signing key '{kid}' in key set at {endpoint}")]
    UnknownSigningKey {
        /// The key ID looked up
        kid: KeyId,
        /// The key set endpoint
        endpoint: Url,
    },

    /// The signature does not match the signed content
    #[error("invalid signature")]
    InvalidSignature,

    /// The signature was not checked because the token had already failed
    #[error("signature not checked after earlier failures")]
    SignatureNotChecked,
}

/// Validation could not be completed because a dependency was unavailable
#[derive(Clone, Debug, Error)]
pub enum Fault {
    /// The key set could not be retrieved
    #[error("unable to retrieve key set from {endpoint}")]
    KeyRetrieval {
        /// The key set endpoint
        endpoint: Url,
        /// The underlying failure
        #[source]
        source: Arc<FetchError>,
    },

    /// The discovery document could not be retrieved
    #[error("unable to discover key set endpoint from {endpoint}")]
    Discovery {
        /// The discovery endpoint
        endpoint: Url,
        /// The underlying failure
        #[source]
        source: Arc<FetchError>,
    },

    /// No key set endpoint is configured, discoverable, or named by the token
    #[error("no key set endpoint available")]
    NoKeySource,
}

/// The outcome of a single failed validator
#[derive(Clone, Debug, Error)]
pub enum ValidationFailure {
    /// The token is unacceptable
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Validation could not be completed
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl ValidationFailure {
    /// Whether this failure is an infrastructure fault
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// The rejection, if the token was rejected
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            Self::Fault(_) => None,
        }
    }

    /// The fault, if validation could not be completed
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Rejected(_) => None,
            Self::Fault(f) => Some(f),
        }
    }
}

impl From<ClaimTypeMismatch> for ValidationFailure {
    fn from(err: ClaimTypeMismatch) -> Self {
        Self::Rejected(err.into())
    }
}

/// A bearer token could not be authenticated
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The token could not be decoded
    #[error("malformed token")]
    Malformed(#[from] DecodeError),

    /// The token decoded, but did not pass validation
    #[error("token rejected: {0}")]
    Invalid(ValidationResult),
}

impl AuthenticationError {
    /// Whether any validator reported an infrastructure fault
    #[must_use]
    pub fn has_fault(&self) -> bool {
        match self {
            Self::Malformed(_) => false,
            Self::Invalid(result) => result.has_fault(),
        }
    }
}

/// A trust configuration is incomplete or inconsistent
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// No trusted issuer domain was given
    #[error("at least one trusted issuer domain is required")]
    NoIssuerDomain,

    /// Neither a client ID nor an app ID was given
    #[error("at least one client id or an app id is required")]
    NoAudience,

    /// An endpoint does not use `https`
    #[error("endpoint '{0}' must use https")]
    InsecureEndpoint(Url),
}
