//! JSON Web Algorithms supported for token verification
//!
//! The specifications for these algorithms can be found in [RFC7518][].
//!
//! Only RSASSA-PKCS1-v1_5 with SHA-256 (`RS256`) is supported.
//!
//! [RFC7518]: https://tools.ietf.org/html/rfc7518

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error;

pub mod rsa;

/// Signing algorithms accepted for verification
///
/// This list may be expanded in the future.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)]
#[non_exhaustive]
pub enum SigningAlgorithm {
    /// RSA using a 2048-bit or larger key, using SHA-256 and PKCS 1.5
    RS256,
}

impl SigningAlgorithm {
    /// The name of the algorithm as it appears in the `alg` header
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
        }
    }

    pub(crate) fn verification_params(self) -> &'static ring::signature::RsaParameters {
        match self {
            Self::RS256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = error::UnsupportedAlgorithm;

    /// Parses an `alg` header value
    ///
    /// Matching is exact and case-sensitive, as required by RFC 7515.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            _ => Err(error::unsupported_algorithm(s)),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
