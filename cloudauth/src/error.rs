//! Common errors

#![allow(missing_copy_implementations)]

use std::error::Error as StdError;

use thiserror::Error;

use crate::json::JsonKind;

/// The segment of a compact token in which a decoding problem was found
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Segment {
    /// The first segment, holding the JOSE header
    Header,
    /// The second segment, holding the claims
    Payload,
    /// The third segment, holding the signature
    Signature,
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Payload => "payload",
            Self::Signature => "signature",
        })
    }
}

/// An error occurring while decoding the compact serialization of a token
///
/// Decoding is purely structural. A token that decodes successfully may
/// still be expired, misdirected, or forged.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The token does not consist of exactly three `.`-separated segments
    #[error("malformed token: expected 3 segments, found {segments}")]
    MalformedToken {
        /// The number of segments found
        segments: usize,
    },

    /// A segment is not valid unpadded Base64URL
    #[error("malformed token {segment}: invalid base64url encoding")]
    MalformedEncoding {
        /// The offending segment
        segment: Segment,
        /// The underlying decoding error
        #[source]
        source: base64::DecodeError,
    },

    /// The header or payload is not a JSON object
    #[error("malformed token {segment}: not a JSON object")]
    MalformedClaims {
        /// The offending segment
        segment: Segment,
        /// The underlying parsing error
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// The segment that failed to decode, if the failure was segment-specific
    #[must_use]
    pub fn segment(&self) -> Option<Segment> {
        match self {
            Self::MalformedToken { .. } => None,
            Self::MalformedEncoding { segment, .. } | Self::MalformedClaims { segment, .. } => {
                Some(*segment)
            }
        }
    }
}

/// A claim or header parameter was present but had an unexpected JSON type
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("claim '{claim}' has unexpected type {found}; expected {expected}")]
pub struct ClaimTypeMismatch {
    claim: String,
    expected: &'static str,
    found: JsonKind,
}

impl ClaimTypeMismatch {
    /// The name of the offending claim
    #[must_use]
    pub fn claim(&self) -> &str {
        &self.claim
    }

    /// A description of the type that was expected
    #[must_use]
    pub fn expected(&self) -> &'static str {
        self.expected
    }

    /// The type that was actually found
    #[must_use]
    pub fn found(&self) -> JsonKind {
        self.found
    }
}

#[inline]
pub(crate) fn claim_type_mismatch(
    claim: &str,
    expected: &'static str,
    found: JsonKind,
) -> ClaimTypeMismatch {
    ClaimTypeMismatch {
        claim: claim.to_owned(),
        expected,
        found,
    }
}

/// The token declares a signing algorithm that is not supported
///
/// Only RS256 is accepted. Any other value, including `none` and the HMAC
/// family, is refused outright so that a token can never pick a weaker
/// verification path for itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("'{alg}' does not match supported algorithms")]
pub struct UnsupportedAlgorithm {
    alg: String,
}

impl UnsupportedAlgorithm {
    /// The algorithm name as declared
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.alg
    }
}

#[inline]
pub(crate) fn unsupported_algorithm(alg: impl Into<String>) -> UnsupportedAlgorithm {
    UnsupportedAlgorithm { alg: alg.into() }
}

/// The signature did not match
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
#[error("signature mismatch")]
pub struct SignatureMismatch {
    _p: (),
}

pub(crate) const fn signature_mismatch() -> SignatureMismatch {
    SignatureMismatch { _p: () }
}

/// The key was rejected
#[derive(Debug, Error)]
#[error("key rejected")]
pub struct KeyRejected {
    #[from]
    source: Box<dyn StdError + Send + Sync + 'static>,
}

pub(crate) fn key_rejected(
    source: impl Into<Box<dyn StdError + Send + Sync + 'static>>,
) -> KeyRejected {
    KeyRejected {
        source: source.into(),
    }
}
