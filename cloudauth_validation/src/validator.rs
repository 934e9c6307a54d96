//! Individual token validators
//!
//! Each validator checks one aspect of a token and reports either success or
//! a [`ValidationFailure`]. Validators do not depend on each other's
//! outcomes; the [`CombiningValidator`][crate::CombiningValidator] runs them
//! in sequence and aggregates the results.

use std::fmt;

use async_trait::async_trait;
use cloudauth::Token;

use crate::error::ValidationFailure;

pub mod audience;
pub mod issuer;
pub mod signature;
pub mod timestamp;

pub use audience::AudienceValidator;
pub use issuer::IssuerValidator;
pub use signature::SignatureValidator;
pub use timestamp::TimestampValidator;

/// Identifies which validator produced a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidatorKind {
    /// Expiration and not-before checks
    Timestamp,
    /// Issuer and key set URL domain checks
    Issuer,
    /// Audience checks
    Audience,
    /// Signature verification
    Signature,
    /// An application-provided validator
    Custom(&'static str),
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timestamp => "timestamp",
            Self::Issuer => "issuer",
            Self::Audience => "audience",
            Self::Signature => "signature",
            Self::Custom(name) => name,
        })
    }
}

/// A single check applied to a decoded token
///
/// Expected business conditions, such as an expired token, are reported as
/// a [`Rejection`][crate::error::Rejection]. A [`Fault`][crate::error::Fault]
/// is reserved for failures to reach a dependency.
#[async_trait]
pub trait TokenValidator: Send + Sync + fmt::Debug {
    /// Identifies the validator in results
    fn kind(&self) -> ValidatorKind;

    /// Checks the token
    async fn validate(&self, token: &Token) -> Result<(), ValidationFailure>;
}
